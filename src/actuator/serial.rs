use super::link::{Connector, SerialTransport};
use crate::config::ActuatorConfig;
use crate::error::ActuatorError;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Opens the configured serial port, always with the same parameters
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    timeout: Duration,
    settle: Duration,
}

impl SerialConnector {
    pub fn from_config(config: &ActuatorConfig) -> Self {
        Self {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            timeout: config.timeout(),
            settle: config.settle(),
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn SerialTransport>, ActuatorError> {
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|source| ActuatorError::Open {
                port: self.port.clone(),
                source,
            })?;

        // Opening the port resets most Arduino boards
        if !self.settle.is_zero() {
            debug!("Waiting {:?} for {} to settle", self.settle, self.port);
            thread::sleep(self.settle);
        }

        Ok(Box::new(SerialPortTransport { port }))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport for SerialPortTransport {
    fn clear(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()
    }

    fn bytes_waiting(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::from)
    }

    fn read_line(&mut self) -> io::Result<String> {
        read_bounded_line(&mut self.port, MAX_RESPONSE_LEN)
    }
}

/// Longest diagnostic line kept from the board
const MAX_RESPONSE_LEN: usize = 256;

/// Read up to a newline, end of input, the port timeout or `max_len` bytes
fn read_bounded_line<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < max_len {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e),
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}
