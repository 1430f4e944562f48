use super::{Actuator, DoorCommand, SendOutcome};
use crate::config::ActuatorConfig;
use crate::error::ActuatorError;
use crate::events::{DoorEvent, EventBus};
use std::io;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Byte-level operations the link needs from an open port
pub trait SerialTransport: Send {
    /// Discard stale input and output
    fn clear(&mut self) -> io::Result<()>;

    /// Write `line` followed by `\n`
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn bytes_waiting(&mut self) -> io::Result<u32>;

    /// Read up to the next newline or the port timeout
    fn read_line(&mut self) -> io::Result<String>;
}

/// Opens a fresh transport with fixed port parameters
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn SerialTransport>, ActuatorError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Delays used around a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub response_wait: Duration,
    pub reconnect_delay: Duration,
}

impl LinkTiming {
    pub fn from_config(config: &ActuatorConfig) -> Self {
        Self {
            response_wait: config.response_wait(),
            reconnect_delay: config.reconnect_delay(),
        }
    }

    /// No waiting at all, for replay runs and tests
    pub fn immediate() -> Self {
        Self {
            response_wait: Duration::ZERO,
            reconnect_delay: Duration::ZERO,
        }
    }
}

/// Serial link to the door microcontroller.
///
/// A failed write gets exactly one reconnect with the same port parameters. If that does
/// not deliver the command the link stays disconnected and later sends are only logged.
pub struct ActuatorLink {
    connector: Option<Box<dyn Connector>>,
    transport: Option<Box<dyn SerialTransport>>,
    state: LinkState,
    timing: LinkTiming,
    events: Option<EventBus>,
}

impl ActuatorLink {
    /// Open the link. An unreachable port leaves it in log-only mode.
    pub fn connect(
        mut connector: Box<dyn Connector>,
        timing: LinkTiming,
        events: Option<EventBus>,
    ) -> Self {
        let (transport, state) = match connector.connect() {
            Ok(transport) => {
                info!("Actuator connected on {}", connector.describe());
                (Some(transport), LinkState::Connected)
            }
            Err(e) => {
                warn!("Actuator unavailable, running in log-only mode: {}", e);
                (None, LinkState::Disconnected)
            }
        };

        let link = Self {
            connector: Some(connector),
            transport,
            state,
            timing,
            events,
        };
        link.publish_status();
        link
    }

    /// A link with no hardware behind it
    pub fn log_only(events: Option<EventBus>) -> Self {
        info!("Actuator disabled, door commands will only be logged");
        let link = Self {
            connector: None,
            transport: None,
            state: LinkState::Disconnected,
            timing: LinkTiming::immediate(),
            events,
        };
        link.publish_status();
        link
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Write the command. Only errors from clearing or writing are transport failures.
    fn transmit(
        transport: &mut dyn SerialTransport,
        command: DoorCommand,
        response_wait: Duration,
    ) -> io::Result<Option<String>> {
        transport.clear()?;
        transport.write_line(command.as_str())?;

        if !response_wait.is_zero() {
            thread::sleep(response_wait);
        }

        match Self::read_response(transport) {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!("No readable response after {}: {}", command, e);
                Ok(None)
            }
        }
    }

    fn read_response(transport: &mut dyn SerialTransport) -> io::Result<Option<String>> {
        if transport.bytes_waiting()? == 0 {
            return Ok(None);
        }

        let line = transport.read_line()?;
        let line = line.trim();
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line.to_string()))
        }
    }

    fn recover(&mut self, command: DoorCommand) -> SendOutcome {
        self.transport = None;

        let Some(connector) = self.connector.as_mut() else {
            self.mark_disconnected();
            return SendOutcome::Failed;
        };

        if !self.timing.reconnect_delay.is_zero() {
            thread::sleep(self.timing.reconnect_delay);
        }

        info!("Reconnecting actuator on {}", connector.describe());
        let mut transport = match connector.connect() {
            Ok(transport) => transport,
            Err(e) => {
                error!("Actuator reconnect failed: {}", e);
                self.mark_disconnected();
                return SendOutcome::Failed;
            }
        };

        match Self::transmit(transport.as_mut(), command, self.timing.response_wait) {
            Ok(response) => {
                if let Some(line) = &response {
                    debug!("Actuator response: {}", line);
                }
                info!("Sent {} after reconnecting", command);
                self.transport = Some(transport);
                SendOutcome::Reconnected { response }
            }
            Err(e) => {
                error!("Resending {} after reconnect failed: {}", command, e);
                self.mark_disconnected();
                SendOutcome::Failed
            }
        }
    }

    fn mark_disconnected(&mut self) {
        self.transport = None;
        if self.state == LinkState::Connected {
            self.state = LinkState::Disconnected;
            self.publish_status();
        }
    }

    fn publish_status(&self) {
        if let Some(events) = &self.events {
            events.publish(DoorEvent::ActuatorStatusChanged {
                connected: self.state == LinkState::Connected,
                timestamp: SystemTime::now(),
            });
        }
    }
}

impl Actuator for ActuatorLink {
    fn send(&mut self, command: DoorCommand) -> SendOutcome {
        let Some(transport) = self.transport.as_mut() else {
            info!("Actuator offline, would send {}", command);
            return SendOutcome::Skipped;
        };

        match Self::transmit(transport.as_mut(), command, self.timing.response_wait) {
            Ok(response) => {
                if let Some(line) = &response {
                    debug!("Actuator response: {}", line);
                }
                debug!("Sent {}", command);
                SendOutcome::Delivered { response }
            }
            Err(e) => {
                warn!("Sending {} failed: {}", command, e);
                self.recover(command)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("Actuator connection closed");
        }
        self.state = LinkState::Disconnected;
    }
}
