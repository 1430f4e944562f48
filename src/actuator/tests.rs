use super::*;
use crate::error::ActuatorError;
use crate::events::{DoorEvent, EventBus};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

#[derive(Default)]
struct Wire {
    written: Vec<String>,
    cleared: usize,
    connects: usize,
    failing_writes: usize,
    refuse_connects: bool,
    broken_reads: bool,
    response: Option<String>,
}

type SharedWire = Arc<Mutex<Wire>>;

struct MockTransport(SharedWire);

impl SerialTransport for MockTransport {
    fn clear(&mut self) -> io::Result<()> {
        self.0.lock().cleared += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut wire = self.0.lock();
        if wire.failing_writes > 0 {
            wire.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        wire.written.push(line.to_string());
        Ok(())
    }

    fn bytes_waiting(&mut self) -> io::Result<u32> {
        let wire = self.0.lock();
        if wire.broken_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "read side gone"));
        }
        Ok(wire
            .response
            .as_ref()
            .map_or(0, |r| r.len() as u32 + 1))
    }

    fn read_line(&mut self) -> io::Result<String> {
        Ok(self.0.lock().response.take().unwrap_or_default())
    }
}

struct MockConnector(SharedWire);

impl Connector for MockConnector {
    fn connect(&mut self) -> Result<Box<dyn SerialTransport>, ActuatorError> {
        let mut wire = self.0.lock();
        wire.connects += 1;
        if wire.refuse_connects {
            return Err(ActuatorError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                "no such port",
            )));
        }
        Ok(Box::new(MockTransport(self.0.clone())))
    }

    fn describe(&self) -> String {
        "mock port".to_string()
    }
}

fn link_with(wire: &SharedWire, events: Option<EventBus>) -> ActuatorLink {
    ActuatorLink::connect(
        Box::new(MockConnector(wire.clone())),
        LinkTiming::immediate(),
        events,
    )
}

#[test]
fn test_command_wire_text() {
    assert_eq!(DoorCommand::Open.as_str(), "OPEN");
    assert_eq!(DoorCommand::Close.to_string(), "CLOSE");
}

#[test]
fn test_send_delivers_and_reads_response() {
    let wire = SharedWire::default();
    wire.lock().response = Some("Door opened\r\n".to_string());
    let mut link = link_with(&wire, None);

    let outcome = link.send(DoorCommand::Open);

    assert_eq!(
        outcome,
        SendOutcome::Delivered {
            response: Some("Door opened".to_string())
        }
    );
    assert!(outcome.is_delivered());
    let wire = wire.lock();
    assert_eq!(wire.written, vec!["OPEN".to_string()]);
    assert_eq!(wire.cleared, 1);
}

#[test]
fn test_missing_response_is_not_an_error() {
    let wire = SharedWire::default();
    let mut link = link_with(&wire, None);

    assert_eq!(
        link.send(DoorCommand::Close),
        SendOutcome::Delivered { response: None }
    );
    assert!(link.is_connected());
}

#[test]
fn test_single_failure_reconnects_and_resends() {
    let wire = SharedWire::default();
    let mut link = link_with(&wire, None);
    wire.lock().failing_writes = 1;

    let outcome = link.send(DoorCommand::Open);

    assert_eq!(outcome, SendOutcome::Reconnected { response: None });
    assert!(link.is_connected());
    {
        let wire = wire.lock();
        assert_eq!(wire.connects, 2);
        assert_eq!(wire.written, vec!["OPEN".to_string()]);
    }

    // The fresh port is used for later commands
    assert_eq!(
        link.send(DoorCommand::Close),
        SendOutcome::Delivered { response: None }
    );
    assert_eq!(wire.lock().connects, 2);
}

#[test]
fn test_failed_resend_disconnects_for_good() {
    let wire = SharedWire::default();
    let mut link = link_with(&wire, None);
    wire.lock().failing_writes = 2;

    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Failed);
    assert_eq!(link.state(), LinkState::Disconnected);

    assert_eq!(link.send(DoorCommand::Close), SendOutcome::Skipped);
    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Skipped);

    let wire = wire.lock();
    assert_eq!(wire.connects, 2);
    assert!(wire.written.is_empty());
}

#[test]
fn test_failed_reconnect_disconnects() {
    let wire = SharedWire::default();
    let mut link = link_with(&wire, None);
    {
        let mut wire = wire.lock();
        wire.failing_writes = 1;
        wire.refuse_connects = true;
    }

    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Failed);
    assert!(!link.is_connected());
    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Skipped);
    assert_eq!(wire.lock().connects, 2);
}

#[test]
fn test_absent_port_starts_in_log_only_mode() {
    let wire = SharedWire::default();
    wire.lock().refuse_connects = true;
    let mut link = link_with(&wire, None);

    assert!(!link.is_connected());
    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Skipped);
    assert_eq!(wire.lock().connects, 1);
}

#[test]
fn test_disabled_link_skips_everything() {
    let mut link = ActuatorLink::log_only(None);

    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(link.send(DoorCommand::Open), SendOutcome::Skipped);
    link.close();
}

#[test]
fn test_close_drops_port() {
    let wire = SharedWire::default();
    let mut link = link_with(&wire, None);

    link.close();

    assert!(!link.is_connected());
    assert_eq!(link.send(DoorCommand::Close), SendOutcome::Skipped);
    assert!(wire.lock().written.is_empty());
}

#[test]
fn test_status_changes_are_published() {
    let bus = EventBus::new(16);
    let mut receiver = bus.subscribe();
    let wire = SharedWire::default();
    let mut link = link_with(&wire, Some(bus.clone()));

    wire.lock().failing_writes = 2;
    link.send(DoorCommand::Open);
    link.send(DoorCommand::Close);

    let statuses: Vec<bool> = std::iter::from_fn(|| receiver.try_recv().ok())
        .filter_map(|event| match event {
            DoorEvent::ActuatorStatusChanged { connected, .. } => Some(connected),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![true, false]);
}

#[test]
fn test_read_errors_after_write_do_not_reconnect() {
    let bus = EventBus::new(16);
    let mut receiver = bus.subscribe();
    let wire = SharedWire::default();
    let mut link = link_with(&wire, Some(bus.clone()));
    wire.lock().broken_reads = true;

    assert_eq!(
        link.send(DoorCommand::Open),
        SendOutcome::Delivered { response: None }
    );
    assert_eq!(
        link.send(DoorCommand::Close),
        SendOutcome::Delivered { response: None }
    );
    assert_eq!(link.state(), LinkState::Connected);

    {
        let wire = wire.lock();
        assert_eq!(wire.connects, 1);
        assert_eq!(wire.written, vec!["OPEN".to_string(), "CLOSE".to_string()]);
    }

    let statuses: Vec<bool> = std::iter::from_fn(|| receiver.try_recv().ok())
        .filter_map(|event| match event {
            DoorEvent::ActuatorStatusChanged { connected, .. } => Some(connected),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![true]);
}
