mod link;
mod serial;

#[cfg(test)]
mod tests;

pub use link::{ActuatorLink, Connector, LinkState, LinkTiming, SerialTransport};
pub use serial::SerialConnector;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the door microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorCommand {
    Open,
    Close,
}

impl DoorCommand {
    /// Wire text, sent followed by a newline
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorCommand::Open => "OPEN",
            DoorCommand::Close => "CLOSE",
        }
    }
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written on the existing connection
    Delivered { response: Option<String> },
    /// Written after a one-shot reconnect
    Reconnected { response: Option<String> },
    /// Link is offline, the command was only logged
    Skipped,
    /// Transport failed and recovery did not succeed
    Failed,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            SendOutcome::Delivered { .. } | SendOutcome::Reconnected { .. }
        )
    }
}

/// Best-effort command channel to the door hardware.
///
/// `send` never fails the caller; delivery problems are reported in the outcome and logs.
pub trait Actuator: Send {
    fn send(&mut self, command: DoorCommand) -> SendOutcome;

    fn is_connected(&self) -> bool;

    /// Release the underlying connection
    fn close(&mut self);
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn send(&mut self, command: DoorCommand) -> SendOutcome {
        (**self).send(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
