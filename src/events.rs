use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Audit events emitted by the door system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DoorEvent {
    /// An authorized face opened the door
    DoorOpened {
        identity: String,
        confidence: f64,
        timestamp: SystemTime,
    },
    /// The door was closed
    DoorClosed {
        reason: CloseReason,
        timestamp: SystemTime,
    },
    /// A face was detected but not matched to any enrolled person
    UnknownFace {
        confidence: f64,
        snapshot: Option<PathBuf>,
        timestamp: SystemTime,
    },
    /// Actuator link connectivity changed
    ActuatorStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// System shutdown requested
    ShutdownRequested {
        reason: String,
        timestamp: SystemTime,
    },
}

/// Why the door closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloseReason {
    /// No authorized face within the auto-close window
    Timeout,
    /// The live loop is exiting
    Shutdown,
}

impl DoorEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            DoorEvent::DoorOpened { timestamp, .. }
            | DoorEvent::DoorClosed { timestamp, .. }
            | DoorEvent::UnknownFace { timestamp, .. }
            | DoorEvent::ActuatorStatusChanged { timestamp, .. }
            | DoorEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            DoorEvent::DoorOpened {
                identity,
                confidence,
                ..
            } => format!("Door opened for {} (confidence: {:.1})", identity, confidence),
            DoorEvent::DoorClosed { reason, .. } => match reason {
                CloseReason::Timeout => "Door closed automatically".to_string(),
                CloseReason::Shutdown => "Door closed on shutdown".to_string(),
            },
            DoorEvent::UnknownFace {
                confidence,
                snapshot,
                ..
            } => match snapshot {
                Some(path) => format!(
                    "Unknown face (confidence: {:.1}) saved to {}",
                    confidence,
                    path.display()
                ),
                None => format!("Unknown face (confidence: {:.1})", confidence),
            },
            DoorEvent::ActuatorStatusChanged { connected, .. } => format!(
                "Actuator {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            DoorEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            DoorEvent::DoorOpened { .. } => "door_opened",
            DoorEvent::DoorClosed { .. } => "door_closed",
            DoorEvent::UnknownFace { .. } => "unknown_face",
            DoorEvent::ActuatorStatusChanged { .. } => "actuator_status_changed",
            DoorEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast event bus carrying the audit trail.
///
/// Publishing never blocks and never fails when nobody listens: the log line written
/// on every publish is the audit record of last resort.
pub struct EventBus {
    sender: broadcast::Sender<DoorEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<DoorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: DoorEvent) -> usize {
        match &event {
            DoorEvent::DoorOpened { .. }
            | DoorEvent::DoorClosed { .. }
            | DoorEvent::ShutdownRequested { .. } => info!("{}", event.description()),
            DoorEvent::UnknownFace { .. } => warn!("{}", event.description()),
            DoorEvent::ActuatorStatusChanged { connected, .. } => {
                if *connected {
                    info!("{}", event.description());
                } else {
                    warn!("{}", event.description());
                }
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &DoorEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<DoorEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(receiver: broadcast::Receiver<DoorEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<DoorEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<DoorEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain every pending event that passes the filter
    pub fn drain(&mut self) -> Vec<DoorEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = DoorEvent::DoorOpened {
            identity: "alice".to_string(),
            confidence: 42.0,
            timestamp: SystemTime::now(),
        };

        assert_eq!(event_bus.publish(event.clone()), 1);

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let event_bus = EventBus::new(4);

        let delivered = event_bus.publish(DoorEvent::DoorClosed {
            reason: CloseReason::Timeout,
            timestamp: SystemTime::now(),
        });

        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_filtered_receiver_skips_other_types() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["door_closed"]);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(DoorEvent::UnknownFace {
            confidence: 130.0,
            snapshot: None,
            timestamp: SystemTime::now(),
        });
        event_bus.publish(DoorEvent::DoorClosed {
            reason: CloseReason::Shutdown,
            timestamp: SystemTime::now(),
        });

        let events = receiver.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "door_closed");
    }

    #[test]
    fn test_event_descriptions() {
        let opened = DoorEvent::DoorOpened {
            identity: "bob".to_string(),
            confidence: 55.31,
            timestamp: SystemTime::now(),
        };
        assert_eq!(opened.description(), "Door opened for bob (confidence: 55.3)");

        let closed = DoorEvent::DoorClosed {
            reason: CloseReason::Timeout,
            timestamp: SystemTime::now(),
        };
        assert_eq!(closed.description(), "Door closed automatically");
    }
}
