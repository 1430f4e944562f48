use crate::actuator::{Actuator, DoorCommand, SendOutcome};
use crate::events::{CloseReason, DoorEvent, EventBus};
use crate::recognition::ClassificationResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Closed,
    Open,
}

/// Turns per-frame recognition results into debounced door commands.
///
/// The door opens on the first frame with an authorized face and closes once no
/// authorized face has been seen for longer than the auto-close timeout. State follows
/// the decision, not the actuator outcome.
pub struct DoorController<A: Actuator> {
    actuator: A,
    state: DoorState,
    last_authorized: Option<Instant>,
    auto_close: Duration,
    events: Option<EventBus>,
}

impl<A: Actuator> DoorController<A> {
    pub fn new(actuator: A, auto_close: Duration) -> Self {
        Self {
            actuator,
            state: DoorState::Closed,
            last_authorized: None,
            auto_close,
            events: None,
        }
    }

    /// Publish door events on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    pub fn last_authorized(&self) -> Option<Instant> {
        self.last_authorized
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Feed the results for one frame. Returns the command issued, if any.
    pub fn observe(&mut self, results: &[ClassificationResult], now: Instant) -> Option<DoorCommand> {
        let best_authorized = results
            .iter()
            .filter(|r| r.is_authorized())
            .min_by(|a, b| {
                a.confidence()
                    .partial_cmp(&b.confidence())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match (self.state, best_authorized) {
            (DoorState::Closed, Some(result)) => {
                let identity = result.identity().unwrap_or_default().to_string();
                info!(
                    "Authorized face {} (confidence {:.1}), opening door",
                    identity,
                    result.confidence()
                );
                self.dispatch(DoorCommand::Open);
                self.state = DoorState::Open;
                self.last_authorized = Some(now);
                self.publish(DoorEvent::DoorOpened {
                    identity,
                    confidence: result.confidence(),
                    timestamp: SystemTime::now(),
                });
                Some(DoorCommand::Open)
            }
            (DoorState::Open, Some(_)) => {
                self.last_authorized = Some(now);
                None
            }
            (DoorState::Open, None) => {
                let idle = self
                    .last_authorized
                    .map_or(Duration::MAX, |last| now.saturating_duration_since(last));
                if idle > self.auto_close {
                    info!("No authorized face for {:.1}s, closing door", idle.as_secs_f64());
                    self.close(CloseReason::Timeout);
                    Some(DoorCommand::Close)
                } else {
                    None
                }
            }
            (DoorState::Closed, None) => None,
        }
    }

    /// Close the door if it is open and release the actuator
    pub fn shutdown(&mut self) -> Option<DoorCommand> {
        let command = if self.state == DoorState::Open {
            info!("Closing door before shutdown");
            self.close(CloseReason::Shutdown);
            Some(DoorCommand::Close)
        } else {
            None
        };
        self.actuator.close();
        command
    }

    fn close(&mut self, reason: CloseReason) {
        self.dispatch(DoorCommand::Close);
        self.state = DoorState::Closed;
        self.publish(DoorEvent::DoorClosed {
            reason,
            timestamp: SystemTime::now(),
        });
    }

    fn dispatch(&mut self, command: DoorCommand) {
        match self.actuator.send(command) {
            SendOutcome::Failed => warn!("{} was not delivered to the actuator", command),
            outcome => debug!("{} -> {:?}", command, outcome),
        }
    }

    fn publish(&self, event: DoorEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
