use crate::events::{DoorEvent, EventBus, EventFilter, EventReceiver};
use crate::error::EventBusError;
use std::time::SystemTime;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cancel `quit` on SIGINT or SIGTERM
pub(super) fn setup_signal_handlers(quit: CancellationToken, event_bus: EventBus) {
    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        let quit = quit.clone();
        let event_bus = event_bus.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    request_shutdown(&quit, &event_bus, "SIGTERM");
                }
                _ = quit.cancelled() => {}
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => {
                if result.is_ok() {
                    info!("Received SIGINT signal (Ctrl+C)");
                    request_shutdown(&quit, &event_bus, "SIGINT");
                }
            }
            _ = quit.cancelled() => {}
        }
    });
}

fn request_shutdown(quit: &CancellationToken, event_bus: &EventBus, signal: &str) {
    event_bus.publish(DoorEvent::ShutdownRequested {
        reason: format!("received {}", signal),
        timestamp: SystemTime::now(),
    });
    quit.cancel();
}

/// Write every event on the bus to the log as JSON until `stop` is cancelled
pub(super) fn spawn_audit_log(event_bus: &EventBus, stop: CancellationToken) -> JoinHandle<()> {
    let mut receiver = EventReceiver::new(
        event_bus.subscribe(),
        EventFilter::All,
        "audit".to_string(),
    );

    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => debug!(target: "facedoor::audit", "{}", json),
                        Err(e) => warn!("Failed to serialize event: {}", e),
                    },
                    Err(EventBusError::Lagged { .. }) => continue,
                    Err(EventBusError::ChannelClosed) => break,
                },
                _ = stop.cancelled() => {
                    for event in receiver.drain() {
                        if let Ok(json) = serde_json::to_string(&event) {
                            debug!(target: "facedoor::audit", "{}", json);
                        }
                    }
                    break;
                }
            }
        }
    })
}
