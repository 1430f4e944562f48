use crate::events::{DoorEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, SystemTime};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watches the terminal for `q` or `Esc` and cancels the quit token
pub struct KeyboardInputHandler {
    event_bus: EventBus,
    quit: CancellationToken,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: EventBus, quit: CancellationToken) -> Self {
        Self {
            event_bus,
            quit,
            cancellation_token: CancellationToken::new(),
            task: None,
        }
    }

    /// Start listening for keyboard input
    pub fn start(&mut self) {
        info!("Press 'q' or Esc to stop");

        let event_bus = self.event_bus.clone();
        let quit = self.quit.clone();
        let cancellation_token = self.cancellation_token.clone();

        self.task = Some(task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                warn!("Keyboard quit unavailable, raw mode failed: {}", e);
                return;
            }
            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() && !quit.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            match key_event.code {
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    event_bus.publish(DoorEvent::ShutdownRequested {
                                        reason: "quit key pressed".to_string(),
                                        timestamp: SystemTime::now(),
                                    });
                                    quit.cancel();
                                    break;
                                }
                                code => debug!("Key pressed: {:?}", code),
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                        break;
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        }));
    }

    /// Stop the keyboard input handler and restore the terminal
    pub async fn stop(&mut self) {
        self.cancellation_token.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Keyboard task ended abnormally: {}", e);
            }
        }

        let _ = disable_raw_mode();
    }
}
