use super::live::{LiveLoop, LiveReport};
use super::runtime::{setup_signal_handlers, spawn_audit_log};
use crate::actuator::{ActuatorLink, LinkTiming, SerialConnector};
use crate::camera::{open_camera, DirectorySource, FrameSource};
use crate::config::FacedoorConfig;
use crate::detection::build_detector;
use crate::door::DoorController;
use crate::enrollment::{train_from_store, EnrollmentReport, EnrollmentStore, Enroller};
use crate::error::{DoorError, Result};
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::recognition::LbphRecognizer;
use crate::review::ReviewStore;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Builds the door system from configuration and runs its commands
pub struct DoorApp {
    config: FacedoorConfig,
    event_bus: EventBus,
    cancellation_token: CancellationToken,
    keyboard_enabled: bool,
}

impl DoorApp {
    pub fn new(config: FacedoorConfig) -> Self {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let keyboard_enabled = config.system.keyboard_quit;
        Self {
            config,
            event_bus,
            cancellation_token: CancellationToken::new(),
            keyboard_enabled,
        }
    }

    /// Enable or disable the keyboard quit handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn config(&self) -> &FacedoorConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Token that stops enrollment or the live loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn enrollment_store(&self) -> EnrollmentStore {
        EnrollmentStore::new(&self.config.enrollment.path)
    }

    /// A fresh recognizer trained on the enrollment folder, or `None` without samples
    pub fn train(&self) -> Option<LbphRecognizer> {
        let mut recognizer = LbphRecognizer::new(
            self.config.recognition.threshold,
            self.config.recognition.grid_x,
            self.config.recognition.grid_y,
        );
        train_from_store(&self.enrollment_store(), &mut recognizer).then_some(recognizer)
    }

    /// Capture samples for `name` from the camera.
    ///
    /// A missing camera yields an empty report rather than an error.
    pub async fn enroll(&mut self, name: String, samples: Option<u32>) -> Result<EnrollmentReport> {
        EnrollmentStore::validate_name(&name)?;
        let samples = samples.unwrap_or(self.config.enrollment.samples);

        setup_signal_handlers(self.cancellation_token.clone(), self.event_bus.clone());
        let mut keyboard = self.start_keyboard();

        let config = self.config.clone();
        let quit = self.cancellation_token.clone();
        let result = task::spawn_blocking(move || -> Result<EnrollmentReport> {
            let mut detector = build_detector(&config.detector)?;
            let mut source = match open_camera(&config.camera) {
                Ok(source) => source,
                Err(e) => {
                    error!("Cannot enroll without a camera: {}", e);
                    return Ok(EnrollmentReport {
                        name,
                        requested: samples,
                        ..Default::default()
                    });
                }
            };

            let enroller = Enroller::new(
                config.enrollment.clone(),
                config.camera.flip_horizontal,
                config.camera.equalize,
            );
            let report = enroller.capture(&name, samples, &mut source, &mut detector, &quit);
            source.release();
            report
        })
        .await
        .map_err(|e| DoorError::system(format!("Enrollment task failed: {}", e)));

        if let Some(keyboard) = keyboard.as_mut() {
            keyboard.stop().await;
        }
        result?
    }

    /// Run the live loop until quit or end of stream.
    ///
    /// Refuses to start when no samples are enrolled. With `frames` set, frames are
    /// replayed from that folder instead of the camera.
    pub async fn run(&mut self, frames: Option<PathBuf>) -> Result<LiveReport> {
        let Some(classifier) = self.train() else {
            error!("No trained model, enroll at least one person first");
            return Err(DoorError::NotTrained);
        };

        let review = ReviewStore::from_config(&self.config.review);
        if self.config.review.trim_old {
            if let Err(e) = review.trim_older_than(self.config.review.retention(), SystemTime::now()) {
                warn!("Review folder cleanup failed: {}", e);
            }
        }

        let detector = build_detector(&self.config.detector)?;
        let source: Box<dyn FrameSource> = match &frames {
            Some(dir) => Box::new(DirectorySource::open(dir)?),
            None => open_camera(&self.config.camera)?,
        };

        let audit_stop = CancellationToken::new();
        let audit = spawn_audit_log(&self.event_bus, audit_stop.clone());
        setup_signal_handlers(self.cancellation_token.clone(), self.event_bus.clone());
        let mut keyboard = self.start_keyboard();

        let config = self.config.clone();
        let event_bus = self.event_bus.clone();
        let quit = self.cancellation_token.clone();
        let result = task::spawn_blocking(move || -> Result<LiveReport> {
            let link = if config.actuator.enabled {
                ActuatorLink::connect(
                    Box::new(SerialConnector::from_config(&config.actuator)),
                    LinkTiming::from_config(&config.actuator),
                    Some(event_bus.clone()),
                )
            } else {
                ActuatorLink::log_only(Some(event_bus.clone()))
            };
            let door = DoorController::new(link, config.door.auto_close_timeout())
                .with_events(event_bus.clone());

            let live = LiveLoop::new(source, detector, classifier, door, review, event_bus)?
                .with_preprocessing(config.camera.flip_horizontal, config.camera.equalize);
            Ok(live.run(&quit))
        })
        .await
        .map_err(|e| DoorError::system(format!("Live loop task failed: {}", e)));

        if let Some(keyboard) = keyboard.as_mut() {
            keyboard.stop().await;
        }
        audit_stop.cancel();
        if let Err(e) = audit.await {
            warn!("Audit log task ended abnormally: {}", e);
        }

        let report = result??;
        info!("Door system stopped ({})", report.reason);
        Ok(report)
    }

    fn start_keyboard(&self) -> Option<KeyboardInputHandler> {
        if !self.keyboard_enabled {
            return None;
        }
        let mut handler =
            KeyboardInputHandler::new(self.event_bus.clone(), self.cancellation_token.clone());
        handler.start();
        Some(handler)
    }
}
