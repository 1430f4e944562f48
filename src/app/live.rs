use super::ShutdownReason;
use crate::actuator::{Actuator, DoorCommand};
use crate::camera::FrameSource;
use crate::detection::FaceDetector;
use crate::door::DoorController;
use crate::error::{DoorError, Result};
use crate::events::{DoorEvent, EventBus};
use crate::frame::{FaceRegion, Frame};
use crate::recognition::{ClassificationResult, FaceClassifier};
use crate::review::ReviewStore;
use image::GrayImage;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct LiveReport {
    pub frames: u64,
    pub faces: u64,
    pub authorized_faces: u64,
    pub unknown_faces: u64,
    pub snapshots: u64,
    pub commands: Vec<DoorCommand>,
    pub reason: ShutdownReason,
}

/// What one frame produced
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub results: Vec<ClassificationResult>,
    pub command: Option<DoorCommand>,
}

/// The single-threaded recognition loop: frame, detect, classify, decide.
pub struct LiveLoop<S, D, C, A>
where
    S: FrameSource,
    D: FaceDetector,
    C: FaceClassifier,
    A: Actuator,
{
    source: S,
    detector: D,
    classifier: C,
    door: DoorController<A>,
    review: ReviewStore,
    events: EventBus,
    flip_horizontal: bool,
    equalize: bool,
    report: LiveReport,
}

impl<S, D, C, A> LiveLoop<S, D, C, A>
where
    S: FrameSource,
    D: FaceDetector,
    C: FaceClassifier,
    A: Actuator,
{
    /// Assemble the loop. Refuses an untrained classifier.
    pub fn new(
        source: S,
        detector: D,
        classifier: C,
        door: DoorController<A>,
        review: ReviewStore,
        events: EventBus,
    ) -> Result<Self> {
        if !classifier.is_trained() {
            return Err(DoorError::NotTrained);
        }

        Ok(Self {
            source,
            detector,
            classifier,
            door,
            review,
            events,
            flip_horizontal: false,
            equalize: false,
            report: LiveReport {
                frames: 0,
                faces: 0,
                authorized_faces: 0,
                unknown_faces: 0,
                snapshots: 0,
                commands: Vec::new(),
                reason: ShutdownReason::EndOfStream,
            },
        })
    }

    /// Mirror and equalize frames before detection
    pub fn with_preprocessing(mut self, flip_horizontal: bool, equalize: bool) -> Self {
        self.flip_horizontal = flip_horizontal;
        self.equalize = equalize;
        self
    }

    pub fn door(&self) -> &DoorController<A> {
        &self.door
    }

    /// Run until `quit` is cancelled or the source ends. Cleanup always runs.
    pub fn run(mut self, quit: &CancellationToken) -> LiveReport {
        info!(
            "Face recognition door system running on {}, enrolled: {}",
            self.source.describe(),
            self.classifier.labels().join(", ")
        );

        let reason = loop {
            if quit.is_cancelled() {
                break ShutdownReason::Requested;
            }

            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    self.process_frame(frame, Instant::now());
                }
                Ok(None) => break ShutdownReason::EndOfStream,
                Err(e) => {
                    error!("Failed to read frame: {}", e);
                    break ShutdownReason::SourceFailed(e.to_string());
                }
            }
        };

        self.shutdown(reason)
    }

    /// Handle one frame at time `now`
    pub fn process_frame(&mut self, mut frame: Frame, now: Instant) -> FrameOutcome {
        self.report.frames += 1;
        frame.preprocess(self.flip_horizontal, self.equalize);

        let regions = match self.detector.detect(&frame) {
            Ok(regions) => regions,
            Err(e) => {
                warn!("Detection failed on frame {}: {}", frame.id, e);
                Vec::new()
            }
        };

        let mut results = Vec::with_capacity(regions.len());
        for region in &regions {
            let Some(face) = frame.crop(region) else {
                continue;
            };
            self.report.faces += 1;

            let result = self.classifier.classify(&face);
            if result.is_authorized() {
                self.report.authorized_faces += 1;
            } else {
                self.report.unknown_faces += 1;
                self.audit_unknown(&frame, region, &face, &result, now);
            }
            results.push(result);
        }

        let command = self.door.observe(&results, now);
        if let Some(command) = command {
            self.report.commands.push(command);
        }

        FrameOutcome { results, command }
    }

    fn audit_unknown(
        &mut self,
        frame: &Frame,
        region: &FaceRegion,
        face: &GrayImage,
        result: &ClassificationResult,
        now: Instant,
    ) {
        let snapshot = match self.review.save_unknown(
            face,
            result.confidence(),
            frame.id,
            *region,
            frame.timestamp,
            now,
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to save unknown face: {}", e);
                None
            }
        };

        match snapshot {
            Some(path) => {
                self.report.snapshots += 1;
                self.events.publish(DoorEvent::UnknownFace {
                    confidence: result.confidence(),
                    snapshot: Some(path),
                    timestamp: SystemTime::now(),
                });
            }
            None => debug!(
                "Unknown face on frame {} (confidence {:.1})",
                frame.id,
                result.confidence()
            ),
        }
    }

    fn shutdown(mut self, reason: ShutdownReason) -> LiveReport {
        info!("Stopping live loop: {}", reason);

        if let Some(command) = self.door.shutdown() {
            self.report.commands.push(command);
        }
        self.source.release();

        self.report.reason = reason;
        info!(
            "Processed {} frames, {} faces ({} authorized, {} unknown)",
            self.report.frames,
            self.report.faces,
            self.report.authorized_faces,
            self.report.unknown_faces
        );
        self.report
    }
}
