use super::EnrollmentStore;
use crate::camera::FrameSource;
use crate::config::EnrollmentConfig;
use crate::detection::FaceDetector;
use crate::error::{DoorError, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What an enrollment session produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentReport {
    pub name: String,
    pub requested: u32,
    pub saved: Vec<PathBuf>,
    pub frames_seen: u64,
    pub face_frames: u64,
}

impl EnrollmentReport {
    pub fn captured(&self) -> u32 {
        self.saved.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.captured() >= self.requested
    }
}

/// Captures face samples for one person from a live frame source
pub struct Enroller {
    config: EnrollmentConfig,
    flip_horizontal: bool,
    equalize: bool,
    store: EnrollmentStore,
}

impl Enroller {
    pub fn new(config: EnrollmentConfig, flip_horizontal: bool, equalize: bool) -> Self {
        let store = EnrollmentStore::new(&config.path);
        Self {
            config,
            flip_horizontal,
            equalize,
            store,
        }
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }

    /// Capture up to `samples` faces for `name`.
    ///
    /// Every `capture_every`-th frame containing a face is sampled, using the first face
    /// only. Stops early on quit or when the source runs dry.
    pub fn capture<S, D>(
        &self,
        name: &str,
        samples: u32,
        source: &mut S,
        detector: &mut D,
        quit: &CancellationToken,
    ) -> Result<EnrollmentReport>
    where
        S: FrameSource + ?Sized,
        D: FaceDetector + ?Sized,
    {
        EnrollmentStore::validate_name(name)?;

        let capture_every = u64::from(self.config.capture_every.max(1));
        let mut sequence = Some(self.store.next_sequence(name)?);
        let mut report = EnrollmentReport {
            name: name.to_string(),
            requested: samples,
            ..Default::default()
        };

        info!(
            "Enrolling '{}': capturing {} samples from {}",
            name,
            samples,
            source.describe()
        );

        while report.captured() < samples && !quit.is_cancelled() {
            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source exhausted during enrollment");
                    break;
                }
                Err(e) => {
                    warn!("Frame read failed during enrollment: {}", e);
                    break;
                }
            };
            report.frames_seen += 1;
            frame.preprocess(self.flip_horizontal, self.equalize);

            let regions = match detector.detect(&frame) {
                Ok(regions) => regions,
                Err(e) => {
                    warn!("Detection failed on frame {}: {}", frame.id, e);
                    continue;
                }
            };

            let Some(first) = regions.first() else {
                continue;
            };
            report.face_frames += 1;
            if report.face_frames % capture_every != 0 {
                continue;
            }

            let Some(face) = frame.crop_padded(first, self.config.padding) else {
                debug!("Face on frame {} lies outside the frame", frame.id);
                continue;
            };

            let Some(current) = sequence else {
                return Err(DoorError::enrollment(format!(
                    "sequence numbers for '{}' are exhausted",
                    name
                )));
            };
            let path = self.store.save_sample(name, current, &face)?;
            sequence = current.checked_add(1);
            report.saved.push(path);
            info!("Sample {}/{} captured for '{}'", report.captured(), samples, name);
        }

        if report.captured() > 0 {
            info!("Captured {} samples for '{}'", report.captured(), name);
        } else {
            warn!("No samples captured for '{}'", name);
        }

        Ok(report)
    }
}
