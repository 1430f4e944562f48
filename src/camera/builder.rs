use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use tracing::{info, warn};

/// Tries camera indices in order and keeps the first one that delivers a frame
pub struct CameraProbe {
    indices: Vec<u32>,
}

impl CameraProbe {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    /// Open each index with `opener` and read one test frame.
    ///
    /// Sources that fail to open or cannot produce a frame are released and skipped.
    pub fn open_with<S, F>(&self, mut opener: F) -> Result<S>
    where
        S: FrameSource,
        F: FnMut(u32) -> Result<S>,
    {
        for &index in &self.indices {
            let mut source = match opener(index) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Camera index {} unavailable: {}", index, e);
                    continue;
                }
            };

            match source.next_frame() {
                Ok(Some(_)) => {
                    info!("Using camera index {} ({})", index, source.describe());
                    return Ok(source);
                }
                Ok(None) => warn!("Camera index {} produced no frames", index),
                Err(e) => warn!("Camera index {} failed test read: {}", index, e),
            }
            source.release();
        }

        Err(CameraError::NotAvailable {
            tried: self.indices.clone(),
        }
        .into())
    }
}

/// Open the first working camera from the configured indices
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let probe = CameraProbe::new(config.indices.clone());
    let camera = probe.open_with(|index| super::CameraInterface::open(config, index))?;
    Ok(Box::new(camera))
}

/// Open the first working camera from the configured indices
#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    warn!("Camera capture requires the `camera` feature on Linux");
    Err(CameraError::NotAvailable {
        tried: config.indices.clone(),
    }
    .into())
}
