#[cfg(feature = "onnx")]
mod blazeface;
mod size_filter;

#[cfg(feature = "onnx")]
pub use blazeface::BlazefaceDetector;
pub use size_filter::SizeFilteredDetector;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::frame::{FaceRegion, Frame};

/// Finds face bounding boxes in a frame.
///
/// Implementations may be stateful, hence `&mut self`. The order of the returned regions
/// carries no meaning and an empty list is a normal result.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        (**self).detect(frame)
    }
}

/// Build the configured detector wrapped in the face size bounds
#[cfg(feature = "onnx")]
pub fn build_detector(config: &DetectorConfig) -> Result<Box<dyn FaceDetector>> {
    let inner = BlazefaceDetector::new(std::path::Path::new(&config.model_path), config.confidence)?;
    Ok(Box::new(SizeFilteredDetector::new(
        inner,
        config.min_face_size,
        config.max_face_size,
    )))
}

/// Build the configured detector wrapped in the face size bounds
#[cfg(not(feature = "onnx"))]
pub fn build_detector(config: &DetectorConfig) -> Result<Box<dyn FaceDetector>> {
    Err(crate::error::DoorError::detector(format!(
        "no face detector backend compiled in (model {}); rebuild with --features onnx",
        config.model_path
    )))
}
