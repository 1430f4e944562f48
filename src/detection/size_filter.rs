use super::FaceDetector;
use crate::error::Result;
use crate::frame::{FaceRegion, Frame};
use tracing::trace;

/// Drops detections whose size falls outside `[min_size, max_size]`
pub struct SizeFilteredDetector<D> {
    inner: D,
    min_size: u32,
    max_size: u32,
}

impl<D: FaceDetector> SizeFilteredDetector<D> {
    pub fn new(inner: D, min_size: u32, max_size: u32) -> Self {
        Self {
            inner,
            min_size,
            max_size,
        }
    }

    fn accepts(&self, region: &FaceRegion) -> bool {
        region.min_edge() >= self.min_size && region.max_edge() <= self.max_size
    }
}

impl<D: FaceDetector> FaceDetector for SizeFilteredDetector<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        let regions = self.inner.detect(frame)?;
        let total = regions.len();
        let kept: Vec<FaceRegion> = regions.into_iter().filter(|r| self.accepts(r)).collect();
        if kept.len() != total {
            trace!(
                "Frame {}: kept {} of {} detections within {}..={}px",
                frame.id,
                kept.len(),
                total,
                self.min_size,
                self.max_size
            );
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::time::SystemTime;

    struct FixedDetector(Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_size_bounds_are_inclusive() {
        let regions = vec![
            FaceRegion::new(0, 0, 79, 120),
            FaceRegion::new(0, 0, 80, 80),
            FaceRegion::new(0, 0, 400, 400),
            FaceRegion::new(0, 0, 200, 401),
        ];
        let mut detector = SizeFilteredDetector::new(FixedDetector(regions), 80, 400);
        let frame = Frame::new(1, SystemTime::now(), GrayImage::new(640, 480));

        let kept = detector.detect(&frame).unwrap();

        assert_eq!(
            kept,
            vec![FaceRegion::new(0, 0, 80, 80), FaceRegion::new(0, 0, 400, 400)]
        );
    }
}
