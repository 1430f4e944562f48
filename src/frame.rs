use image::{imageops, GrayImage};
use imageproc::contrast::equalize_histogram;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A single grayscale camera frame.
///
/// Owned by the loop iteration that acquired it and dropped at the end of that iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame identifier assigned by the source
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    image: GrayImage,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, image: GrayImage) -> Self {
        Self {
            id,
            timestamp,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Mirror and/or equalize the frame in place before detection
    pub fn preprocess(&mut self, flip_horizontal: bool, equalize: bool) {
        if flip_horizontal {
            imageops::flip_horizontal_in_place(&mut self.image);
        }
        if equalize && !self.image.is_empty() {
            self.image = equalize_histogram(&self.image);
        }
    }

    /// Copy out the pixels of `region`, clamped to the frame bounds.
    ///
    /// Returns `None` when the region does not overlap the frame.
    pub fn crop(&self, region: &FaceRegion) -> Option<GrayImage> {
        self.crop_padded(region, 0)
    }

    /// Copy out `region` grown by `padding` pixels on every side, clamped to the frame
    pub fn crop_padded(&self, region: &FaceRegion, padding: u32) -> Option<GrayImage> {
        let clamped = region.padded(padding).clamp_to(self.width(), self.height())?;
        Some(
            imageops::crop_imm(
                &self.image,
                clamped.x as u32,
                clamped.y as u32,
                clamped.width,
                clamped.height,
            )
            .to_image(),
        )
    }
}

/// Axis-aligned face bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Grow the region by `padding` on each side
    pub fn padded(&self, padding: u32) -> FaceRegion {
        let pad = padding.min(i32::MAX as u32) as i32;
        FaceRegion {
            x: self.x.saturating_sub(pad),
            y: self.y.saturating_sub(pad),
            width: self.width.saturating_add(padding.saturating_mul(2)),
            height: self.height.saturating_add(padding.saturating_mul(2)),
        }
    }

    /// Intersect with a `frame_width` x `frame_height` frame; `None` if empty
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceRegion> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_height));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(FaceRegion {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Longest edge of the box
    pub fn max_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Shortest edge of the box
    pub fn min_edge(&self) -> u32 {
        self.width.min(self.height)
    }
}
