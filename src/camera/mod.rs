mod builder;
mod directory;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod interface;

pub use builder::{open_camera, CameraProbe};
pub use directory::DirectorySource;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use interface::CameraInterface;

use crate::error::Result;
use crate::frame::Frame;

/// Anything that yields grayscale frames one at a time.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means the source is exhausted and the caller should stop.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Idempotent.
    fn release(&mut self);

    /// Human readable description for logs
    fn describe(&self) -> String;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
