use super::FrameSource;
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "pgm"];

/// Replays image files from a folder, in file name order, as camera frames.
pub struct DirectorySource {
    root: PathBuf,
    pending: VecDeque<PathBuf>,
    frame_counter: u64,
}

impl DirectorySource {
    /// Index every image file directly inside `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&root).map_err(|e| CameraError::DeviceOpen {
            device: root.display().to_string(),
            details: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();

        info!(
            "Replaying {} frames from {}",
            files.len(),
            root.display()
        );

        Ok(Self {
            root,
            pending: files.into(),
            frame_counter: 0,
        })
    }

    /// Frames not yet returned
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.pending.pop_front() {
            match image::open(&path) {
                Ok(decoded) => {
                    self.frame_counter += 1;
                    debug!("Replaying frame {} from {}", self.frame_counter, path.display());
                    return Ok(Some(Frame::new(
                        self.frame_counter,
                        SystemTime::now(),
                        decoded.into_luma8(),
                    )));
                }
                Err(e) => {
                    warn!("Skipping unreadable frame {}: {}", path.display(), e);
                }
            }
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
