use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::GrayImage;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// GStreamer V4L2 camera delivering GRAY8 frames through an appsink
pub struct CameraInterface {
    config: CameraConfig,
    device_index: u32,
    pipeline: Option<Pipeline>,
    appsink: AppSink,
    frame_counter: u64,
}

impl CameraInterface {
    /// Build and start the capture pipeline for `/dev/video{device_index}`
    pub fn open(config: &CameraConfig, device_index: u32) -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = build_pipeline_string(config, device_index);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::DeviceOpen {
                device: format!("/dev/video{}", device_index),
                details: e.to_string(),
            })?;

        Ok(Self {
            config: config.clone(),
            device_index,
            pipeline: Some(pipeline),
            appsink,
            frame_counter: 0,
        })
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    fn sample_to_frame(&mut self, sample: gstreamer::Sample) -> Result<Frame> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::FrameRead {
            details: "No buffer in sample".to_string(),
        })?;
        let caps = sample.caps().ok_or_else(|| CameraError::FrameRead {
            details: "No caps in sample".to_string(),
        })?;
        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::FrameRead {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;

        let map = buffer.map_readable().map_err(|e| CameraError::FrameRead {
            details: format!("Failed to map buffer: {}", e),
        })?;
        let data = map.as_slice();

        // GRAY8 rows are padded to the stride; copy the visible part of each row
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + width as usize;
            let line = data.get(start..end).ok_or_else(|| CameraError::FrameRead {
                details: format!("Short buffer: {} bytes for {}x{}", data.len(), width, height),
            })?;
            pixels.extend_from_slice(line);
        }

        let image = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
            CameraError::FrameRead {
                details: "Frame size does not match dimensions".to_string(),
            }
        })?;

        self.frame_counter += 1;
        trace!("Captured frame {} ({}x{})", self.frame_counter, width, height);

        Ok(Frame::new(self.frame_counter, SystemTime::now(), image))
    }
}

impl FrameSource for CameraInterface {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.pipeline.is_none() {
            return Ok(None);
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.config.frame_timeout_ms);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => self.sample_to_frame(sample).map(Some),
            None if self.appsink.is_eos() => {
                warn!("Camera /dev/video{} reached end of stream", self.device_index);
                Ok(None)
            }
            None => Err(CameraError::FrameRead {
                details: format!(
                    "No frame from /dev/video{} within {}ms",
                    self.device_index, self.config.frame_timeout_ms
                ),
            }
            .into()),
        }
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
            debug!("Released camera /dev/video{}", self.device_index);
        }
    }

    fn describe(&self) -> String {
        format!("camera /dev/video{}", self.device_index)
    }
}

impl Drop for CameraInterface {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build GStreamer pipeline string for grayscale capture
fn build_pipeline_string(config: &CameraConfig, device_index: u32) -> String {
    let (width, height) = config.resolution;
    format!(
        "v4l2src device=/dev/video{} ! \
         videoconvert ! videoscale ! \
         video/x-raw,format=GRAY8,width={},height={} ! \
         appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
        device_index, width, height
    )
}
