use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FacedoorConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub recognition: RecognitionConfig,
    pub door: DoorConfig,
    pub actuator: ActuatorConfig,
    pub enrollment: EnrollmentConfig,
    pub review: ReviewConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera device indices to probe in order (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_indices")]
    pub indices: Vec<u32>,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Mirror frames horizontally before detection
    #[serde(default = "default_flip_horizontal")]
    pub flip_horizontal: bool,

    /// Equalize the grayscale histogram before detection
    #[serde(default = "default_equalize")]
    pub equalize: bool,

    /// How long to wait for a single frame before treating the camera as failed
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Path to the BlazeFace ONNX model
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Minimum detection score
    #[serde(default = "default_detector_confidence")]
    pub confidence: f64,

    /// Smallest accepted face edge in pixels
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,

    /// Largest accepted face edge in pixels
    #[serde(default = "default_max_face_size")]
    pub max_face_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecognitionConfig {
    /// Distance below which a match is authorized (strictly less than)
    #[serde(default = "default_recognition_threshold")]
    pub threshold: f64,

    /// LBPH histogram grid columns
    #[serde(default = "default_grid")]
    pub grid_x: u32,

    /// LBPH histogram grid rows
    #[serde(default = "default_grid")]
    pub grid_y: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DoorConfig {
    /// Seconds without an authorized face before the door closes
    #[serde(default = "default_auto_close_seconds")]
    pub auto_close_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ActuatorConfig {
    /// Disable to run in log-only mode
    #[serde(default = "default_actuator_enabled")]
    pub enabled: bool,

    /// Serial device path (e.g., /dev/ttyUSB0 or COM3)
    #[serde(default = "default_actuator_port")]
    pub port: String,

    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Serial read/write timeout
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay after opening the port while the microcontroller resets
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Window to wait for a diagnostic echo after a command
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,

    /// Pause between closing a failed port and reopening it
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EnrollmentConfig {
    /// Folder holding enrolled face samples
    #[serde(default = "default_enrollment_path")]
    pub path: String,

    /// Samples captured per enrollment
    #[serde(default = "default_samples")]
    pub samples: u32,

    /// Only every Nth frame with a face is sampled
    #[serde(default = "default_capture_every")]
    pub capture_every: u32,

    /// Padding around the detected face when saving a sample
    #[serde(default = "default_padding")]
    pub padding: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReviewConfig {
    /// Folder for unauthorized face snapshots
    #[serde(default = "default_review_path")]
    pub path: String,

    /// Minimum gap between two snapshots (0 saves every unknown face)
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Save a JSON sidecar next to each snapshot
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,

    /// Remove snapshots older than the retention period at startup
    #[serde(default = "default_trim_old")]
    pub trim_old: bool,

    /// Retention period in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Listen for q/Esc on the terminal to stop the live loop
    #[serde(default = "default_keyboard_quit")]
    pub keyboard_quit: bool,
}

impl FacedoorConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("facedoor.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let indices: Vec<i64> = default_camera_indices()
            .into_iter()
            .map(i64::from)
            .collect();

        let settings = Config::builder()
            .set_default("camera.indices", indices)?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.flip_horizontal", default_flip_horizontal())?
            .set_default("camera.equalize", default_equalize())?
            .set_default("camera.frame_timeout_ms", default_frame_timeout_ms())?
            .set_default("detector.model_path", default_model_path())?
            .set_default("detector.confidence", default_detector_confidence())?
            .set_default("detector.min_face_size", default_min_face_size())?
            .set_default("detector.max_face_size", default_max_face_size())?
            .set_default("recognition.threshold", default_recognition_threshold())?
            .set_default("recognition.grid_x", default_grid())?
            .set_default("recognition.grid_y", default_grid())?
            .set_default("door.auto_close_seconds", default_auto_close_seconds())?
            .set_default("actuator.enabled", default_actuator_enabled())?
            .set_default("actuator.port", default_actuator_port())?
            .set_default("actuator.baud_rate", default_baud_rate())?
            .set_default("actuator.timeout_ms", default_serial_timeout_ms())?
            .set_default("actuator.settle_ms", default_settle_ms())?
            .set_default("actuator.response_wait_ms", default_response_wait_ms())?
            .set_default("actuator.reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default("enrollment.path", default_enrollment_path())?
            .set_default("enrollment.samples", default_samples())?
            .set_default("enrollment.capture_every", default_capture_every())?
            .set_default("enrollment.padding", default_padding())?
            .set_default("review.path", default_review_path())?
            .set_default(
                "review.snapshot_interval_ms",
                default_snapshot_interval_ms(),
            )?
            .set_default("review.save_metadata", default_save_metadata())?
            .set_default("review.trim_old", default_trim_old())?
            .set_default("review.retention_days", default_retention_days())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.keyboard_quit", default_keyboard_quit())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // FACEDOOR_ACTUATOR__PORT=/dev/ttyACM0 style overrides
            .add_source(
                Environment::with_prefix("FACEDOOR")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: FacedoorConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.indices.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera index must be configured".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.detector.min_face_size > self.detector.max_face_size {
            return Err(ConfigError::Message(
                "Detector min_face_size must not exceed max_face_size".to_string(),
            ));
        }

        if !(self.recognition.threshold > 0.0) {
            return Err(ConfigError::Message(
                "Recognition threshold must be greater than 0".to_string(),
            ));
        }

        if self.recognition.grid_x == 0 || self.recognition.grid_y == 0 {
            return Err(ConfigError::Message(
                "Recognition grid must be at least 1x1".to_string(),
            ));
        }

        if !(0.0..=MAX_AUTO_CLOSE_SECONDS).contains(&self.door.auto_close_seconds) {
            return Err(ConfigError::Message(format!(
                "Door auto_close_seconds must be between 0 and {}",
                MAX_AUTO_CLOSE_SECONDS
            )));
        }

        if self.actuator.baud_rate == 0 {
            return Err(ConfigError::Message(
                "Actuator baud_rate must be greater than 0".to_string(),
            ));
        }

        if self.enrollment.samples == 0 || self.enrollment.capture_every == 0 {
            return Err(ConfigError::Message(
                "Enrollment samples and capture_every must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CameraConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// One day; a door left open longer than this is not an auto-close
const MAX_AUTO_CLOSE_SECONDS: f64 = 86_400.0;

impl DoorConfig {
    /// Auto-close grace window, clamped to the range `validate` accepts
    pub fn auto_close_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.auto_close_seconds.min(MAX_AUTO_CLOSE_SECONDS))
            .unwrap_or(Duration::ZERO)
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.response_wait_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl ReviewConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 3600)
    }
}

impl Default for FacedoorConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                indices: default_camera_indices(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                flip_horizontal: default_flip_horizontal(),
                equalize: default_equalize(),
                frame_timeout_ms: default_frame_timeout_ms(),
            },
            detector: DetectorConfig {
                model_path: default_model_path(),
                confidence: default_detector_confidence(),
                min_face_size: default_min_face_size(),
                max_face_size: default_max_face_size(),
            },
            recognition: RecognitionConfig {
                threshold: default_recognition_threshold(),
                grid_x: default_grid(),
                grid_y: default_grid(),
            },
            door: DoorConfig {
                auto_close_seconds: default_auto_close_seconds(),
            },
            actuator: ActuatorConfig {
                enabled: default_actuator_enabled(),
                port: default_actuator_port(),
                baud_rate: default_baud_rate(),
                timeout_ms: default_serial_timeout_ms(),
                settle_ms: default_settle_ms(),
                response_wait_ms: default_response_wait_ms(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
            },
            enrollment: EnrollmentConfig {
                path: default_enrollment_path(),
                samples: default_samples(),
                capture_every: default_capture_every(),
                padding: default_padding(),
            },
            review: ReviewConfig {
                path: default_review_path(),
                snapshot_interval_ms: default_snapshot_interval_ms(),
                save_metadata: default_save_metadata(),
                trim_old: default_trim_old(),
                retention_days: default_retention_days(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                keyboard_quit: default_keyboard_quit(),
            },
        }
    }
}

// Default value functions
fn default_camera_indices() -> Vec<u32> {
    vec![0, 1, 2]
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_flip_horizontal() -> bool {
    true
}
fn default_equalize() -> bool {
    true
}
fn default_frame_timeout_ms() -> u64 {
    2000
}

fn default_model_path() -> String {
    "models/blazeface.onnx".to_string()
}
fn default_detector_confidence() -> f64 {
    0.5
}
fn default_min_face_size() -> u32 {
    80
}
fn default_max_face_size() -> u32 {
    400
}

fn default_recognition_threshold() -> f64 {
    100.0
}
fn default_grid() -> u32 {
    8
}

fn default_auto_close_seconds() -> f64 {
    5.0
}

fn default_actuator_enabled() -> bool {
    true
}
fn default_actuator_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_serial_timeout_ms() -> u64 {
    1000
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_response_wait_ms() -> u64 {
    100
}
fn default_reconnect_delay_ms() -> u64 {
    500
}

fn default_enrollment_path() -> String {
    "./known_faces".to_string()
}
fn default_samples() -> u32 {
    30
}
fn default_capture_every() -> u32 {
    3
}
fn default_padding() -> u32 {
    20
}

fn default_review_path() -> String {
    "./captured_faces".to_string()
}
fn default_snapshot_interval_ms() -> u64 {
    1000
}
fn default_save_metadata() -> bool {
    false
}
fn default_trim_old() -> bool {
    true
}
fn default_retention_days() -> u32 {
    30
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_keyboard_quit() -> bool {
    true
}
