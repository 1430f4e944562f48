use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {details}")]
    Detector { details: String },

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Enrollment error: {details}")]
    Enrollment { details: String },

    #[error("Face classifier is not trained")]
    NotTrained,

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("No working camera found (tried indices {tried:?})")]
    NotAvailable { tried: Vec<u32> },

    #[error("Failed to open camera device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Failed to read frame: {details}")]
    FrameRead { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial transport failure: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<serialport::Error> for ActuatorError {
    fn from(err: serialport::Error) -> Self {
        ActuatorError::Transport(err.into())
    }
}

impl DoorError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn detector<S: Into<String>>(details: S) -> Self {
        Self::Detector {
            details: details.into(),
        }
    }

    pub fn enrollment<S: Into<String>>(details: S) -> Self {
        Self::Enrollment {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DoorError>;
