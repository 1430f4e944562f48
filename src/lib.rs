pub mod actuator;
pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod door;
pub mod enrollment;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod recognition;
pub mod review;

pub use actuator::{Actuator, ActuatorLink, DoorCommand, LinkState, SendOutcome};
pub use app::{DoorApp, LiveLoop, LiveReport, ShutdownReason};
pub use camera::{DirectorySource, FrameSource};
pub use config::FacedoorConfig;
pub use detection::FaceDetector;
pub use door::{DoorController, DoorState};
pub use enrollment::{EnrollmentReport, EnrollmentStore};
pub use error::{DoorError, Result};
pub use events::{CloseReason, DoorEvent, EventBus, EventFilter, EventReceiver};
pub use frame::{FaceRegion, Frame};
pub use recognition::{ClassificationResult, FaceClassifier, LabeledSample, LbphRecognizer};
pub use review::ReviewStore;
