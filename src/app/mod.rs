mod live;
mod orchestrator;
mod runtime;
mod types;

#[cfg(test)]
mod tests;

pub use live::{FrameOutcome, LiveLoop, LiveReport};
pub use orchestrator::DoorApp;
pub use types::ShutdownReason;
