use std::fmt;

/// Why the live loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Quit key, signal or any other cancellation of the quit token
    Requested,
    /// The frame source ran out of frames
    EndOfStream,
    /// The frame source failed mid-run
    SourceFailed(String),
}

impl ShutdownReason {
    /// Process exit code for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Requested | ShutdownReason::EndOfStream => 0,
            ShutdownReason::SourceFailed(_) => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Requested => f.write_str("quit requested"),
            ShutdownReason::EndOfStream => f.write_str("end of stream"),
            ShutdownReason::SourceFailed(details) => write!(f, "frame source failed: {}", details),
        }
    }
}
