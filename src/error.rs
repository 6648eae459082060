use std::path::PathBuf;

/// Failures of the capture, pipeline and recording layers.
///
/// None of these terminate the application: the controller logs them,
/// publishes a notice and keeps the interactive loop running.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("camera {id} is unreachable: {reason}")]
    SourceUnreachable { id: String, reason: String },

    #[error("stream ended")]
    StreamEnded,

    #[error("failed to read frame: {0}")]
    ReadFailure(String),

    #[error("cannot record to {}: {reason}", .path.display())]
    WriterCreation { path: PathBuf, reason: String },

    #[error("failed to write frame: {0}")]
    WriterWrite(String),

    #[error("already recording to {}", .0.display())]
    AlreadyRecording(PathBuf),

    #[error("invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, VideoError>;
