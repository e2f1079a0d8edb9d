use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The device or file could not be opened or decoded.
    #[error("{0}")]
    Unavailable(String),
    /// A file source has no more frames. Normal termination.
    #[error("end of stream")]
    EndOfStream,
    /// A live device faulted mid-stream.
    #[error("{0}")]
    Capture(String),
}

/// A camera or video file seen as a sequence of timestamped frames.
///
/// Implementations assign sequence numbers starting at 1 and strictly
/// increasing for the lifetime of one `open`.
pub trait FrameSource: Send {
    /// Opens the underlying device or file and returns its metadata.
    fn open(&mut self) -> Result<VideoMetadata, SourceError>;

    /// Blocks until the next frame is available.
    fn read_frame(&mut self) -> Result<Frame, SourceError>;

    /// Releases the device or file. Safe to call more than once.
    fn close(&mut self);

    /// Human-readable description used in logs.
    fn describe(&self) -> String;
}
