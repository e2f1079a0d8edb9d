use std::path::PathBuf;

use thiserror::Error;

use crate::capture::domain::frame_source::SourceError;
use crate::pipeline::domain::pipeline::PipelineError;

/// Failures returned by engine commands.
///
/// Per-frame pipeline failures and end-of-stream never reach a caller through
/// this type; they are handled inside the loop and reported through the run
/// status instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("capture error: {0}")]
    CaptureError(String),
    #[error("pipeline '{pipeline}' failed to initialize: {reason}")]
    InitializationError { pipeline: String, reason: String },
    #[error("pipeline processing failed: {0}")]
    PipelineProcessingFailure(String),
    #[error("unknown pipeline '{0}'")]
    UnknownPipeline(String),
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error("no frame available yet")]
    NoFrameAvailable,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording in progress")]
    NotRecording,
    #[error("engine command worker has shut down")]
    EngineShutDown,
}

impl From<SourceError> for EngineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => EngineError::SourceUnavailable(msg),
            SourceError::EndOfStream => EngineError::CaptureError("end of stream".to_string()),
            SourceError::Capture(msg) => EngineError::CaptureError(msg),
        }
    }
}

impl From<PipelineError> for EngineError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Initialization { pipeline, reason } => {
                EngineError::InitializationError { pipeline, reason }
            }
            PipelineError::Processing(msg) => EngineError::PipelineProcessingFailure(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_map_to_taxonomy() {
        assert!(matches!(
            EngineError::from(SourceError::Unavailable("cam 3".into())),
            EngineError::SourceUnavailable(m) if m == "cam 3"
        ));
        assert!(matches!(
            EngineError::from(SourceError::Capture("unplugged".into())),
            EngineError::CaptureError(m) if m == "unplugged"
        ));
    }

    #[test]
    fn test_pipeline_init_error_keeps_pipeline_id() {
        let err = EngineError::from(PipelineError::Initialization {
            pipeline: "pose".into(),
            reason: "missing model".into(),
        });
        assert_eq!(
            err.to_string(),
            "pipeline 'pose' failed to initialize: missing model"
        );
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error as _;
        let err = EngineError::Io {
            path: PathBuf::from("/x/y.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/x/y.png"));
    }
}
