use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::inference_result::InferenceResult;
use crate::shared::pipeline_settings::PipelineSettings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("pipeline '{pipeline}' failed to initialize: {reason}")]
    Initialization { pipeline: String, reason: String },
    #[error("{0}")]
    Processing(String),
}

/// Capability contract every inference pipeline satisfies.
///
/// Implementations may keep per-stream state (e.g. the previous frame),
/// hence `&mut self`, but must not touch anything shared with the engine.
pub trait Pipeline: Send {
    /// Stable identifier used by the registry and stamped on results.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn label(&self) -> &str;

    fn default_settings(&self) -> PipelineSettings;

    /// Loads models and applies `settings`. On failure the engine calls
    /// `close` and does not start the run.
    fn init(&mut self, settings: &PipelineSettings) -> Result<(), PipelineError>;

    /// Processes one frame, returning the annotated frame and its result.
    fn process(
        &mut self,
        frame: &Frame,
        timestamp_s: f64,
    ) -> Result<(Frame, InferenceResult), PipelineError>;

    /// Releases all resources. Must tolerate a failed or missing `init`.
    fn close(&mut self);
}
