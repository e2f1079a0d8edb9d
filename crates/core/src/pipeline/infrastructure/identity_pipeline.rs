use crate::pipeline::domain::pipeline::{Pipeline, PipelineError};
use crate::shared::frame::Frame;
use crate::shared::inference_result::InferenceResult;
use crate::shared::pipeline_settings::PipelineSettings;

pub const IDENTITY_PIPELINE_ID: &str = "identity";

/// Returns every frame unchanged with an empty result.
#[derive(Default)]
pub struct IdentityPipeline;

impl IdentityPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl Pipeline for IdentityPipeline {
    fn id(&self) -> &str {
        IDENTITY_PIPELINE_ID
    }

    fn label(&self) -> &str {
        "Identity"
    }

    fn default_settings(&self) -> PipelineSettings {
        PipelineSettings::new()
    }

    fn init(&mut self, _settings: &PipelineSettings) -> Result<(), PipelineError> {
        Ok(())
    }

    fn process(
        &mut self,
        frame: &Frame,
        timestamp_s: f64,
    ) -> Result<(Frame, InferenceResult), PipelineError> {
        Ok((
            frame.clone(),
            InferenceResult::empty(IDENTITY_PIPELINE_ID, timestamp_s),
        ))
    }

    fn close(&mut self) {}
}
