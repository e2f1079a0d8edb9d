use std::path::Path;

use crate::shared::inference_result::InferenceResult;

/// Persists one pipeline result as a structured text document.
pub trait ResultWriter: Send + Sync {
    fn write(&self, path: &Path, result: &InferenceResult)
        -> Result<(), Box<dyn std::error::Error>>;

    fn read(&self, path: &Path) -> Result<InferenceResult, Box<dyn std::error::Error>>;
}
