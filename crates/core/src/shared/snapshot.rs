use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::inference_result::InferenceResult;

/// The unit published to subscribers: one annotated frame with the result
/// produced for it.
///
/// Built only by the orchestrator and shared behind an `Arc`, so a reader
/// always sees a frame together with its own result.
#[derive(Debug)]
pub struct Snapshot {
    frame: Frame,
    result: InferenceResult,
    sequence: u64,
    latency: Duration,
}

impl Snapshot {
    pub fn new(frame: Frame, result: InferenceResult, latency: Duration) -> Self {
        let sequence = frame.sequence();
        Self {
            frame,
            result,
            sequence,
            latency,
        }
    }

    /// The annotated frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn result(&self) -> &InferenceResult {
        &self.result
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}
