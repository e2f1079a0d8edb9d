use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::pipeline::domain::pipeline::{Pipeline, PipelineError};
use crate::shared::frame::Frame;
use crate::shared::inference_result::InferenceResult;
use crate::shared::pipeline_settings::PipelineSettings;

/// An initialized pipeline bound to the settings it was initialized with.
///
/// Handles are never reconfigured: a settings change builds a new handle.
/// The pipeline is closed exactly once, either explicitly or when the last
/// reference is dropped, so a frame in flight during a swap finishes against
/// the handle it started with.
pub struct PipelineHandle {
    id: String,
    label: String,
    settings: PipelineSettings,
    pipeline: Mutex<Box<dyn Pipeline>>,
    closed: AtomicBool,
}

impl PipelineHandle {
    /// Runs `init` with `settings`. On failure the pipeline is closed and the
    /// error returned.
    pub fn initialize(
        mut pipeline: Box<dyn Pipeline>,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let id = pipeline.id().to_string();
        let label = pipeline.label().to_string();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.init(&settings)))
            .unwrap_or_else(|payload| {
                Err(PipelineError::Initialization {
                    pipeline: id.clone(),
                    reason: format!("init panicked: {}", panic_message(&payload)),
                })
            });

        if let Err(e) = outcome {
            pipeline.close();
            return Err(match e {
                PipelineError::Processing(reason) => PipelineError::Initialization {
                    pipeline: id,
                    reason,
                },
                other => other,
            });
        }

        log::info!("Pipeline '{id}' initialized ({settings})");
        Ok(Self {
            id,
            label,
            settings,
            pipeline: Mutex::new(pipeline),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Processes one frame. A panic inside the pipeline is reported as a
    /// processing failure for this frame only.
    pub fn process(
        &self,
        frame: &Frame,
        timestamp_s: f64,
    ) -> Result<(Frame, InferenceResult), PipelineError> {
        let mut pipeline = self.lock();
        if self.is_closed() {
            return Err(PipelineError::Processing(format!(
                "pipeline '{}' is closed",
                self.id
            )));
        }
        panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(frame, timestamp_s)))
            .unwrap_or_else(|payload| {
                Err(PipelineError::Processing(format!(
                    "pipeline '{}' panicked: {}",
                    self.id,
                    panic_message(&payload)
                )))
            })
    }

    /// Closes the pipeline. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut pipeline = self.lock();
        if panic::catch_unwind(AssertUnwindSafe(|| pipeline.close())).is_err() {
            log::error!("Pipeline '{}' panicked while closing", self.id);
        } else {
            log::debug!("Pipeline '{}' closed", self.id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Pipeline>> {
        self.pipeline.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Counters shared between a scripted pipeline and the test.
    #[derive(Clone, Default)]
    pub struct PipelineProbe {
        pub init_calls: Arc<AtomicUsize>,
        pub process_calls: Arc<Mutex<Vec<u64>>>,
        pub close_calls: Arc<AtomicUsize>,
    }

    /// Pipeline with scripted behavior: optional init failure, a failing or
    /// panicking frame, and a per-frame delay.
    pub struct ScriptedPipeline {
        pub id: &'static str,
        pub probe: PipelineProbe,
        pub fail_init: bool,
        pub fail_on: Option<u64>,
        pub panic_on: Option<u64>,
        pub delay: std::time::Duration,
    }

    impl ScriptedPipeline {
        pub fn new(id: &'static str, probe: PipelineProbe) -> Self {
            Self {
                id,
                probe,
                fail_init: false,
                fail_on: None,
                panic_on: None,
                delay: std::time::Duration::ZERO,
            }
        }
    }

    impl Pipeline for ScriptedPipeline {
        fn id(&self) -> &str {
            self.id
        }

        fn label(&self) -> &str {
            "Scripted"
        }

        fn default_settings(&self) -> PipelineSettings {
            PipelineSettings::new().with("level", 1)
        }

        fn init(&mut self, _settings: &PipelineSettings) -> Result<(), PipelineError> {
            self.probe.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(PipelineError::Initialization {
                    pipeline: self.id.to_string(),
                    reason: "model file missing".to_string(),
                });
            }
            Ok(())
        }

        fn process(
            &mut self,
            frame: &Frame,
            timestamp_s: f64,
        ) -> Result<(Frame, InferenceResult), PipelineError> {
            self.probe
                .process_calls
                .lock()
                .unwrap()
                .push(frame.sequence());
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.panic_on == Some(frame.sequence()) {
                panic!("boom on frame {}", frame.sequence());
            }
            if self.fail_on == Some(frame.sequence()) {
                return Err(PipelineError::Processing("inference failed".to_string()));
            }
            let mut result = InferenceResult::empty(self.id, timestamp_s);
            result
                .metadata
                .insert("frame".to_string(), frame.sequence().into());
            Ok((frame.clone(), result))
        }

        fn close(&mut self) {
            self.probe.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}
