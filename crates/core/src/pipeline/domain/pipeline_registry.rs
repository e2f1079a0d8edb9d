use std::collections::BTreeMap;

use crate::pipeline::domain::pipeline::Pipeline;
use crate::pipeline::domain::pipeline_handle::PipelineHandle;
use crate::pipeline::infrastructure::identity_pipeline::IdentityPipeline;
use crate::pipeline::infrastructure::motion_pipeline::MotionPipeline;
use crate::shared::engine_error::EngineError;
use crate::shared::pipeline_settings::PipelineSettings;

type PipelineFactory = Box<dyn Fn() -> Box<dyn Pipeline> + Send + Sync>;

struct Registration {
    label: String,
    defaults: PipelineSettings,
    factory: PipelineFactory,
}

/// Static registry of the pipelines this build knows about.
///
/// Each entry is a factory; [`create`](Self::create) builds a fresh instance
/// and initializes it with the caller's overrides merged over the defaults.
#[derive(Default)]
pub struct PipelineRegistry {
    entries: BTreeMap<String, Registration>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the pipelines bundled in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(|| Box::new(IdentityPipeline::new()));
        registry.register(|| Box::new(MotionPipeline::new()));
        registry
    }

    /// Registers a factory. The id, label and defaults are read from a probe
    /// instance that is never initialized. Returns `false` and keeps the
    /// existing entry when the id is already taken.
    pub fn register<F>(&mut self, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Pipeline> + Send + Sync + 'static,
    {
        let mut probe = factory();
        let id = probe.id().to_string();
        let label = probe.label().to_string();
        let defaults = probe.default_settings();
        probe.close();

        if self.entries.contains_key(&id) {
            log::warn!("Duplicate pipeline id '{id}' ignored");
            return false;
        }
        log::debug!("Registered pipeline '{id}' ({label})");
        self.entries.insert(
            id,
            Registration {
                label,
                defaults,
                factory: Box::new(factory),
            },
        );
        true
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|r| r.label.as_str())
    }

    pub fn default_settings(&self, id: &str) -> Option<&PipelineSettings> {
        self.entries.get(id).map(|r| &r.defaults)
    }

    /// Builds and initializes a new instance of `id`.
    pub fn create(
        &self,
        id: &str,
        overrides: &PipelineSettings,
    ) -> Result<PipelineHandle, EngineError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| EngineError::UnknownPipeline(id.to_string()))?;
        let settings = overrides.merged_over(&entry.defaults);
        let handle = PipelineHandle::initialize((entry.factory)(), settings)?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::pipeline_handle::test_support::{
        PipelineProbe, ScriptedPipeline,
    };
    use std::sync::atomic::Ordering;

    #[test]
    fn test_builtins_are_listed_sorted() {
        let registry = PipelineRegistry::with_builtins();
        assert_eq!(registry.ids(), vec!["identity", "motion"]);
        assert_eq!(registry.label("motion"), Some("Motion detection"));
    }

    #[test]
    fn test_create_merges_overrides_over_defaults() {
        let registry = PipelineRegistry::with_builtins();
        let handle = registry
            .create("motion", &PipelineSettings::new().with("threshold", 40))
            .unwrap();
        assert_eq!(handle.settings().get_u64("threshold"), Some(40));
        assert_eq!(handle.settings().get_f64("min_area"), Some(0.001));
    }

    #[test]
    fn test_create_unknown_id_fails() {
        let registry = PipelineRegistry::with_builtins();
        let err = registry.create("pose", &PipelineSettings::new()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPipeline(id) if id == "pose"));
    }

    #[test]
    fn test_create_maps_init_failure() {
        let probe = PipelineProbe::default();
        let mut registry = PipelineRegistry::new();
        let p = probe.clone();
        registry.register(move || {
            let mut pipeline = ScriptedPipeline::new("broken", p.clone());
            pipeline.fail_init = true;
            Box::new(pipeline)
        });

        let err = registry.create("broken", &PipelineSettings::new()).unwrap_err();
        assert!(matches!(err, EngineError::InitializationError { pipeline, .. } if pipeline == "broken"));
        // One close for the registration probe, one for the failed instance.
        assert_eq!(probe.close_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut registry = PipelineRegistry::with_builtins();
        assert!(!registry.register(|| Box::new(IdentityPipeline::new())));
        assert_eq!(registry.ids().len(), 2);
    }

    #[test]
    fn test_each_create_builds_a_fresh_instance() {
        let probe = PipelineProbe::default();
        let mut registry = PipelineRegistry::new();
        let p = probe.clone();
        registry.register(move || Box::new(ScriptedPipeline::new("stub", p.clone())));

        let a = registry.create("stub", &PipelineSettings::new()).unwrap();
        let b = registry.create("stub", &PipelineSettings::new()).unwrap();
        assert_eq!(probe.init_calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.settings().get_u64("level"), Some(1));
        drop((a, b));
    }
}
