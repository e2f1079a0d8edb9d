use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    DEFAULT_CAMERA_PROBE_LIMIT, DEFAULT_FALLBACK_FPS, DEFAULT_METRICS_WINDOW,
};

/// Engine tuning loaded from JSON. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the rolling latency window.
    pub metrics_window: usize,
    /// Recording frame rate used when no measured or source rate exists.
    pub fallback_fps: f64,
    /// Camera indices `0..camera_probe_limit` are probed when listing devices.
    pub camera_probe_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metrics_window: DEFAULT_METRICS_WINDOW,
            fallback_fps: DEFAULT_FALLBACK_FPS,
            camera_probe_limit: DEFAULT_CAMERA_PROBE_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("VisionHost").join("config.json"))
    }

    /// Loads from the platform config directory, falling back to defaults.
    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads from `path`. A missing or malformed file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<EngineConfig>(&json) {
                Ok(config) => config.sanitized(),
                Err(e) => {
                    log::warn!("Ignoring malformed config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, json)
    }

    fn sanitized(mut self) -> Self {
        if self.metrics_window == 0 {
            self.metrics_window = DEFAULT_METRICS_WINDOW;
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            self.fallback_fps = DEFAULT_FALLBACK_FPS;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"metrics_window": 60}"#).unwrap();
        let config = EngineConfig::load_from(&path);
        assert_eq!(config.metrics_window, 60);
        assert_eq!(config.fallback_fps, DEFAULT_FALLBACK_FPS);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(EngineConfig::load_from(&path), EngineConfig::default());
    }

    #[test]
    fn test_zero_window_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"metrics_window": 0, "fallback_fps": -1.0}"#).unwrap();
        let config = EngineConfig::load_from(&path);
        assert_eq!(config.metrics_window, DEFAULT_METRICS_WINDOW);
        assert_eq!(config.fallback_fps, DEFAULT_FALLBACK_FPS);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = EngineConfig {
            metrics_window: 90,
            fallback_fps: 25.0,
            camera_probe_limit: 4,
        };
        config.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path), config);
    }
}
