use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable settings snapshot for one pipeline instance.
///
/// Reconfiguring a pipeline means building a new value (via [`with`](Self::with)
/// or [`merged_over`](Self::merged_over)) and a new handle; a live value is
/// never mutated. Clones share storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSettings {
    values: Arc<BTreeMap<String, Value>>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid setting '{0}': expected key=value")]
pub struct SettingParseError(pub String);

impl PipelineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new settings value with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Self {
            values: Arc::new(values),
        }
    }

    /// Overlays `self` on top of `defaults`: keys present here win.
    pub fn merged_over(&self, defaults: &PipelineSettings) -> Self {
        let mut values = (*defaults.values).clone();
        for (k, v) in self.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        Self {
            values: Arc::new(values),
        }
    }

    /// Parses `key=value` pairs. Values that parse as JSON (numbers, booleans)
    /// keep their type; anything else is stored as a string.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, SettingParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair
                .split_once('=')
                .filter(|(k, _)| !k.trim().is_empty())
                .ok_or_else(|| SettingParseError(pair.to_string()))?;
            let value = serde_json::from_str::<Value>(raw.trim())
                .ok()
                .filter(|v| !v.is_object() && !v.is_array())
                .unwrap_or_else(|| Value::String(raw.trim().to_string()));
            values.insert(key.trim().to_string(), value);
        }
        Ok(Self {
            values: Arc::new(values),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for PipelineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_returns_new_value() {
        let base = PipelineSettings::new().with("threshold", 25);
        let changed = base.with("threshold", 40);
        assert_eq!(base.get_u64("threshold"), Some(25));
        assert_eq!(changed.get_u64("threshold"), Some(40));
    }

    #[test]
    fn test_merged_over_prefers_overrides() {
        let defaults = PipelineSettings::new()
            .with("num_poses", 1)
            .with("min_confidence", 0.5);
        let overrides = PipelineSettings::new().with("min_confidence", 0.8);
        let merged = overrides.merged_over(&defaults);
        assert_eq!(merged.get_u64("num_poses"), Some(1));
        assert_eq!(merged.get_f64("min_confidence"), Some(0.8));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_from_pairs_keeps_types() {
        let s = PipelineSettings::from_pairs(["a=3", "b=0.25", "c=true", "d=hello"]).unwrap();
        assert_eq!(s.get_u64("a"), Some(3));
        assert_eq!(s.get_f64("b"), Some(0.25));
        assert_eq!(s.get_bool("c"), Some(true));
        assert_eq!(s.get("d"), Some(&json!("hello")));
    }

    #[test]
    fn test_from_pairs_rejects_missing_separator() {
        let err = PipelineSettings::from_pairs(["novalue"]).unwrap_err();
        assert_eq!(err, SettingParseError("novalue".to_string()));
        assert!(PipelineSettings::from_pairs(["=3"]).is_err());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let s = PipelineSettings::new().with("k", 1);
        assert_eq!(serde_json::to_value(&s).unwrap(), json!({"k": 1}));
        let back: PipelineSettings = serde_json::from_value(json!({"k": 1})).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_display_lists_pairs_in_key_order() {
        let s = PipelineSettings::new().with("b", 2).with("a", "x");
        assert_eq!(s.to_string(), "a=\"x\", b=2");
    }
}
