use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Axis-aligned region in normalized image coordinates (0.0..=1.0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Converts to pixel coordinates `(x, y, width, height)`, clamped to the frame.
    pub fn to_pixels(&self, frame_w: u32, frame_h: u32) -> (u32, u32, u32, u32) {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let x1 = (self.x * fw).clamp(0.0, fw);
        let y1 = (self.y * fh).clamp(0.0, fh);
        let x2 = ((self.x + self.width) * fw).clamp(0.0, fw);
        let y2 = ((self.y + self.height) * fh).clamp(0.0, fh);
        (
            x1.round() as u32,
            y1.round() as u32,
            (x2 - x1).round().max(0.0) as u32,
            (y2 - y1).round().max(0.0) as u32,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub label: String,
}

/// A single landmark in normalized coordinates. `z` is present for 3D models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

/// Ordered landmarks plus optional edges between point indices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<(usize, usize)>>,
}

/// Structured output of a pipeline for one frame. Immutable once produced.
///
/// Field names are the on-disk results schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub pipeline: String,
    pub timestamp_s: f64,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkSet>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl InferenceResult {
    pub fn empty(pipeline: impl Into<String>, timestamp_s: f64) -> Self {
        Self {
            pipeline: pipeline.into(),
            timestamp_s,
            detections: Vec::new(),
            landmarks: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.landmarks.is_empty() && self.metadata.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_empty_has_no_content() {
        let r = InferenceResult::empty("pose", 1.5);
        assert_eq!(r.pipeline, "pose");
        assert_eq!(r.timestamp_s, 1.5);
        assert!(r.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(InferenceResult::empty("hands", 0.0)).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            ["detections", "landmarks", "metadata", "pipeline", "timestamp_s"]
        );
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let r: InferenceResult =
            serde_json::from_value(json!({"pipeline": "face", "timestamp_s": 2.0})).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_landmark_optional_fields_omitted() {
        let lm = Landmark {
            x: 0.5,
            y: 0.25,
            z: None,
            visibility: None,
        };
        assert_eq!(serde_json::to_value(lm).unwrap(), json!({"x": 0.5, "y": 0.25}));
    }

    #[rstest]
    #[case(BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0 }, (0, 0, 100, 50))]
    #[case(BoundingBox { x: 0.25, y: 0.5, width: 0.5, height: 0.5 }, (25, 25, 50, 25))]
    #[case(BoundingBox { x: 0.9, y: 0.9, width: 0.5, height: 0.5 }, (90, 45, 10, 5))]
    #[case(BoundingBox { x: -0.5, y: 0.0, width: 0.25, height: 0.1 }, (0, 0, 0, 5))]
    fn test_to_pixels_clamps(#[case] bbox: BoundingBox, #[case] expected: (u32, u32, u32, u32)) {
        assert_eq!(bbox.to_pixels(100, 50), expected);
    }
}
