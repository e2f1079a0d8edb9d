use serde_json::Value;

use crate::pipeline::domain::pipeline::{Pipeline, PipelineError};
use crate::pipeline::infrastructure::overlay;
use crate::shared::frame::Frame;
use crate::shared::inference_result::{BoundingBox, Detection, InferenceResult};
use crate::shared::pipeline_settings::PipelineSettings;

pub const MOTION_PIPELINE_ID: &str = "motion";

const DEFAULT_THRESHOLD: u64 = 25;
const DEFAULT_MIN_AREA: f64 = 0.001;

/// Frame-differencing motion detector.
///
/// Compares the luma of each frame against the previous one. Pixels whose
/// luma changed by more than `threshold` count as changed; when the changed
/// fraction reaches `min_area`, one `motion` detection covering all changed
/// pixels is emitted and drawn onto the annotated frame.
pub struct MotionPipeline {
    threshold: u8,
    min_area: f64,
    previous: Option<(u32, u32, Vec<u8>)>,
}

impl MotionPipeline {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD as u8,
            min_area: DEFAULT_MIN_AREA,
            previous: None,
        }
    }
}

impl Default for MotionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for MotionPipeline {
    fn id(&self) -> &str {
        MOTION_PIPELINE_ID
    }

    fn label(&self) -> &str {
        "Motion detection"
    }

    fn default_settings(&self) -> PipelineSettings {
        PipelineSettings::new()
            .with("threshold", DEFAULT_THRESHOLD)
            .with("min_area", DEFAULT_MIN_AREA)
    }

    fn init(&mut self, settings: &PipelineSettings) -> Result<(), PipelineError> {
        let invalid = |key: &str, reason: &str| PipelineError::Initialization {
            pipeline: MOTION_PIPELINE_ID.to_string(),
            reason: format!("setting '{key}' {reason}"),
        };

        let threshold = match settings.get("threshold") {
            None => DEFAULT_THRESHOLD,
            Some(_) => settings
                .get_u64("threshold")
                .filter(|t| *t <= u8::MAX as u64)
                .ok_or_else(|| invalid("threshold", "must be an integer in 0..=255"))?,
        };
        let min_area = match settings.get("min_area") {
            None => DEFAULT_MIN_AREA,
            Some(_) => settings
                .get_f64("min_area")
                .filter(|a| (0.0..=1.0).contains(a))
                .ok_or_else(|| invalid("min_area", "must be a fraction in 0.0..=1.0"))?,
        };

        self.threshold = threshold as u8;
        self.min_area = min_area;
        self.previous = None;
        Ok(())
    }

    fn process(
        &mut self,
        frame: &Frame,
        timestamp_s: f64,
    ) -> Result<(Frame, InferenceResult), PipelineError> {
        if frame.channels() < 3 {
            return Err(PipelineError::Processing(format!(
                "motion expects RGB frames, got {} channel(s)",
                frame.channels()
            )));
        }
        let (width, height) = frame.dimensions();
        let luma = to_luma(frame);
        let mut result = InferenceResult::empty(MOTION_PIPELINE_ID, timestamp_s);

        let changed = match &self.previous {
            Some((pw, ph, prev)) if (*pw, *ph) == (width, height) => {
                diff_region(prev, &luma, width as usize, self.threshold)
            }
            _ => None,
        };
        self.previous = Some((width, height, luma));

        let total = (width as usize * height as usize).max(1);
        let (count, bounds) = changed.unwrap_or((0, None));
        let fraction = count as f64 / total as f64;
        let has_motion = count > 0 && fraction >= self.min_area;

        result
            .metadata
            .insert("changed_fraction".to_string(), Value::from(fraction));
        result
            .metadata
            .insert("has_motion".to_string(), Value::from(has_motion));

        let mut annotated = frame.clone();
        if let (true, Some((x0, y0, x1, y1))) = (has_motion, bounds) {
            let bw = (x1 - x0 + 1) as f64;
            let bh = (y1 - y0 + 1) as f64;
            result.detections.push(Detection {
                bbox: BoundingBox {
                    x: x0 as f64 / width as f64,
                    y: y0 as f64 / height as f64,
                    width: bw / width as f64,
                    height: bh / height as f64,
                },
                confidence: (count as f64 / (bw * bh)).min(1.0),
                label: MOTION_PIPELINE_ID.to_string(),
            });
            overlay::draw_result(&mut annotated, &result);
        }

        Ok((annotated, result))
    }

    fn close(&mut self) {
        self.previous = None;
    }
}

/// Integer BT.601 luma.
fn to_luma(frame: &Frame) -> Vec<u8> {
    let channels = frame.channels() as usize;
    frame
        .data()
        .chunks_exact(channels)
        .map(|px| ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8) as u8)
        .collect()
}

type Bounds = (usize, usize, usize, usize);

/// Counts pixels whose luma moved by more than `threshold` and returns the
/// inclusive bounds `(x0, y0, x1, y1)` of those pixels.
fn diff_region(
    previous: &[u8],
    current: &[u8],
    width: usize,
    threshold: u8,
) -> Option<(usize, Option<Bounds>)> {
    if width == 0 {
        return None;
    }
    let mut count = 0usize;
    let mut bounds: Option<Bounds> = None;
    for (i, (a, b)) in previous.iter().zip(current).enumerate() {
        if a.abs_diff(*b) <= threshold {
            continue;
        }
        count += 1;
        let (x, y) = (i % width, i / width);
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    Some((count, bounds))
}
