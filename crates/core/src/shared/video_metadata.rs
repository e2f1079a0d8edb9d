use std::path::PathBuf;

/// Properties of an opened frame source.
///
/// Live cameras report `total_frames == 0`; `source_path` is `None` for them.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Source frame rate, or `fallback` when the container reports none.
    pub fn fps_or(&self, fallback: f64) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            fallback
        }
    }
}
