use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single frame to a raster image file.
pub trait ImageWriter: Send + Sync {
    /// Writes `frame` at its native resolution. The image format follows the
    /// path's extension. An existing file is replaced only once the new one
    /// is complete.
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
