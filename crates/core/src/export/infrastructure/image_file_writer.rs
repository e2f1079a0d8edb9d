use std::path::Path;

use crate::export::domain::image_writer::ImageWriter;
use crate::export::infrastructure::atomic_file::write_atomically;
use crate::shared::frame::Frame;

/// Writes a single frame to an image file using the `image` crate.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let format = image::ImageFormat::from_path(path)?;

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;

        write_atomically(path, |temp_path| {
            img.save_with_format(temp_path, format)?;
            Ok(())
        })
    }
}
