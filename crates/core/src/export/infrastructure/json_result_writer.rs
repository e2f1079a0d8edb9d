use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::export::domain::result_writer::ResultWriter;
use crate::export::infrastructure::atomic_file::write_atomically;
use crate::shared::inference_result::InferenceResult;

/// Writes results as pretty-printed JSON, one top-level object per file.
pub struct JsonResultWriter;

impl JsonResultWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonResultWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultWriter for JsonResultWriter {
    fn write(
        &self,
        path: &Path,
        result: &InferenceResult,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_atomically(path, |temp_path| {
            let file = fs::File::create(temp_path)?;
            let mut out = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut out, result)?;
            out.write_all(b"\n")?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(())
        })
    }

    fn read(&self, path: &Path) -> Result<InferenceResult, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
