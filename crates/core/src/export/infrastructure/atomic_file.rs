use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Runs `write` against a sibling temp file, then renames it over `dest`.
///
/// A failed write removes the temp file and leaves any existing `dest`
/// untouched.
pub(crate) fn write_atomically<F>(dest: &Path, write: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&Path) -> Result<(), Box<dyn std::error::Error>>,
{
    let temp_path = temp_path_for(dest)?;

    if let Err(e) = write(&temp_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, dest) {
        let _ = fs::remove_file(&temp_path);
        return Err(Box::new(e));
    }
    Ok(())
}

fn temp_path_for(dest: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| format!("Not a file path: {}", dest.display()))?;
    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".part");
    Ok(dest.with_file_name(temp_name))
}
