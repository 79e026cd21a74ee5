use std::fs;
use std::io::Write;
use std::path::Path;

use crate::Result;

pub fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref())?;
    Ok(())
}

/// Replace `path` with `bytes` in one step.
///
/// The data goes to a temporary file beside the target and is renamed over it
/// once fully written, so a failure part-way never leaves `path` truncated.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".audioconv-")
        .suffix(".part")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
