use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::ConvertError;

/// Canonical form of a root directory, or the path as given if it cannot be resolved.
pub fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

/// Recursively collect files under `root` whose names end with one of `extensions`.
///
/// Matching is a case-sensitive suffix test on the file name. Entries that
/// cannot be read (permission errors, dangling links) are skipped so one bad
/// directory does not hide the rest of the tree. Siblings are visited in file
/// name order.
pub fn discover(root: &Path, extensions: &BTreeSet<String>) -> Vec<PathBuf> {
    let root = canonical_root(root);
    debug!("Scanning directory structure: {}", root.display());

    WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                let skipped = ConvertError::Discovery {
                    path: err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                    reason: err.to_string(),
                };
                debug!("Skipping: {}", skipped);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            extensions.iter().any(|ext| name.ends_with(ext.as_str()))
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}
