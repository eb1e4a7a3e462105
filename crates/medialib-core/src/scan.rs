use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

/// List the regular files at the top level of the source directory, sorted
/// by path. Hidden files and subdirectories are left out.
pub fn scan_source_directory(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        // follows symlinks, like the moves later on
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    tracing::info!(count = files.len(), dir = %dir.display(), "scanned source directory");
    Ok(files)
}
