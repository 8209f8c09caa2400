use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ValidatorError;

/// Depth-first listing of every file below `root`. Symlinked directories are
/// not followed so that link cycles cannot stall a walk. Directories that
/// cannot be read are logged and skipped.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

pub fn subdirectories(root: &Path) -> Result<Vec<PathBuf>, ValidatorError> {
    let entries = fs::read_dir(root)
        .map_err(|err| ValidatorError::Filesystem(format!("read {}: {err}", root.display())))?;
    let mut dirs = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Confirm `path` is a regular file that can be opened and read.
pub fn check_readable_file(path: &Path) -> Result<(), ValidatorError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidatorError::MissingFiles(vec![path.display().to_string()]));
        }
        Err(err) => {
            return Err(ValidatorError::UnreadableFile {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };
    if !metadata.is_file() {
        return Err(ValidatorError::UnreadableFile {
            path: path.display().to_string(),
            reason: "not a regular file".to_string(),
        });
    }
    let mut file = fs::File::open(path).map_err(|err| ValidatorError::UnreadableFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    if let Some(Err(err)) = file.by_ref().bytes().next() {
        return Err(ValidatorError::UnreadableFile {
            path: path.display().to_string(),
            reason: err.to_string(),
        });
    }
    Ok(())
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
