//! Input validation: make sure the document is a readable PDF before any
//! stage (or any paid external call) runs.
//!
//! Checking the `%PDF` magic bytes up front gives callers a precise input
//! error instead of an opaque pdfium failure halfway through the run.

use crate::error::MovieError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: impl AsRef<Path>) -> Result<PathBuf, MovieError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(MovieError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MovieError::PermissionDenied { path });
        }
        Err(_) => return Err(MovieError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(MovieError::NotAPdf { path, magic });
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(path)
}
