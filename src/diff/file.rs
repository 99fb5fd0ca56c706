//! Load the changes under review from a diff on disk.

use std::path::Path;

use super::{DiffError, parse_unified_diff};
use crate::models::diff::FileDiff;

/// Read and parse a multi-file unified diff. A diff without any
/// `diff --git` section is rejected.
pub async fn read_changes(path: &Path) -> Result<Vec<FileDiff>, DiffError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DiffError::PathNotFound(path.display().to_string()));
        }
        Err(e) => return Err(DiffError::FileReadError(e)),
    };
    let changes = parse_unified_diff(&text);
    if changes.is_empty() {
        return Err(DiffError::ParseError(format!(
            "no file changes in {}",
            path.display()
        )));
    }
    Ok(changes)
}
