//! Diff engine: unified diff parsing, strict patch application, and re-diffing.

pub mod apply;
pub mod file;
pub mod parser;

use thiserror::Error;

pub use apply::{apply_patch, diff_contents, revert_patch};
pub use parser::{parse_patch, parse_unified_diff};

/// Errors from the diff engine.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("failed to read diff file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("diff parse error: {0}")]
    ParseError(String),

    #[error("hunk {hunk} does not apply at line {line}: expected {expected:?}, found {found:?}")]
    ApplyMismatch {
        hunk: usize,
        line: usize,
        expected: String,
        found: String,
    },

    #[error("hunk {hunk} starts at line {line}, before the end of the previous hunk")]
    OverlappingHunk { hunk: usize, line: usize },
}
