//! Strict patch application and re-diffing.
//!
//! `apply_patch` reconstructs the head contents of a file from its base
//! contents and patch. Every context and removed line must match the base
//! exactly; any mismatch is an error rather than a fuzzy apply.

use similar::{ChangeTag, TextDiff};

use super::DiffError;
use crate::models::diff::{DiffLine, DiffLineType, Hunk, PatchInfo};

/// Apply a parsed patch to `old`, returning the patched text.
pub fn apply_patch(old: &str, patch: &PatchInfo) -> Result<String, DiffError> {
    let old_lines: Vec<&str> = old.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(old_lines.len());
    let mut cursor = 0usize;

    for (index, hunk) in patch.hunks.iter().enumerate() {
        // A zero-length old side means "insert after line old_start".
        let start = if hunk.old_count == 0 {
            hunk.old_start as usize
        } else {
            (hunk.old_start as usize).saturating_sub(1)
        };
        if start < cursor || start > old_lines.len() {
            return Err(DiffError::OverlappingHunk {
                hunk: index + 1,
                line: hunk.old_start as usize,
            });
        }
        out.extend_from_slice(&old_lines[cursor..start]);
        cursor = start;

        for line in &hunk.lines {
            match line.line_type {
                DiffLineType::Added => out.push(&line.content),
                DiffLineType::Context | DiffLineType::Removed => {
                    let found = old_lines.get(cursor).copied();
                    if found != Some(line.content.as_str()) {
                        return Err(DiffError::ApplyMismatch {
                            hunk: index + 1,
                            line: cursor + 1,
                            expected: line.content.clone(),
                            found: found.unwrap_or_default().to_string(),
                        });
                    }
                    if line.line_type == DiffLineType::Context {
                        out.push(&line.content);
                    }
                    cursor += 1;
                }
            }
        }
    }
    out.extend_from_slice(&old_lines[cursor..]);

    let mut text = out.join("\n");
    let trailing_newline = old.ends_with('\n') || (old.is_empty() && !text.is_empty());
    if trailing_newline && !text.is_empty() {
        text.push('\n');
    }
    Ok(text)
}

/// Recover the base contents of a file from its head contents and patch.
pub fn revert_patch(new: &str, patch: &PatchInfo) -> Result<String, DiffError> {
    apply_patch(new, &patch.inverted())
}

/// Compute the hunks turning `old` into `new`, with `context` unchanged
/// lines around each change.
pub fn diff_contents(old: &str, new: &str, context: usize) -> PatchInfo {
    let diff = TextDiff::from_lines(old, new);
    let mut hunks = Vec::new();

    for group in diff.grouped_ops(context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let mut lines = Vec::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                let line_type = match change.tag() {
                    ChangeTag::Equal => DiffLineType::Context,
                    ChangeTag::Delete => DiffLineType::Removed,
                    ChangeTag::Insert => DiffLineType::Added,
                };
                let content = change.value();
                let content = content.strip_suffix('\n').unwrap_or(content);
                lines.push(DiffLine {
                    line_type,
                    content: content.to_string(),
                    old_line_no: change.old_index().map(|i| i as u32 + 1),
                    new_line_no: change.new_index().map(|i| i as u32 + 1),
                });
            }
        }

        hunks.push(Hunk {
            old_start: range_start(&old_range),
            old_count: old_range.len() as u32,
            new_start: range_start(&new_range),
            new_count: new_range.len() as u32,
            header: None,
            lines,
        });
    }

    PatchInfo { hunks }
}

/// Unified-diff start line: 1-based, or the preceding line for empty ranges.
fn range_start(range: &std::ops::Range<usize>) -> u32 {
    if range.is_empty() {
        range.start as u32
    } else {
        range.start as u32 + 1
    }
}
