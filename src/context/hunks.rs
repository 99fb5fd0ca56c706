//! Hunk transforms used by the context strategies: trim, combine, inject, expand.

use crate::models::diff::{DiffLine, DiffLineType, Hunk};
use crate::scope::EnclosingScope;

use super::ContextError;

/// Narrow a hunk to the span between its first and last changed line.
///
/// The trimmed hunk's `new_start` is shifted by the number of leading
/// context lines dropped; the counts are left as they were. Returns `None`
/// for a hunk without changes.
pub fn trim_hunk(hunk: &Hunk) -> Option<Hunk> {
    let first = hunk.first_change_index()?;
    let last = hunk.last_change_index()?;
    Some(Hunk {
        new_start: hunk.new_start + first as u32,
        lines: hunk.lines[first..=last].to_vec(),
        ..hunk.clone()
    })
}

/// Line range in the updated file used to look up a hunk's scope.
pub fn query_range(hunk: &Hunk) -> Option<(usize, usize)> {
    let trimmed = trim_hunk(hunk)?;
    let start = trimmed.new_start as usize;
    Some((start, start + hunk.insertions()))
}

/// Merge hunks that share a scope into one contiguous hunk.
///
/// Hunks are ordered by `new_start`. Untouched lines of the updated file
/// between consecutive hunks are inserted as context, and their count
/// is added to `new_count`.
pub fn combine_hunks(updated_lines: &[&str], mut hunks: Vec<Hunk>) -> Result<Hunk, ContextError> {
    if hunks.is_empty() {
        return Err(ContextError::EmptyCombination);
    }
    hunks.sort_by_key(|h| h.new_start);

    let mut iter = hunks.into_iter();
    let Some(mut combined) = iter.next() else {
        return Err(ContextError::EmptyCombination);
    };
    let mut last_end = combined.new_start + combined.new_count;

    for hunk in iter {
        if hunk.new_start > last_end {
            let from = (last_end as usize).saturating_sub(1).min(updated_lines.len());
            let to = (hunk.new_start as usize).saturating_sub(1).min(updated_lines.len());
            combined
                .lines
                .extend(updated_lines[from..to].iter().map(|l| DiffLine::context(*l)));
            combined.new_count += hunk.new_start - last_end;
        }
        combined.old_count += hunk.old_count;
        combined.new_count += hunk.new_count;
        last_end = hunk.new_start + hunk.new_count;
        combined.lines.extend(hunk.lines);
    }

    Ok(combined)
}

/// Splice a (combined) hunk's changes into the full text of its scope.
///
/// The scope lines come from the updated file as-is; the changed span is
/// replaced by the hunk's prefixed diff lines. The first line is the
/// hunk's range header.
pub fn inject_into_scope(updated_lines: &[&str], scope: &EnclosingScope, hunk: &Hunk) -> String {
    let from = scope.start_line.saturating_sub(1).min(updated_lines.len());
    let to = scope.end_line.min(updated_lines.len());
    let mut context: Vec<String> = updated_lines[from..to].iter().map(|l| l.to_string()).collect();

    if let Some(trimmed) = trim_hunk(hunk) {
        let first_change = hunk.first_change_index().unwrap_or(0);
        let index = (hunk.new_start as usize + first_change)
            .saturating_sub(scope.start_line)
            .min(context.len());
        let drop = trimmed
            .lines
            .iter()
            .filter(|l| l.line_type != DiffLineType::Removed)
            .count()
            .min(context.len() - index);
        context.splice(index..index + drop, trimmed.lines.iter().map(DiffLine::render));
    }

    let mut out = Vec::with_capacity(context.len() + 1);
    out.push(hunk.range_header());
    out.extend(context);
    out.join("\n")
}

/// Render a hunk inside a window of the original file.
///
/// `context_lines` original lines are shown above `old_start` and below
/// the hunk's old extent. A hunk line identical to one already in the
/// window is printed once.
pub fn expand_hunk(old_lines: &[&str], hunk: &Hunk, context_lines: usize) -> String {
    let old_start = (hunk.old_start as usize).saturating_sub(1);
    let old_end = old_start + hunk.old_count as usize;
    let start = old_start.saturating_sub(context_lines);
    let end = old_lines.len().min(old_end + context_lines);

    let mut expansion: Vec<String> = Vec::new();
    expansion.extend(
        old_lines[start.min(old_lines.len())..old_start.min(old_lines.len())]
            .iter()
            .map(|l| l.to_string()),
    );
    expansion.push(hunk.range_header());
    for line in &hunk.lines {
        let rendered = line.render();
        if !expansion.contains(&rendered) {
            expansion.push(rendered);
        }
    }
    if old_end < end {
        expansion.extend(old_lines[old_end..end].iter().map(|l| l.to_string()));
    }
    expansion.join("\n")
}
