//! Diff-related types: file diffs, hunks, and diff lines.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// The type of a line in a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffLineType {
    /// Line exists only in the new version (added).
    Added,
    /// Line exists only in the old version (removed).
    Removed,
    /// Line is unchanged (context).
    Context,
}

impl DiffLineType {
    /// The unified-diff prefix character for this line type.
    pub fn prefix(self) -> char {
        match self {
            DiffLineType::Added => '+',
            DiffLineType::Removed => '-',
            DiffLineType::Context => ' ',
        }
    }

    /// Whether the line is an addition or a removal.
    pub fn is_change(self) -> bool {
        !matches!(self, DiffLineType::Context)
    }
}

/// A single line in a diff hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// The type of change.
    pub line_type: DiffLineType,
    /// The content of the line (without the leading +/-/space).
    pub content: String,
    /// Line number in the old file (None for added lines).
    pub old_line_no: Option<u32>,
    /// Line number in the new file (None for removed lines).
    pub new_line_no: Option<u32>,
}

impl DiffLine {
    /// A context line with no line-number bookkeeping.
    pub fn context(content: impl Into<String>) -> Self {
        Self {
            line_type: DiffLineType::Context,
            content: content.into(),
            old_line_no: None,
            new_line_no: None,
        }
    }

    /// The line as it appears in a unified diff (`+foo`, `-bar`, ` baz`).
    pub fn render(&self) -> String {
        format!("{}{}", self.line_type.prefix(), self.content)
    }
}

/// A contiguous hunk within a file diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Starting line in the old file.
    pub old_start: u32,
    /// Number of lines in the old file.
    pub old_count: u32,
    /// Starting line in the new file.
    pub new_start: u32,
    /// Number of lines in the new file.
    pub new_count: u32,
    /// Optional hunk header text (e.g., function name).
    pub header: Option<String>,
    /// The lines in this hunk.
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Index of the first added or removed line.
    pub fn first_change_index(&self) -> Option<usize> {
        self.lines.iter().position(|l| l.line_type.is_change())
    }

    /// Index of the last added or removed line.
    pub fn last_change_index(&self) -> Option<usize> {
        self.lines.iter().rposition(|l| l.line_type.is_change())
    }

    /// Number of added lines.
    pub fn insertions(&self) -> usize {
        self.count(DiffLineType::Added)
    }

    /// Number of removed lines.
    pub fn deletions(&self) -> usize {
        self.count(DiffLineType::Removed)
    }

    /// Number of lines that survive into the new file (added + context).
    pub fn surviving_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.line_type != DiffLineType::Removed)
            .count()
    }

    fn count(&self, line_type: DiffLineType) -> usize {
        self.lines.iter().filter(|l| l.line_type == line_type).count()
    }

    /// The `@@ -old,len +new,len @@` header line (without the trailing text).
    pub fn range_header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }

    /// The hunk that undoes this one: sides swapped, additions and
    /// removals exchanged.
    pub fn inverted(&self) -> Hunk {
        let lines = self
            .lines
            .iter()
            .map(|l| DiffLine {
                line_type: match l.line_type {
                    DiffLineType::Added => DiffLineType::Removed,
                    DiffLineType::Removed => DiffLineType::Added,
                    DiffLineType::Context => DiffLineType::Context,
                },
                content: l.content.clone(),
                old_line_no: l.new_line_no,
                new_line_no: l.old_line_no,
            })
            .collect();
        Hunk {
            old_start: self.new_start,
            old_count: self.new_count,
            new_start: self.old_start,
            new_count: self.old_count,
            header: self.header.clone(),
            lines,
        }
    }

    /// Render the hunk back to unified-diff text, header included.
    pub fn render(&self) -> String {
        let mut out = self.range_header();
        if let Some(ref header) = self.header {
            out.push(' ');
            out.push_str(header);
        }
        out.push('\n');
        for line in &self.lines {
            let _ = writeln!(out, "{}", line.render());
        }
        out
    }
}

/// The ordered hunks of one file's unified diff.
///
/// Parsed once per file and not mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInfo {
    pub hunks: Vec<Hunk>,
}

impl PatchInfo {
    /// Render all hunks back to a per-file patch (no `diff --git` header).
    pub fn render(&self) -> String {
        self.hunks.iter().map(Hunk::render).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn inverted(&self) -> PatchInfo {
        PatchInfo {
            hunks: self.hunks.iter().map(Hunk::inverted).collect(),
        }
    }
}

/// A diff for a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path of the old file (may be `/dev/null` for new files).
    pub old_path: String,
    /// Path of the new file (may be `/dev/null` for deleted files).
    pub new_path: String,
    /// Whether this is a new file.
    pub is_new: bool,
    /// Whether this file was deleted.
    pub is_deleted: bool,
    /// Whether this is a rename.
    pub is_rename: bool,
    /// Whether this is a binary file.
    pub is_binary: bool,
    /// The hunks in this diff.
    pub patch: PatchInfo,
}

impl FileDiff {
    /// Returns the most relevant file path (new_path for non-deletes, old_path for deletes).
    pub fn path(&self) -> &str {
        if self.is_deleted {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    /// Returns the total number of added lines across all hunks.
    pub fn added_lines(&self) -> usize {
        self.patch.hunks.iter().map(Hunk::insertions).sum()
    }

    /// Returns the total number of removed lines across all hunks.
    pub fn removed_lines(&self) -> usize {
        self.patch.hunks.iter().map(Hunk::deletions).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(line_type: DiffLineType, content: &str) -> DiffLine {
        DiffLine {
            line_type,
            content: content.to_string(),
            old_line_no: None,
            new_line_no: None,
        }
    }

    fn sample() -> Hunk {
        Hunk {
            old_start: 3,
            old_count: 4,
            new_start: 3,
            new_count: 5,
            header: None,
            lines: vec![
                line(DiffLineType::Context, "a"),
                line(DiffLineType::Removed, "b"),
                line(DiffLineType::Added, "c"),
                line(DiffLineType::Added, "d"),
                line(DiffLineType::Context, "e"),
                line(DiffLineType::Context, "f"),
            ],
        }
    }

    #[test]
    fn change_indices() {
        let hunk = sample();
        assert_eq!(hunk.first_change_index(), Some(1));
        assert_eq!(hunk.last_change_index(), Some(3));
    }

    #[test]
    fn counts_match_new_side() {
        let hunk = sample();
        assert_eq!(hunk.insertions(), 2);
        assert_eq!(hunk.deletions(), 1);
        assert_eq!(hunk.surviving_lines() as u32, hunk.new_count);
    }

    #[test]
    fn render_includes_prefixes() {
        let text = sample().render();
        assert!(text.starts_with("@@ -3,4 +3,5 @@\n"));
        assert!(text.contains("\n-b\n+c\n+d\n"));
    }

    #[test]
    fn context_only_hunk_has_no_changes() {
        let hunk = Hunk {
            lines: vec![line(DiffLineType::Context, "x")],
            ..sample()
        };
        assert_eq!(hunk.first_change_index(), None);
    }
}
