//! Unified diff format parser.
//!
//! Parses the output of `git diff` into `Vec<FileDiff>`, and bare per-file
//! patches (the hunks-only form a hosting API returns) into `PatchInfo`.

use std::iter::Peekable;
use std::str::Lines;

use crate::models::diff::{DiffLine, DiffLineType, FileDiff, Hunk, PatchInfo};

/// Marker opening each file section of a `git diff`.
const SECTION_MARKER: &str = "diff --git ";

/// Split a `git diff` into one [`FileDiff`] per `diff --git` section.
///
/// Text ahead of the first section marker is ignored.
pub fn parse_unified_diff(input: &str) -> Vec<FileDiff> {
    let mut sections = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(header) = line.strip_prefix(SECTION_MARKER) {
            sections.push(parse_section(header, &mut lines));
        }
    }
    sections
}

/// One file section, from just after its `diff --git` line up to the next.
fn parse_section(header: &str, lines: &mut Peekable<Lines<'_>>) -> FileDiff {
    let (old_path, new_path) = split_section_paths(header);
    let mut section = FileDiff {
        old_path,
        new_path,
        is_new: false,
        is_deleted: false,
        is_rename: false,
        is_binary: false,
        patch: PatchInfo::default(),
    };

    while let Some(&next) = lines.peek() {
        if next.starts_with(SECTION_MARKER) {
            break;
        }
        if next.starts_with("@@") {
            match parse_hunk(lines) {
                Some(hunk) => section.patch.hunks.push(hunk),
                None => {
                    tracing::debug!(header = next, "skipping malformed hunk header");
                    lines.next();
                }
            }
            continue;
        }
        mark_extended_header(&mut section, next);
        lines.next();
    }
    section
}

/// Record what a git extended header line says about the file. Lines that
/// carry nothing of interest (`index`, `---`, `+++`, similarity) are no-ops.
fn mark_extended_header(section: &mut FileDiff, line: &str) {
    if line.starts_with("new file mode") {
        section.is_new = true;
    } else if line.starts_with("deleted file mode") {
        section.is_deleted = true;
    } else if line.starts_with("rename from") || line.starts_with("rename to") {
        section.is_rename = true;
    } else if line.starts_with("Binary files") || line.starts_with("GIT binary patch") {
        section.is_binary = true;
    }
}

/// Parse a single file's patch into its hunks.
///
/// Accepts either a bare hunk list or one carrying `---`/`+++` headers.
/// Text before the first `@@` line is ignored.
pub fn parse_patch(patch: &str) -> PatchInfo {
    let mut hunks = Vec::new();
    let mut lines = patch.lines().peekable();

    while let Some(&next) = lines.peek() {
        if next.starts_with("@@") {
            match parse_hunk(&mut lines) {
                Some(hunk) => hunks.push(hunk),
                None => {
                    tracing::debug!(header = next, "skipping malformed hunk header");
                    lines.next();
                }
            }
        } else {
            lines.next();
        }
    }

    PatchInfo { hunks }
}

/// Old and new path from the remainder of a `diff --git` line.
///
/// Paths may contain spaces, so the split is made at the space that is
/// followed by a git side prefix such as `b/`.
fn split_section_paths(rest: &str) -> (String, String) {
    let split = (1..rest.len()).find(|&i| rest.as_bytes()[i] == b' ' && has_side_prefix(&rest[i + 1..]));
    let (old, new) = match split {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => rest.split_once(' ').unwrap_or((rest, "")),
    };
    (strip_side_prefix(old).to_string(), strip_side_prefix(new).to_string())
}

/// Prefixes git uses for the two sides of a comparison.
const SIDE_PREFIXES: [char; 6] = ['a', 'b', 'c', 'w', 'i', 'o'];

fn has_side_prefix(path: &str) -> bool {
    let mut chars = path.chars();
    matches!((chars.next(), chars.next()), (Some(side), Some('/')) if SIDE_PREFIXES.contains(&side))
}

fn strip_side_prefix(path: &str) -> &str {
    if has_side_prefix(path) { &path[2..] } else { path }
}

/// Consume one hunk, starting at its `@@` line.
///
/// Lines are taken until both sides' counts are used up, or until the next
/// hunk or section starts.
fn parse_hunk(lines: &mut Peekable<Lines<'_>>) -> Option<Hunk> {
    let mut hunk = hunk_from_header(lines.peek()?)?;
    lines.next();

    let mut old_line = hunk.old_start;
    let mut new_line = hunk.new_start;
    let (mut old_left, mut new_left) = (hunk.old_count, hunk.new_count);

    while let Some(&next) = lines.peek() {
        // "\ No newline at end of file"
        if next.starts_with('\\') {
            lines.next();
            continue;
        }
        if next.starts_with(SECTION_MARKER) || next.starts_with("@@") || (old_left == 0 && new_left == 0) {
            break;
        }
        let Some((line_type, content)) = classify_body_line(next) else {
            break;
        };
        lines.next();

        let mut line = DiffLine {
            line_type,
            content: content.to_string(),
            old_line_no: None,
            new_line_no: None,
        };
        if line_type != DiffLineType::Added {
            line.old_line_no = Some(old_line);
            old_line += 1;
            old_left = old_left.saturating_sub(1);
        }
        if line_type != DiffLineType::Removed {
            line.new_line_no = Some(new_line);
            new_line += 1;
            new_left = new_left.saturating_sub(1);
        }
        hunk.lines.push(line);
    }

    Some(hunk)
}

/// Kind and text of a hunk body line. An empty line is blank context.
fn classify_body_line(line: &str) -> Option<(DiffLineType, &str)> {
    match line.chars().next() {
        None => Some((DiffLineType::Context, "")),
        Some('+') => Some((DiffLineType::Added, &line[1..])),
        Some('-') => Some((DiffLineType::Removed, &line[1..])),
        Some(' ') => Some((DiffLineType::Context, &line[1..])),
        Some(_) => None,
    }
}

/// An empty hunk from its `@@ -a,b +c,d @@ section` line.
fn hunk_from_header(line: &str) -> Option<Hunk> {
    let body = line.strip_prefix("@@ ")?;
    let (ranges, trailer) = body.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (old_start, old_count) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(new.strip_prefix('+')?)?;
    let trailer = trailer.trim();

    Some(Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        header: (!trailer.is_empty()).then(|| trailer.to_string()),
        lines: Vec::new(),
    })
}

/// `start,count`, or a bare `start` with an implied count of one.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}
