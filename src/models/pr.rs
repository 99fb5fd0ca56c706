//! Pull request types: changed files, processing groups, branches, and reviews.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::diff::FileDiff;

/// Change status of a file in a pull request, as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Renamed,
    Changed,
    #[default]
    Modified,
    Copied,
    Unchanged,
}

/// One changed file in a pull request.
///
/// Contents are attached and the token length annotated once during
/// preprocessing; afterwards the record is read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFile {
    pub filename: String,
    pub status: FileStatus,
    /// The per-file unified patch (hunks only, no `diff --git` header).
    #[serde(default)]
    pub patch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
    /// Full file text on the base ref. `None` for newly created files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_contents: Option<String>,
    /// Full file text on the head ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_contents: Option<String>,
    /// Token length of this file's rendered prompt section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_token_length: Option<usize>,
}

impl PrFile {
    pub fn new(filename: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            patch: patch.into(),
            ..Self::default()
        }
    }

    /// Lowercased extension of the filename, if it has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// A copy with every removed (`-`) line dropped from the patch.
    pub fn strip_removed_lines(&self) -> Self {
        let patch = self
            .patch
            .split('\n')
            .filter(|line| !line.starts_with('-'))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            patch,
            patch_token_length: None,
            ..self.clone()
        }
    }
}

impl From<&FileDiff> for PrFile {
    fn from(diff: &FileDiff) -> Self {
        let status = if diff.is_new {
            FileStatus::Added
        } else if diff.is_deleted {
            FileStatus::Removed
        } else if diff.is_rename {
            FileStatus::Renamed
        } else {
            FileStatus::Modified
        };
        Self {
            filename: diff.path().to_string(),
            status,
            patch: diff.patch.render(),
            previous_filename: diff.is_rename.then(|| diff.old_path.clone()),
            ..Self::default()
        }
    }
}

/// Files that are reviewed together in a single LLM request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessGroup {
    pub files: Vec<PrFile>,
}

impl ProcessGroup {
    pub fn new(files: Vec<PrFile>) -> Self {
        Self { files }
    }

    /// Sum of the annotated per-file token lengths.
    pub fn token_length(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.patch_token_length.unwrap_or(0))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A branch on the hosting platform. Created once per agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDetails {
    pub name: String,
    pub sha: String,
    pub url: String,
}

/// A structured suggestion from the review model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewSuggestion {
    /// Short description of the suggestion, used as an issue title.
    pub describe: String,
    /// Category such as "bug", "performance" or "readability".
    #[serde(rename = "type")]
    pub kind: String,
    /// What should change and why.
    pub comment: String,
    /// The code the suggestion refers to.
    pub code: String,
    /// The file the suggestion applies to.
    pub filename: String,
}

impl ReviewSuggestion {
    /// Stable identity used to collapse duplicate suggestions.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.filename, self.comment)
    }
}

/// An inline fix anchored to a line range of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub correction: String,
    pub comment: String,
}

/// The general review comment plus any structured suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewBody {
    pub comment: String,
    pub structured: Vec<ReviewSuggestion>,
}

/// What a PR review produces for the hosting layer to post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// `None` when there was nothing to review.
    pub review: Option<ReviewBody>,
    pub suggestions: Vec<CodeSuggestion>,
}
