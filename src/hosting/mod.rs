//! The hosting platform as seen by the agent and the review pipeline.
//!
//! [`HostingClient`] covers the calls both need: reading files at a ref,
//! listing PR files, branching, committing and commenting. Webhook
//! handling sits outside this crate and hands in [`IssueEvent`] and
//! [`PullRequestEvent`] values.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::pr::{BranchDetails, CodeSuggestion, PrFile};
use crate::prompts::number_lines;

pub use local::LocalWorkspace;

#[derive(Error, Debug)]
pub enum HostingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    #[error("hosting API error: {0}")]
    Api(String),
}

/// Owner and name of the repository an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    pub fn branch_url(&self, branch: &str) -> String {
        format!("{}/tree/{branch}", self.url())
    }
}

/// An opened issue that starts a coding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvent {
    pub repository: Repository,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl IssueEvent {
    /// The goal handed to the agent: title and body.
    pub fn goal(&self) -> String {
        if self.body.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.body)
        }
    }
}

/// An opened pull request that starts a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub repository: Repository,
    pub number: u64,
    pub title: String,
    pub base_ref: String,
    pub head_ref: String,
}

/// Calls made against the hosting platform.
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Contents of `path` at `git_ref`, `None` if the file does not exist.
    async fn fetch_file(&self, path: &str, git_ref: &str) -> Result<Option<String>, HostingError>;

    /// Every file path in the repository at `git_ref`.
    async fn list_tree(&self, git_ref: &str) -> Result<Vec<String>, HostingError>;

    /// The changed files of a pull request, patches attached.
    async fn list_pr_files(&self, pr: &PullRequestEvent) -> Result<Vec<PrFile>, HostingError>;

    /// Create `name` from the default branch.
    async fn create_branch(&self, name: &str) -> Result<BranchDetails, HostingError>;

    /// Commit the full new contents of `path` to `branch`.
    async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        contents: &str,
        message: &str,
    ) -> Result<(), HostingError>;

    /// Comment on an issue or pull request conversation.
    async fn post_comment(&self, number: u64, body: &str) -> Result<(), HostingError>;

    /// Review comment anchored to a line range of a pull request file.
    async fn post_inline_comment(
        &self,
        pr: &PullRequestEvent,
        suggestion: &CodeSuggestion,
    ) -> Result<(), HostingError>;
}

/// Repository paths are relative; a leading `/` from the model is dropped.
pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// `# <path>` followed by the numbered file.
pub fn numbered_file(path: &str, contents: &str) -> String {
    format!("# {path}\n{}", number_lines(contents))
}

/// Body of an inline review comment: the comment and a suggestion block.
pub fn inline_comment_body(suggestion: &CodeSuggestion) -> String {
    format!(
        "{}\n```suggestion\n{}\n```",
        suggestion.comment, suggestion.correction
    )
}

/// Working branch name for an issue.
///
/// Whitespace in the title becomes `-`, the title is cut to 15 characters,
/// a `-` and `suffix` are appended and the result is cut to 20.
pub fn branch_name(prefix: &str, title: &str, suffix: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .take(15)
        .collect();
    let sub_name: String = format!("{slug}-{suffix}").chars().take(20).collect();
    format!("{prefix}/{sub_name}")
}

/// Five lowercase alphanumerics for a branch name.
pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..5].to_string()
}

pub fn branch_created_comment(repository: &Repository, branch: &str) -> String {
    format!(
        "Branch created: [{branch}]({})",
        repository.branch_url(branch)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_stripped() {
        assert_eq!(normalize_path("/src/a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src/a.ts"), "src/a.ts");
    }

    #[test]
    fn numbered_file_has_header() {
        assert_eq!(numbered_file("a.ts", "x\ny"), "# a.ts\n1: x\n2: y");
    }

    #[test]
    fn branch_name_truncates_title_and_total() {
        assert_eq!(
            branch_name("Code-Bot", "Add dark mode toggle to settings", "ab12c"),
            "Code-Bot/Add-dark-mode-t-ab12"
        );
        assert_eq!(branch_name("Code-Bot", "Fix bug", "ab12c"), "Code-Bot/Fix-bug-ab12c");
    }

    #[test]
    fn random_suffix_is_five_chars() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn branch_comment_links_tree() {
        let repo = Repository::new("octo", "app");
        assert_eq!(
            branch_created_comment(&repo, "Code-Bot/x-1"),
            "Branch created: [Code-Bot/x-1](https://github.com/octo/app/tree/Code-Bot/x-1)"
        );
    }

    #[test]
    fn inline_body_wraps_correction() {
        let suggestion = CodeSuggestion {
            file: "a.ts".to_string(),
            line_start: 3,
            line_end: 3,
            correction: "return x ?? 0;".to_string(),
            comment: "Handle undefined".to_string(),
        };
        assert_eq!(
            inline_comment_body(&suggestion),
            "Handle undefined\n```suggestion\nreturn x ?? 0;\n```"
        );
    }

    #[test]
    fn goal_joins_title_and_body() {
        let mut issue = IssueEvent {
            repository: Repository::new("o", "r"),
            number: 1,
            title: "Add logout".to_string(),
            body: String::new(),
        };
        assert_eq!(issue.goal(), "Add logout");
        issue.body = "Put it in the header".to_string();
        assert_eq!(issue.goal(), "Add logout\nPut it in the header");
    }
}
