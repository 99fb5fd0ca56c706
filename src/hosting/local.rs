//! A [`HostingClient`] over a local directory.
//!
//! The working tree is the head of every branch. Base contents for review
//! are recovered by reverting the supplied diff. Commits write files in
//! place, and comments are logged and kept for inspection.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ignore::WalkBuilder;
use tracing::info;

use super::{HostingClient, HostingError, PullRequestEvent, Repository, inline_comment_body, normalize_path};
use crate::diff::revert_patch;
use crate::models::diff::FileDiff;
use crate::models::pr::{BranchDetails, CodeSuggestion, PrFile};

/// The ref that names the pre-change side of the supplied diff.
pub const BASE_REF: &str = "base";

/// A comment recorded instead of posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostedComment {
    Conversation { number: u64, body: String },
    Inline { file: String, line_start: u32, line_end: u32, body: String },
}

pub struct LocalWorkspace {
    root: PathBuf,
    repository: Repository,
    changes: Vec<FileDiff>,
    comments: Mutex<Vec<PostedComment>>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        Self {
            root,
            repository: Repository::new("local", name),
            changes: Vec::new(),
            comments: Mutex::new(Vec::new()),
        }
    }

    /// The changes under review. The working tree holds their head side.
    pub fn with_changes(mut self, changes: Vec<FileDiff>) -> Self {
        self.changes = changes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Comments recorded so far, oldest first.
    pub fn comments(&self) -> Vec<PostedComment> {
        self.comments.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, comment: PostedComment) {
        if let Ok(mut comments) = self.comments.lock() {
            comments.push(comment);
        }
    }

    /// Resolve a repository path under the root, refusing escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, HostingError> {
        let relative = Path::new(normalize_path(path));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(HostingError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read_head(&self, path: &str) -> Result<Option<String>, HostingError> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(HostingError::Io {
                path: full.display().to_string(),
                source,
            }),
        }
    }

    async fn read_base(&self, path: &str) -> Result<Option<String>, HostingError> {
        let path = normalize_path(path);
        let Some(change) = self.changes.iter().find(|c| c.path() == path) else {
            return self.read_head(path).await;
        };
        if change.is_new {
            return Ok(None);
        }
        let original = if change.is_rename { change.old_path.as_str() } else { path };
        let head = if change.is_deleted {
            String::new()
        } else {
            self.read_head(path).await?.unwrap_or_default()
        };
        match revert_patch(&head, &change.patch) {
            Ok(base) => Ok(Some(base)),
            Err(e) => Err(HostingError::Api(format!(
                "cannot reconstruct {original} at {BASE_REF}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl HostingClient for LocalWorkspace {
    async fn fetch_file(&self, path: &str, git_ref: &str) -> Result<Option<String>, HostingError> {
        if git_ref == BASE_REF {
            self.read_base(path).await
        } else {
            self.read_head(path).await
        }
    }

    async fn list_tree(&self, _git_ref: &str) -> Result<Vec<String>, HostingError> {
        let walker = WalkBuilder::new(&self.root).hidden(true).git_ignore(true).build();
        let mut paths = Vec::new();
        for entry in walker.flatten() {
            if entry.file_type().is_none_or(|ft| !ft.is_file()) {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                paths.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn list_pr_files(&self, _pr: &PullRequestEvent) -> Result<Vec<PrFile>, HostingError> {
        Ok(self
            .changes
            .iter()
            .filter(|c| !c.is_binary)
            .map(PrFile::from)
            .collect())
    }

    async fn create_branch(&self, name: &str) -> Result<BranchDetails, HostingError> {
        info!(branch = %name, root = %self.root.display(), "using working tree as branch");
        Ok(BranchDetails {
            name: name.to_string(),
            sha: uuid::Uuid::new_v4().simple().to_string(),
            url: format!("file://{}", self.root.display()),
        })
    }

    async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        contents: &str,
        message: &str,
    ) -> Result<(), HostingError> {
        let full = self.resolve(path)?;
        let io_error = |source| HostingError::Io {
            path: full.display().to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&full, contents).await.map_err(io_error)?;
        info!(branch = %branch, path = %path, message = %message, "committed file");
        Ok(())
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<(), HostingError> {
        info!(number, "comment:\n{body}");
        self.record(PostedComment::Conversation {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn post_inline_comment(
        &self,
        _pr: &PullRequestEvent,
        suggestion: &CodeSuggestion,
    ) -> Result<(), HostingError> {
        let body = inline_comment_body(suggestion);
        info!(
            file = %suggestion.file,
            line_start = suggestion.line_start,
            line_end = suggestion.line_end,
            "inline comment:\n{body}"
        );
        self.record(PostedComment::Inline {
            file: suggestion.file.clone(),
            line_start: suggestion.line_start,
            line_end: suggestion.line_end,
            body,
        });
        Ok(())
    }
}
