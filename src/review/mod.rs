//! Pull request review.
//!
//! The pipeline filters the changed files, attaches their base and head
//! contents, renders each one through the scope-aware context builder and
//! partitions the result into groups that fit the model's window. Review
//! strategies are tried in order until one succeeds for every group.
//! Structured findings can then be turned into inline fixes.

pub mod comment;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use strum::Display;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ReviewConfig;
use crate::context::PatchContextBuilder;
use crate::hosting::{self, HostingClient, HostingError, PullRequestEvent};
use crate::llm::{CompletionClient, CompletionRequest, LlmError, call_function};
use crate::models::pr::{CodeSuggestion, PrFile, Review, ReviewBody, ReviewSuggestion};
use crate::partition::{HeuristicCounter, PromptRenderer, TokenBudgetPartitioner};
use crate::prompts::{self, FixArgs, ReviewArgs};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error("all review strategies failed: {0}")]
    StrategiesExhausted(String),
}

/// How the model is asked for its review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReviewStrategy {
    /// Forced `review` call with an overall comment and findings.
    Structured,
    /// Plain text feedback.
    FreeText,
}

impl ReviewStrategy {
    pub const ORDER: [ReviewStrategy; 2] = [ReviewStrategy::Structured, ReviewStrategy::FreeText];
}

/// Whether a changed file is worth sending to the model.
pub fn should_review(file: &PrFile, config: &ReviewConfig) -> bool {
    let name = file.filename.rsplit('/').next().unwrap_or(&file.filename).to_lowercase();
    if config.ignored_files.iter().any(|f| f.to_lowercase() == name) {
        return false;
    }
    match file.extension() {
        None => false,
        Some(ext) => !config.ignored_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
    }
}

/// Renders files through the context builder, counting the system prompt
/// against every group.
pub struct ContextRenderer<'a> {
    builder: &'a PatchContextBuilder,
    preamble: String,
}

impl<'a> ContextRenderer<'a> {
    pub fn new(builder: &'a PatchContextBuilder) -> Self {
        let preamble = prompts::structured_review_messages("")
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>()
            .join("\n");
        Self { builder, preamble }
    }
}

impl PromptRenderer for ContextRenderer<'_> {
    fn render_file(&self, file: &PrFile) -> String {
        self.builder.build_context(file)
    }

    fn join_sections(&self, sections: &[&str]) -> String {
        let mut parts = Vec::with_capacity(sections.len() + 1);
        parts.push(self.preamble.as_str());
        parts.extend_from_slice(sections);
        parts.join("\n")
    }
}

pub struct ReviewPipeline {
    client: Arc<dyn CompletionClient>,
    hosting: Arc<dyn HostingClient>,
    builder: PatchContextBuilder,
    config: ReviewConfig,
    ceiling: usize,
}

impl ReviewPipeline {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        hosting: Arc<dyn HostingClient>,
        builder: PatchContextBuilder,
        config: ReviewConfig,
        ceiling: usize,
    ) -> Self {
        Self {
            client,
            hosting,
            builder,
            config,
            ceiling,
        }
    }

    /// Review the files of `pr`. An empty [`Review`] means there was nothing
    /// to review.
    pub async fn review(&self, pr: &PullRequestEvent) -> Result<Review, ReviewError> {
        let files: Vec<PrFile> = self
            .hosting
            .list_pr_files(pr)
            .await?
            .into_iter()
            .filter(|f| {
                let keep = should_review(f, &self.config);
                if !keep {
                    debug!(file = %f.filename, "ignoring file");
                }
                keep
            })
            .collect();
        if files.is_empty() {
            info!(pr = pr.number, "nothing to review");
            return Ok(Review::default());
        }

        let files = self.preprocess(pr, files).await;
        self.review_files(pr, files).await
    }

    /// Review files whose contents are already attached.
    pub async fn review_files(&self, pr: &PullRequestEvent, files: Vec<PrFile>) -> Result<Review, ReviewError> {
        let renderer = ContextRenderer::new(&self.builder);
        let partitioner = TokenBudgetPartitioner::new(self.ceiling, HeuristicCounter);
        let partition = partitioner.partition(files.clone(), &renderer);
        for file in &partition.dropped {
            warn!(file = %file.filename, "file exceeds the token ceiling, skipping");
        }
        if partition.groups.is_empty() {
            info!(pr = pr.number, "no file fits the token ceiling");
            return Ok(Review::default());
        }

        let diffs: Vec<String> = partition
            .groups
            .iter()
            .map(|group| {
                group
                    .files
                    .iter()
                    .map(|f| renderer.render_file(f))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        info!(groups = diffs.len(), files = files.len(), "reviewing");

        let body = self.run_strategies(pr, &diffs).await?;
        let suggestions = if self.config.include_suggestions && !body.structured.is_empty() {
            self.inline_fixes(&files, &body.structured).await
        } else {
            Vec::new()
        };
        Ok(Review {
            review: Some(body),
            suggestions,
        })
    }

    async fn run_strategies(&self, pr: &PullRequestEvent, diffs: &[String]) -> Result<ReviewBody, ReviewError> {
        let mut failures = Vec::new();
        for strategy in ReviewStrategy::ORDER {
            debug!(%strategy, "trying review strategy");
            match self.run_strategy(strategy, pr, diffs).await {
                Ok(body) => {
                    info!(%strategy, findings = body.structured.len(), "review complete");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(%strategy, error = %e, "review strategy failed, trying next");
                    failures.push(format!("{strategy}: {e}"));
                }
            }
        }
        error!(pr = pr.number, "every review strategy failed");
        Err(ReviewError::StrategiesExhausted(failures.join("; ")))
    }

    async fn run_strategy(
        &self,
        strategy: ReviewStrategy,
        pr: &PullRequestEvent,
        diffs: &[String],
    ) -> Result<ReviewBody, LlmError> {
        match strategy {
            ReviewStrategy::Structured => {
                let responses: Vec<ReviewArgs> = try_join_all(diffs.iter().map(|diff| {
                    call_function::<ReviewArgs>(
                        self.client.as_ref(),
                        prompts::structured_review_messages(diff),
                        prompts::review_function(),
                        0.0,
                    )
                }))
                .await?;
                Ok(structured_body(pr, responses))
            }
            ReviewStrategy::FreeText => {
                let responses = try_join_all(diffs.iter().map(|diff| self.free_text(diff))).await?;
                Ok(ReviewBody {
                    comment: responses.join("\n"),
                    structured: Vec::new(),
                })
            }
        }
    }

    async fn free_text(&self, diff: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(prompts::review_messages(diff));
        let choices = self.client.complete(request).await?;
        choices
            .iter()
            .find_map(|c| c.text())
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError("empty review response".to_string()))
    }

    /// One fix per finding whose file has head contents. Failures are
    /// skipped.
    async fn inline_fixes(&self, files: &[PrFile], findings: &[ReviewSuggestion]) -> Vec<CodeSuggestion> {
        let jobs = findings.iter().filter_map(|finding| {
            let contents = files
                .iter()
                .find(|f| f.filename == finding.filename)
                .and_then(|f| f.current_contents.as_deref());
            if contents.is_none() {
                debug!(file = %finding.filename, "no head contents for finding, skipping fix");
            }
            contents.map(|contents| self.inline_fix(contents, finding))
        });
        join_all(jobs).await.into_iter().flatten().collect()
    }

    async fn inline_fix(&self, contents: &str, finding: &ReviewSuggestion) -> Option<CodeSuggestion> {
        let fix: FixArgs = match call_function(
            self.client.as_ref(),
            prompts::inline_fix_messages(contents, finding),
            prompts::fix_function(),
            0.0,
        )
        .await
        {
            Ok(fix) => fix,
            Err(e) => {
                warn!(file = %finding.filename, error = %e, "inline fix failed, skipping");
                return None;
            }
        };
        let line = u32::try_from(fix.line_start.max(1)).unwrap_or(u32::MAX);
        Some(CodeSuggestion {
            file: finding.filename.clone(),
            line_start: line,
            line_end: line,
            correction: fix.code,
            comment: fix.comment,
        })
    }

    /// Attach base and head contents to each file concurrently.
    pub async fn preprocess(&self, pr: &PullRequestEvent, files: Vec<PrFile>) -> Vec<PrFile> {
        join_all(files.into_iter().map(|file| self.attach_contents(pr, file))).await
    }

    async fn attach_contents(&self, pr: &PullRequestEvent, mut file: PrFile) -> PrFile {
        let (old, current) = futures::join!(
            self.hosting.fetch_file(&file.filename, &pr.base_ref),
            self.hosting.fetch_file(&file.filename, &pr.head_ref),
        );
        match (old, current) {
            (Ok(old), Ok(current)) => {
                if old.is_none() {
                    debug!(file = %file.filename, "new file");
                }
                file.old_contents = old;
                file.current_contents = current;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(file = %file.filename, error = %e, "could not fetch file contents, using raw patch");
            }
        }
        file
    }
}

/// Overall comments first, then the deduplicated findings grouped by file.
fn structured_body(pr: &PullRequestEvent, responses: Vec<ReviewArgs>) -> ReviewBody {
    let mut seen = HashSet::new();
    let mut overall = Vec::new();
    let mut structured = Vec::new();
    for response in responses {
        if !response.review.trim().is_empty() {
            overall.push(response.review);
        }
        for suggestion in response.suggestions {
            if seen.insert(suggestion.identity()) {
                structured.push(suggestion);
            }
        }
    }

    let mut sections = overall;
    let rendered = comment::render_suggestions(&pr.repository, &structured);
    if !rendered.is_empty() {
        sections.push(rendered);
    }
    ReviewBody {
        comment: sections.join("\n\n"),
        structured,
    }
}

/// Post a review: the general comment on the conversation and each fix
/// inline. Inline failures are logged and skipped.
pub async fn apply_review(
    hosting: &dyn HostingClient,
    pr: &PullRequestEvent,
    review: &Review,
) -> Result<(), ReviewError> {
    if let Some(body) = review.review.as_ref().filter(|b| !b.comment.trim().is_empty()) {
        hosting.post_comment(pr.number, &body.comment).await?;
    }
    for suggestion in &review.suggestions {
        if let Err(e) = hosting.post_inline_comment(pr, suggestion).await {
            warn!(
                file = %suggestion.file,
                line = suggestion.line_start,
                body = %hosting::inline_comment_body(suggestion),
                error = %e,
                "failed to post inline comment"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_lockfiles_media_and_extensionless() {
        let config = ReviewConfig::default();
        assert!(!should_review(&PrFile::new("package-lock.json", ""), &config));
        assert!(!should_review(&PrFile::new("web/yarn.lock", ""), &config));
        assert!(!should_review(&PrFile::new("Makefile", ""), &config));
        assert!(!should_review(&PrFile::new("docs/logo.PNG", ""), &config));
        assert!(should_review(&PrFile::new("src/app.ts", ""), &config));
    }

    #[test]
    fn structured_body_dedupes_findings() {
        let pr = PullRequestEvent {
            repository: hosting::Repository::new("o", "r"),
            number: 1,
            title: "t".to_string(),
            base_ref: "main".to_string(),
            head_ref: "feature".to_string(),
        };
        let finding = ReviewSuggestion {
            describe: "d".to_string(),
            kind: "bug".to_string(),
            comment: "c".to_string(),
            code: "x".to_string(),
            filename: "a.ts".to_string(),
        };
        let body = structured_body(
            &pr,
            vec![
                ReviewArgs { review: "Looks fine.".to_string(), suggestions: vec![finding.clone()] },
                ReviewArgs { review: String::new(), suggestions: vec![finding] },
            ],
        );
        assert_eq!(body.structured.len(), 1);
        assert!(body.comment.starts_with("Looks fine.\n\n## a.ts\n"));
    }

    #[test]
    fn strategy_names() {
        assert_eq!(ReviewStrategy::Structured.to_string(), "structured");
        assert_eq!(ReviewStrategy::FreeText.to_string(), "free-text");
    }
}
