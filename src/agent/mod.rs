//! The issue-driven coding agent.
//!
//! A run plans once, then steps until the model calls `done`, a step
//! fails twice, or the step limit is reached:
//!
//! ```text
//! Planning -> Stepping -> (Stepping | Done | Aborted)
//! ```
//!
//! Each step is computed against an immutable [`RunContext`] and only
//! committed when it succeeds, so a retried step sees the same state as
//! the failed attempt. File edits already committed to the branch are not
//! rolled back when a run aborts.

pub mod planner;
pub mod retry;
pub mod step;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use serde::Serialize;
use strum::Display;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::diff::diff_contents;
use crate::editor::{EditError, EditExecutor};
use crate::hosting::{self, HostingClient, HostingError, IssueEvent};
use crate::llm::{CompletionClient, CompletionRequest, LlmError};
use crate::models::action::{Action, ActionMap, ActionRecord, EditArgs, EditMode};
use crate::models::diff::PatchInfo;
use crate::models::pr::BranchDetails;
use crate::models::{ChatMessage, Conversation};
use crate::prompts;
use crate::scope::ScopeRegistry;
use crate::vote::{ActionVoter, Judge, VoteError, VoteTopic};

use planner::Planner;
use retry::with_retry;

/// Why a step failed.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("vote failed: {0}")]
    Vote(#[from] VoteError),

    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("no usable candidate in the model's response")]
    NoCandidates,

    #[error("repeating action: {0}")]
    Repetition(String),
}

impl StepError {
    /// Repetition is a deliberate stop; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StepError::Repetition(_))
    }
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
pub enum RunState {
    Planning,
    Stepping,
    Done,
    #[strum(to_string = "Aborted: {reason}")]
    Aborted { reason: String },
}

/// A committed file change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedEdit {
    pub filepath: String,
    pub mode: EditMode,
    pub line_start: i64,
    /// Base-to-result diff of the file, repairs included.
    pub patch: PatchInfo,
}

/// Everything one run owns.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub goal: String,
    pub plan: Vec<String>,
    pub branch: BranchDetails,
    pub conversation: Conversation,
    pub history: Vec<ActionRecord>,
    pub action_map: ActionMap,
    pub edits: Vec<AppliedEdit>,
}

impl RunContext {
    pub fn new(goal: &str, plan: Vec<String>, tree: &str, branch: BranchDetails) -> Self {
        let conversation = Conversation::new(prompts::code_agent_messages(goal, tree, &plan));
        Self {
            goal: goal.to_string(),
            plan,
            branch,
            conversation,
            history: Vec::new(),
            action_map: ActionMap::default(),
            edits: Vec::new(),
        }
    }

    /// Rendered actions so far, one per line.
    pub fn summary(&self) -> String {
        if self.history.is_empty() {
            return "No actions taken yet.".to_string();
        }
        self.history
            .iter()
            .map(|record| record.action.render())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fold a successful step into the run.
    pub fn commit(&mut self, outcome: StepOutcome) {
        if let Some(path) = outcome.action.filepath() {
            self.action_map
                .record(outcome.action.kind(), hosting::normalize_path(path));
        }
        self.conversation
            .push(ChatMessage::assistant(outcome.action.render()));
        self.conversation.push(ChatMessage::user(step::result_message(
            &outcome.result,
            outcome.action.next_step(),
        )));
        self.edits.extend(outcome.edit);
        self.history.push(ActionRecord::new(outcome.action));
    }
}

/// What a successful step produced, not yet committed.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub action: Action,
    pub result: String,
    pub edit: Option<AppliedEdit>,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self.action, Action::Done(_))
    }
}

/// The final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    pub state: RunState,
    pub branch: Option<BranchDetails>,
    pub steps: usize,
    pub actions: Vec<ActionRecord>,
    pub edits: Vec<AppliedEdit>,
}

/// Drives one issue from plan to done.
pub struct AgentRunner {
    client: Arc<dyn CompletionClient>,
    hosting: Arc<dyn HostingClient>,
    voter: ActionVoter,
    editor: EditExecutor,
    config: AgentConfig,
}

impl AgentRunner {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        hosting: Arc<dyn HostingClient>,
        judge: Arc<dyn Judge>,
        registry: ScopeRegistry,
        config: AgentConfig,
    ) -> Self {
        let editor = EditExecutor::new(client.clone(), registry).with_repair_attempts(config.repair_attempts);
        Self {
            client,
            hosting,
            voter: ActionVoter::new(judge),
            editor,
            config,
        }
    }

    /// Run the agent for an opened issue. Never fails: the outcome is in
    /// the returned state, and a status comment is posted on the issue.
    pub async fn run(&self, issue: &IssueEvent) -> AgentRunResult {
        let goal = issue.goal();
        let mut result = AgentRunResult {
            state: RunState::Planning,
            branch: None,
            steps: 0,
            actions: Vec::new(),
            edits: Vec::new(),
        };

        let ctx = match self.prepare(issue, &goal).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "run could not start");
                result.state = RunState::Aborted { reason: e.to_string() };
                self.post_status(issue, &result).await;
                return result;
            }
        };
        result.branch = Some(ctx.branch.clone());
        result.state = RunState::Stepping;

        let ctx = self.step_loop(ctx, &mut result).await;
        result.actions = ctx.history;
        result.edits = ctx.edits;
        self.post_status(issue, &result).await;
        result
    }

    /// Branch, plan and seed the conversation.
    async fn prepare(&self, issue: &IssueEvent, goal: &str) -> Result<RunContext, StepError> {
        let name = hosting::branch_name(&self.config.branch_prefix, &issue.title, &hosting::random_suffix());
        let branch = self.hosting.create_branch(&name).await?;
        self.hosting
            .post_comment(issue.number, &hosting::branch_created_comment(&issue.repository, &branch.name))
            .await?;
        info!(branch = %branch.name, "branch created");

        let planner = Planner::new(
            self.client.clone(),
            self.voter.clone(),
            self.config.candidates,
            self.config.temperature,
        );
        let plan = with_retry(self.config.step_retries, StepError::is_retryable, || planner.plan(goal)).await?;

        let tree = self.hosting.list_tree(&branch.name).await?.join("\n");
        Ok(RunContext::new(goal, plan, &tree, branch))
    }

    async fn step_loop(&self, mut ctx: RunContext, result: &mut AgentRunResult) -> RunContext {
        let delay = Duration::from_secs(self.config.step_delay_secs);

        for index in 0..self.config.step_limit {
            info!(step = index + 1, limit = self.config.step_limit, "step started");
            let outcome = with_retry(self.config.step_retries, StepError::is_retryable, || self.step(&ctx)).await;
            match outcome {
                Ok(outcome) => {
                    let done = outcome.is_done();
                    info!(step = index + 1, action = %outcome.action.kind(), "step finished");
                    ctx.commit(outcome);
                    result.steps += 1;
                    if done {
                        result.state = RunState::Done;
                        return ctx;
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    error!(step = index + 1, error = %e, "step failed, aborting run");
                    result.state = RunState::Aborted { reason: e.to_string() };
                    return ctx;
                }
            }
        }

        warn!(limit = self.config.step_limit, "step limit reached");
        result.state = RunState::Aborted {
            reason: format!("step limit of {} reached", self.config.step_limit),
        };
        ctx
    }

    /// One step against `ctx`: propose, vote, gate, guard, execute.
    pub async fn step(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let request = CompletionRequest::new(ctx.conversation.messages().to_vec())
            .functions(prompts::agent_functions())
            .n(self.config.candidates)
            .temperature(self.config.temperature);
        let choices = self.client.complete(request).await?;

        let mut candidates = step::parse_candidates(&choices);
        if candidates.is_empty() {
            return Err(StepError::NoCandidates);
        }
        let rendered: Vec<String> = candidates.iter().map(Action::render).collect();
        let topic = VoteTopic::Action {
            goal: ctx.goal.clone(),
            plan: ctx.plan.join("\n"),
            summary: ctx.summary(),
        };
        let winner = self.voter.vote(&topic, &rendered).await?;

        let action = step::gate(candidates.swap_remove(winner), &ctx.action_map);
        step::check_repetition(&ctx.history, &action)?;
        self.execute(ctx, action).await
    }

    async fn execute(&self, ctx: &RunContext, action: Action) -> Result<StepOutcome, StepError> {
        let (result, edit) = match &action {
            Action::Open(args) => {
                let path = hosting::normalize_path(&args.filepath);
                let result = match self.hosting.fetch_file(path, &ctx.branch.name).await? {
                    Some(contents) => hosting::numbered_file(&args.filepath, &contents),
                    None => format!(
                        "# {}\nThis file does not exist yet. Use edit to create it.",
                        args.filepath
                    ),
                };
                (result, None)
            }
            Action::Edit(args) => {
                let (edit, updated) = self.apply_edit(ctx, args).await?;
                (hosting::numbered_file(&args.filepath, &updated), Some(edit))
            }
            Action::Done(args) => {
                info!(goal = %args.goal, "marking complete");
                (format!("Marking complete: {}", args.goal), None)
            }
        };
        Ok(StepOutcome { action, result, edit })
    }

    async fn apply_edit(&self, ctx: &RunContext, args: &EditArgs) -> Result<(AppliedEdit, String), StepError> {
        let path = hosting::normalize_path(&args.filepath);
        let existing = self.hosting.fetch_file(path, &ctx.branch.name).await?;
        let before = existing.unwrap_or_default();

        let updated = self
            .editor
            .apply_edit(args.mode, path, &before, &args.code, args.line_start)
            .await?;
        let message = if before.is_empty() {
            format!("Create {path}")
        } else {
            format!("Update {path}")
        };
        self.hosting
            .commit_file(&ctx.branch.name, path, &updated, &message)
            .await?;

        let edit = AppliedEdit {
            filepath: path.to_string(),
            mode: args.mode,
            line_start: args.line_start,
            patch: diff_contents(&before, &updated, 3),
        };
        Ok((edit, updated))
    }

    async fn post_status(&self, issue: &IssueEvent, result: &AgentRunResult) {
        let body = status_comment(result);
        if let Err(e) = self.hosting.post_comment(issue.number, &body).await {
            warn!(error = %e, "failed to post status comment");
        }
    }
}

/// Final issue comment for a run.
pub fn status_comment(result: &AgentRunResult) -> String {
    let edited: IndexSet<&str> = result.edits.iter().map(|e| e.filepath.as_str()).collect();
    let files = if edited.is_empty() {
        "No files were changed.".to_string()
    } else {
        format!("Files changed: {}", edited.into_iter().collect::<Vec<_>>().join(", "))
    };
    match &result.state {
        RunState::Done => format!("Task completed in {} steps. {files}", result.steps),
        state => format!("{state} after {} steps. {files}", result.steps),
    }
}
