//! Clap argument types.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use patchwise::context::ContextStrategy;
use patchwise::models::ProviderName;

/// LLM pull request reviewer and issue-driven coding agent.
#[derive(Parser, Debug)]
#[command(name = "patchwise", version = patchwise::constants::VERSION)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Print the prompt context built for each file of a diff.
    Context(ContextArgs),

    /// Check that a source file parses.
    Validate(ValidateArgs),

    /// Review a local diff with the configured model.
    Review(ReviewArgs),

    /// Run the coding agent against a local working directory.
    Code(CodeArgs),
}

/// Provider overrides shared by commands that call a model.
#[derive(clap::Args, Debug, Default)]
pub struct ProviderArgs {
    /// LLM provider (overrides config and environment).
    #[arg(long)]
    pub provider: Option<ProviderName>,

    /// Model name (overrides config and environment).
    #[arg(long)]
    pub model: Option<String>,
}

/// Context rendering strategy.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum StrategyArg {
    Raw,
    Expanded,
    #[default]
    Scoped,
}

impl From<StrategyArg> for ContextStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Raw => ContextStrategy::Raw,
            StrategyArg::Expanded => ContextStrategy::Expanded,
            StrategyArg::Scoped => ContextStrategy::Scoped,
        }
    }
}

/// Arguments for the `context` subcommand.
#[derive(Parser, Debug)]
pub struct ContextArgs {
    /// Unified diff whose head side is checked out under --path.
    #[arg(long)]
    pub diff_file: PathBuf,

    /// Working directory holding the head side of the diff.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    #[arg(long, value_enum, default_value_t = StrategyArg::Scoped)]
    pub strategy: StrategyArg,

    /// Original lines shown around a hunk without a scope.
    #[arg(long)]
    pub context_lines: Option<usize>,

    /// Also print how the files would be grouped for review.
    #[arg(long, default_value_t = false)]
    pub groups: bool,
}

/// Arguments for the `validate` subcommand.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Source file to parse.
    pub file: PathBuf,
}

/// Arguments for the `review` subcommand.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// Unified diff whose head side is checked out under --path.
    #[arg(long)]
    pub diff_file: PathBuf,

    /// Working directory holding the head side of the diff.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Generate inline fixes for each structured finding.
    #[arg(long, default_value_t = false)]
    pub suggestions: bool,

    /// Print the review as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

/// Arguments for the `code` subcommand.
#[derive(Parser, Debug)]
pub struct CodeArgs {
    /// Working directory the agent reads and edits.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Issue title: the goal of the run.
    #[arg(long)]
    pub title: String,

    /// Issue body with further detail.
    #[arg(long, default_value = "")]
    pub body: String,

    /// Maximum number of agent steps.
    #[arg(long)]
    pub step_limit: Option<usize>,

    /// Candidate completions requested per step.
    #[arg(long)]
    pub candidates: Option<usize>,

    /// Seconds to wait between steps.
    #[arg(long)]
    pub step_delay: Option<u64>,

    /// Print the run result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}
