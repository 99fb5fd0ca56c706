//! patchwise: LLM pull request reviewer and issue-driven coding agent.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! user-facing messages and installs the tracing subscriber.

mod cli;

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use patchwise::agent::{AgentRunner, RunState};
use patchwise::config::Config;
use patchwise::context::PatchContextBuilder;
use patchwise::diff::file::read_changes;
use patchwise::env::Env;
use patchwise::hosting::local::BASE_REF;
use patchwise::hosting::{HostingClient, IssueEvent, LocalWorkspace, PullRequestEvent};
use patchwise::llm::rig::RigClient;
use patchwise::llm::CompletionClient;
use patchwise::models::diff::FileDiff;
use patchwise::models::pr::PrFile;
use patchwise::partition::{HeuristicCounter, TokenBudgetPartitioner};
use patchwise::review::{ContextRenderer, ReviewPipeline};
use patchwise::scope::ScopeRegistry;
use patchwise::vote::LlmJudge;

use cli::args::{Cli, CodeArgs, Command, ContextArgs, ProviderArgs, ReviewArgs, ValidateArgs};

/// Ref the local workspace serves the working tree under.
const HEAD_REF: &str = "HEAD";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Context(args) => run_context(args).await,
        Command::Validate(args) => run_validate(args).await,
        Command::Review(args) => run_review(args).await,
        Command::Code(args) => run_code(args).await,
    }
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "patchwise=debug" } else { "patchwise=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(root: &Path, overrides: &ProviderArgs) -> Result<Config> {
    let env = Env::real();
    let mut config = Config::load(Some(root), &env).context("failed to load configuration")?;
    if let Some(name) = overrides.provider {
        if name != config.provider.name {
            config.provider.api_key = env.var(name.api_key_env_var()).ok().or(config.provider.api_key);
        }
        config.provider.name = name;
    }
    if let Some(model) = &overrides.model {
        config.provider.model = model.clone();
    }
    Ok(config)
}

async fn read_diff(path: &Path) -> Result<Vec<FileDiff>> {
    read_changes(path)
        .await
        .with_context(|| format!("failed to load diff {}", path.display()))
}

fn workspace(path: &Path, diffs: Vec<FileDiff>) -> Result<LocalWorkspace> {
    let root = std::fs::canonicalize(path)
        .with_context(|| format!("--path directory not found: {}", path.display()))?;
    Ok(LocalWorkspace::new(root).with_changes(diffs))
}

fn local_pr(ws: &LocalWorkspace) -> PullRequestEvent {
    PullRequestEvent {
        repository: ws.repository().clone(),
        number: 0,
        title: "local changes".to_string(),
        base_ref: BASE_REF.to_string(),
        head_ref: HEAD_REF.to_string(),
    }
}

fn model_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let client = RigClient::new(config.provider.clone()).context("failed to configure the LLM provider")?;
    Ok(Arc::new(client))
}

/// Print the prompt context of every file in a diff.
async fn run_context(args: ContextArgs) -> Result<()> {
    let diffs = read_diff(&args.diff_file).await?;
    let ws = workspace(&args.path, diffs)?;
    let config = Config::load(Some(ws.root()), &Env::real()).context("failed to load configuration")?;
    let context_lines = args.context_lines.unwrap_or(config.review.context_lines);
    let builder = PatchContextBuilder::new(ScopeRegistry::default(), context_lines);

    let pr = local_pr(&ws);
    let mut files: Vec<PrFile> = Vec::new();
    for mut file in ws.list_pr_files(&pr).await? {
        match ws.fetch_file(&file.filename, BASE_REF).await {
            Ok(old) => file.old_contents = old,
            Err(e) => warn!(file = %file.filename, error = %e, "base contents unavailable, using raw patch"),
        }
        cli::print_header(&file.filename);
        println!("{}\n", builder.build(&file, args.strategy.into()));
        files.push(file);
    }

    if args.groups {
        let ceiling = config.token_ceiling();
        let partition = TokenBudgetPartitioner::new(ceiling, HeuristicCounter)
            .partition(files, &ContextRenderer::new(&builder));
        cli::print_header(&format!("{} review group(s) at ceiling {ceiling}", partition.groups.len()));
        for (i, group) in partition.groups.iter().enumerate() {
            let names: Vec<&str> = group.files.iter().map(|f| f.filename.as_str()).collect();
            println!("  {} {} ({} tokens)", format!("{}.", i + 1).dimmed(), names.join(", "), group.token_length());
        }
        for file in &partition.dropped {
            println!("  {} {}", "dropped".yellow(), file.filename);
        }
    }
    Ok(())
}

/// Syntax dry run of one source file.
async fn run_validate(args: ValidateArgs) -> Result<()> {
    let path = &args.file;
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path.display().to_string();
    let Some(parser) = ScopeRegistry::default().for_filename(&name) else {
        bail!("no parser registered for {name}");
    };

    let check = parser.validate_syntax(&source);
    if check.valid {
        println!("{}", cli::status_line(true, &format!("{name} parses as {}", parser.language())));
        Ok(())
    } else {
        bail!("{}", cli::status_line(false, &format!("{name}: {}", check.error)));
    }
}

/// Review a local diff and print the result.
async fn run_review(args: ReviewArgs) -> Result<()> {
    let diffs = read_diff(&args.diff_file).await?;
    let ws = Arc::new(workspace(&args.path, diffs)?);
    let mut config = load_config(ws.root(), &args.provider)?;
    config.review.include_suggestions |= args.suggestions;

    let pipeline = ReviewPipeline::new(
        model_client(&config)?,
        ws.clone(),
        PatchContextBuilder::new(ScopeRegistry::default(), config.review.context_lines),
        config.review.clone(),
        config.token_ceiling(),
    );
    let review = pipeline.review(&local_pr(&ws)).await.context("review failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&review)?);
        return Ok(());
    }
    match &review.review {
        None => println!("Nothing to review."),
        Some(body) => {
            cli::print_header("Review");
            println!("{}", body.comment);
        }
    }
    for suggestion in &review.suggestions {
        cli::print_header(&format!("{}:{}", suggestion.file, suggestion.line_start));
        println!("{}\n{}", suggestion.comment, suggestion.correction.green());
    }
    Ok(())
}

/// Run the coding agent on a local directory.
async fn run_code(args: CodeArgs) -> Result<()> {
    let ws = Arc::new(workspace(&args.path, Vec::new())?);
    let mut config = load_config(ws.root(), &args.provider)?;
    if let Some(limit) = args.step_limit {
        config.agent.step_limit = limit;
    }
    if let Some(candidates) = args.candidates {
        config.agent.candidates = candidates;
    }
    if let Some(delay) = args.step_delay {
        config.agent.step_delay_secs = delay;
    }

    let client = model_client(&config)?;
    let judge = Arc::new(LlmJudge::new(client.clone()).with_votes(config.agent.candidates, 0.0));
    let runner = AgentRunner::new(client, ws.clone(), judge, ScopeRegistry::default(), config.agent.clone());
    let issue = IssueEvent {
        repository: ws.repository().clone(),
        number: 0,
        title: args.title,
        body: args.body,
    };
    let result = runner.run(&issue).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        cli::print_header(&result.state.to_string());
        for record in &result.actions {
            println!("  {}", record.action.render().dimmed());
        }
        for edit in &result.edits {
            cli::print_header(&edit.filepath);
            println!("{}", edit.patch.render());
        }
    }
    if let RunState::Aborted { reason } = &result.state {
        bail!("agent run aborted: {reason}");
    }
    Ok(())
}
