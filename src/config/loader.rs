//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.patchwise.toml` in repo root
//! 4. `~/.config/patchwise/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::constants::{
    DEFAULT_AGENT_TEMPERATURE, DEFAULT_BRANCH_PREFIX, DEFAULT_CANDIDATES, DEFAULT_CONTEXT_LINES,
    DEFAULT_REPAIR_ATTEMPTS, DEFAULT_STEP_DELAY_SECS, DEFAULT_STEP_LIMIT, DEFAULT_STEP_RETRIES,
    ENV_API_KEY, ENV_BASE_URL, ENV_MODEL, ENV_PROVIDER, ENV_TOKEN_CEILING, IGNORED_EXTENSIONS,
    IGNORED_FILES, token_limit_for_model,
};
use crate::env::Env;
use crate::models::ProviderName;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub review: ReviewConfig,
    pub agent: AgentConfig,
}

/// PR review settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Overrides the model's known context window.
    pub token_ceiling: Option<usize>,
    /// Original lines shown around a hunk when no scope is found.
    pub context_lines: usize,
    /// Generate inline fix suggestions for each structured finding.
    pub include_suggestions: bool,
    pub ignored_files: Vec<String>,
    pub ignored_extensions: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            token_ceiling: None,
            context_lines: DEFAULT_CONTEXT_LINES,
            include_suggestions: false,
            ignored_files: IGNORED_FILES.iter().map(|s| s.to_string()).collect(),
            ignored_extensions: IGNORED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Coding agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub step_limit: usize,
    /// Candidate completions requested per decision.
    pub candidates: usize,
    pub temperature: f64,
    pub step_delay_secs: u64,
    /// Extra attempts for a failed step.
    pub step_retries: usize,
    /// Repair rounds for an edit that leaves the file unparsable.
    pub repair_attempts: usize,
    pub branch_prefix: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            candidates: DEFAULT_CANDIDATES,
            temperature: DEFAULT_AGENT_TEMPERATURE,
            step_delay_secs: DEFAULT_STEP_DELAY_SECS,
            step_retries: DEFAULT_STEP_RETRIES,
            repair_attempts: DEFAULT_REPAIR_ATTEMPTS,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        }
    }
}

/// LLM provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::OpenAI,
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, repo-local config, then applies
    /// environment variable overrides.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        if let Some(root) = repo_root {
            let local_path = root.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        config.apply_env_vars(env);

        Ok(config)
    }

    /// Token ceiling for review requests.
    pub fn token_ceiling(&self) -> usize {
        self.review
            .token_ceiling
            .unwrap_or_else(|| token_limit_for_model(&self.provider.model))
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one; only fields that differ from the
    /// built-in defaults override.
    fn merge(&mut self, other: Config) {
        let default_provider = ProviderConfig::default();
        if other.provider.name != default_provider.name {
            self.provider.name = other.provider.name;
        }
        if other.provider.model != default_provider.model {
            self.provider.model = other.provider.model;
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url;
        }
        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }

        let default_review = ReviewConfig::default();
        if other.review.token_ceiling.is_some() {
            self.review.token_ceiling = other.review.token_ceiling;
        }
        if other.review.context_lines != default_review.context_lines {
            self.review.context_lines = other.review.context_lines;
        }
        if other.review.include_suggestions {
            self.review.include_suggestions = true;
        }
        if other.review.ignored_files != default_review.ignored_files {
            self.review.ignored_files = other.review.ignored_files;
        }
        if other.review.ignored_extensions != default_review.ignored_extensions {
            self.review.ignored_extensions = other.review.ignored_extensions;
        }

        let default_agent = AgentConfig::default();
        if other.agent.step_limit != default_agent.step_limit {
            self.agent.step_limit = other.agent.step_limit;
        }
        if other.agent.candidates != default_agent.candidates {
            self.agent.candidates = other.agent.candidates;
        }
        if other.agent.temperature != default_agent.temperature {
            self.agent.temperature = other.agent.temperature;
        }
        if other.agent.step_delay_secs != default_agent.step_delay_secs {
            self.agent.step_delay_secs = other.agent.step_delay_secs;
        }
        if other.agent.step_retries != default_agent.step_retries {
            self.agent.step_retries = other.agent.step_retries;
        }
        if other.agent.repair_attempts != default_agent.repair_attempts {
            self.agent.repair_attempts = other.agent.repair_attempts;
        }
        if other.agent.branch_prefix != default_agent.branch_prefix {
            self.agent.branch_prefix = other.agent.branch_prefix;
        }
    }

    fn apply_env_vars(&mut self, env: &Env) {
        if let Ok(val) = env.var(ENV_PROVIDER) {
            match val.parse::<ProviderName>() {
                Ok(name) => self.provider.name = name,
                Err(_) => warn!(var = ENV_PROVIDER, value = %val, "ignoring invalid provider"),
            }
        }
        if let Ok(val) = env.var(ENV_MODEL) {
            self.provider.model = val;
        }
        if let Ok(val) = env.var(ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }

        let api_key = env
            .var(ENV_API_KEY)
            .or_else(|_| env.var(self.provider.name.api_key_env_var()))
            .ok();
        if api_key.is_some() {
            self.provider.api_key = api_key;
        }

        match env.parsed::<usize>(ENV_TOKEN_CEILING) {
            Some(Ok(ceiling)) => self.review.token_ceiling = Some(ceiling),
            Some(Err(val)) => warn!(var = ENV_TOKEN_CEILING, value = %val, "ignoring invalid token ceiling"),
            None => {}
        }
    }
}
