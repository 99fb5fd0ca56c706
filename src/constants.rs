//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and tuning defaults so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "patchwise";

/// Crate version, baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.patchwise.toml` in repo root).
pub const CONFIG_FILENAME: &str = ".patchwise.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "patchwise";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "PATCHWISE_PROVIDER";
pub const ENV_MODEL: &str = "PATCHWISE_MODEL";
pub const ENV_API_KEY: &str = "PATCHWISE_API_KEY";
pub const ENV_BASE_URL: &str = "PATCHWISE_BASE_URL";
pub const ENV_TOKEN_CEILING: &str = "PATCHWISE_TOKEN_CEILING";

// ── Review defaults ─────────────────────────────────────────────────

/// Lines of original context shown above and below a hunk in the
/// line-window fallback.
pub const DEFAULT_CONTEXT_LINES: usize = 5;

/// Context window assumed for models missing from [`MODEL_TOKEN_LIMITS`].
pub const DEFAULT_TOKEN_CEILING: usize = 8_192;

/// Known model context windows, matched by model-name prefix.
///
/// Longer prefixes are listed first so `gpt-4o` wins over `gpt-4`.
pub const MODEL_TOKEN_LIMITS: &[(&str, usize)] = &[
    ("gpt-3.5-turbo-16k", 16_384),
    ("gpt-3.5-turbo", 4_096),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("claude", 200_000),
    ("gemini", 1_000_000),
    ("llama", 8_192),
    ("mixtral", 32_768),
    ("deepseek", 64_000),
];

/// Filenames that are never worth reviewing.
pub const IGNORED_FILES: &[&str] = &["package-lock.json", "yarn.lock", ".gitignore"];

/// Extensions for binary or media files that carry no reviewable patch.
pub const IGNORED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "mp4", "mp3"];

// ── Agent defaults ──────────────────────────────────────────────────

pub const DEFAULT_STEP_LIMIT: usize = 10;
pub const DEFAULT_CANDIDATES: usize = 3;
pub const DEFAULT_AGENT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_STEP_DELAY_SECS: u64 = 5;
pub const DEFAULT_STEP_RETRIES: usize = 1;
pub const DEFAULT_REPAIR_ATTEMPTS: usize = 5;
pub const DEFAULT_BRANCH_PREFIX: &str = "Code-Bot";

/// Look up the context window for a model name.
pub fn token_limit_for_model(model: &str) -> usize {
    let model = model.to_lowercase();
    MODEL_TOKEN_LIMITS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_TOKEN_CEILING)
}
