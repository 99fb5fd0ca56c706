//! Shared types used across all modules.
//!
//! Diffs, pull request files, conversations and agent actions live here so
//! the pipeline modules import from one place rather than reaching into
//! each other's internals.

pub mod action;
pub mod conversation;
pub mod diff;
pub mod pr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use action::{Action, ActionKind, ActionMap, ActionRecord, EditMode};
pub use conversation::{ChatMessage, Conversation, Role};
pub use diff::{DiffLine, DiffLineType, FileDiff, Hunk, PatchInfo};
pub use pr::{CodeSuggestion, FileStatus, PrFile, ProcessGroup, Review, ReviewSuggestion};

/// Supported LLM provider backends.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderName {
    #[default]
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAI,
    Anthropic,
    Cohere,
    Gemini,
    Perplexity,
    #[serde(rename = "deepseek")]
    #[strum(serialize = "deepseek")]
    DeepSeek,
    #[serde(rename = "xai")]
    #[strum(serialize = "xai")]
    XAI,
    Groq,
    /// Any OpenAI-compatible API (Ollama, vLLM, local servers).
    #[serde(rename = "openai-compatible")]
    #[strum(serialize = "openai-compatible")]
    OpenAICompatible,
}

impl ProviderName {
    /// The provider's native API key variable, as read by rig-core's
    /// `from_env()` constructors.
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            ProviderName::Anthropic => "ANTHROPIC_API_KEY",
            ProviderName::OpenAI | ProviderName::OpenAICompatible => "OPENAI_API_KEY",
            ProviderName::Cohere => "COHERE_API_KEY",
            ProviderName::Gemini => "GEMINI_API_KEY",
            ProviderName::Perplexity => "PERPLEXITY_API_KEY",
            ProviderName::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderName::XAI => "XAI_API_KEY",
            ProviderName::Groq => "GROQ_API_KEY",
        }
    }
}
