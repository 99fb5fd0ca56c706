//! rig-core backed completion client.
//!
//! Uses rig-core's provider clients and Agent abstraction for multi-provider
//! support: Anthropic, OpenAI, Cohere, Gemini, Perplexity, DeepSeek, xAI,
//! Groq, and any OpenAI-compatible API.
//!
//! Function calling is carried in-band. The offered functions are described
//! in the preamble and the model answers with a JSON object
//! `{"name": ..., "arguments": {...}}`, which is parsed back into a
//! [`Choice::FunctionCall`]. `n` completions are `n` sequential prompts.

use std::time::Duration;

use ::rig::client::CompletionClient as _;
use ::rig::completion::Prompt;
use ::rig::providers;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::models::{ChatMessage, ProviderName, Role};

use super::{Choice, CompletionClient, CompletionRequest, FunctionCall, FunctionSpec, LlmError};

/// Maximum tokens per completion response.
const MAX_TOKENS: u64 = 16384;

/// Maximum length of response text quoted in parse error messages.
const PARSE_ERROR_PREVIEW_LEN: usize = 500;

/// Maximum number of retry attempts for transient API errors.
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay between retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum backoff delay between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Build an agent from a rig-core client and prompt it once.
macro_rules! prompt_text {
    ($client:expr, $model:expr, $system:expr, $user:expr, $temperature:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble($system)
            .temperature($temperature)
            .max_tokens(MAX_TOKENS)
            .build();
        agent
            .prompt($user)
            .await
            .map_err(|e| LlmError::ApiError(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| {
            LlmError::ApiError(format!("failed to create {} client: {e}", $label))
        })
    }};
}

/// rig-core based completion client.
///
/// The provider name in config selects which rig-core provider to use.
pub struct RigClient {
    config: ProviderConfig,
}

impl RigClient {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or {}.",
                config.name,
                crate::constants::ENV_API_KEY,
                config.name.api_key_env_var()
            )));
        }
        if config.name == ProviderName::OpenAICompatible && config.base_url.is_none() {
            return Err(LlmError::NotConfigured(
                "openai-compatible provider requires base_url to be set".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("missing API key".to_string()))
    }

    fn build_openai_client(
        &self,
        api_key: &str,
    ) -> Result<providers::openai::CompletionsClient, LlmError> {
        let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
        if let Some(ref base_url) = self.config.base_url {
            builder = builder.base_url(base_url);
        }
        let client: providers::openai::CompletionsClient = builder
            .build()
            .map_err(|e| LlmError::ApiError(format!("failed to create OpenAI client: {e}")))?;
        Ok(client)
    }

    /// One completion through rig-core, returning the raw response text.
    async fn call_rig(&self, system: &str, user: &str, temperature: f64) -> Result<String, LlmError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        LlmError::ApiError(format!("failed to create Anthropic client: {e}"))
                    })?;
                prompt_text!(client, model, system, user, temperature, "Anthropic")
            }
            ProviderName::OpenAI | ProviderName::OpenAICompatible => {
                let client = self.build_openai_client(api_key)?;
                prompt_text!(client, model, system, user, temperature, "OpenAI")
            }
            ProviderName::Cohere => {
                let client = new_client!(providers::cohere::Client, api_key, "Cohere")?;
                prompt_text!(client, model, system, user, temperature, "Cohere")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                prompt_text!(client, model, system, user, temperature, "Gemini")
            }
            ProviderName::Perplexity => {
                let client = new_client!(providers::perplexity::Client, api_key, "Perplexity")?;
                prompt_text!(client, model, system, user, temperature, "Perplexity")
            }
            ProviderName::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                prompt_text!(client, model, system, user, temperature, "DeepSeek")
            }
            ProviderName::XAI => {
                let client = new_client!(providers::xai::Client, api_key, "xAI")?;
                prompt_text!(client, model, system, user, temperature, "xAI")
            }
            ProviderName::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                prompt_text!(client, model, system, user, temperature, "Groq")
            }
        }
    }

    /// `call_rig` with retries on transient API failures.
    async fn call_with_retry(&self, system: &str, user: &str, temperature: f64) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.call_rig(system, user, temperature).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    let backoff = retry_backoff(attempt);
                    warn!(
                        reason = classify_error(&e).unwrap_or("transient error"),
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        "retrying completion"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl CompletionClient for RigClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<Choice>, LlmError> {
        let system = render_preamble(&request);
        let user = render_transcript(&request.messages);

        let mut choices = Vec::with_capacity(request.n);
        for index in 0..request.n {
            debug!(model = %self.config.model, index, n = request.n, "requesting completion");
            let response = self.call_with_retry(&system, &user, request.temperature).await?;
            choices.push(parse_choice(&response, &request)?);
        }
        Ok(choices)
    }
}

/// System messages plus the function-calling contract.
fn render_preamble(request: &CompletionRequest) -> String {
    let mut preamble = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    if request.functions.is_empty() {
        return preamble;
    }

    preamble.push_str("\n\n## Functions\n\nYou can call the following functions:\n");
    for function in &request.functions {
        preamble.push_str(&format!(
            "\n### {}\n{}\nArguments JSON schema: {}\n",
            function.name, function.description, function.parameters
        ));
    }
    preamble.push_str(
        "\nTo call a function, respond with only a JSON object of the form \
         {\"name\": \"<function name>\", \"arguments\": {...}} and nothing else.",
    );
    if let Some(name) = request.forced_function() {
        preamble.push_str(&format!("\nYou must call the `{name}` function."));
    }
    preamble
}

/// Non-system messages as a labelled transcript.
fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| match m.role {
            Role::Assistant => format!("ASSISTANT:\n{}", m.content),
            _ => format!("USER:\n{}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turn a response into a choice.
///
/// A forced call that cannot be found in the response is a parse error;
/// otherwise unparseable output is returned as text.
fn parse_choice(response: &str, request: &CompletionRequest) -> Result<Choice, LlmError> {
    let trimmed = response.trim();
    if !request.functions.is_empty() {
        if let Some(call) = parse_function_call(trimmed, &request.functions, request.forced_function()) {
            return Ok(Choice::FunctionCall(call));
        }
        if let Some(name) = request.forced_function() {
            return Err(LlmError::ParseError(format!(
                "expected a call to `{name}`. Response: {}",
                &trimmed[..floor_char_boundary(trimmed, PARSE_ERROR_PREVIEW_LEN)]
            )));
        }
    }
    Ok(Choice::Text(trimmed.to_string()))
}

fn parse_function_call(
    text: &str,
    functions: &[FunctionSpec],
    forced: Option<&str>,
) -> Option<FunctionCall> {
    for candidate in extract_json_candidates(text) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate) else {
            continue;
        };
        let Some(object) = value.as_object() else {
            continue;
        };

        let name = object
            .get("name")
            .or_else(|| object.get("function"))
            .and_then(|v| v.as_str());
        match (name, object.get("arguments")) {
            (Some(name), Some(arguments)) if functions.iter().any(|f| f.name == name) => {
                // Some models double-encode the arguments as a string.
                let arguments = match arguments {
                    serde_json::Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| arguments.clone()),
                    other => other.clone(),
                };
                return Some(FunctionCall::new(name, arguments));
            }
            // A bare argument object is accepted for a forced call.
            (None, _) => {
                if let Some(forced) = forced {
                    return Some(FunctionCall::new(forced, value.clone()));
                }
            }
            _ => {}
        }
    }
    None
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Check whether an error is transient and worth retrying.
///
/// Parse errors are never retried here; the model is likely to produce the
/// same malformed output again. Step-level retries handle those.
pub fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::ParseError(_) => false,
        _ => classify_error(err).is_some(),
    }
}

/// Classifies an error into a short message for transient failures.
pub fn classify_error(err: &LlmError) -> Option<&'static str> {
    match err {
        LlmError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429")
                || msg_lower.contains("rate limit")
                || msg_lower.contains("too many requests")
            {
                Some("Rate limited by API")
            } else if msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("high demand")
            {
                Some("High model load")
            } else if msg_lower.contains("529") || msg_lower.contains("overloaded") {
                Some("API overloaded")
            } else if msg_lower.contains("502") {
                Some("API gateway error")
            } else if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
                Some("Request timed out")
            } else if msg_lower.contains("connection") {
                Some("Connection error")
            } else if msg_lower.contains("temporarily") || msg_lower.contains("try again") {
                Some("Temporary API error")
            } else {
                None
            }
        }
        LlmError::ParseError(_) => Some("Failed to parse LLM response"),
        _ => None,
    }
}

/// Exponential backoff for a retry attempt, capped at [`MAX_BACKOFF`].
pub fn retry_backoff(attempt: u32) -> Duration {
    let backoff = INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
    backoff.min(MAX_BACKOFF)
}

/// Content inside markdown code fences. The closing fence must start a line.
static FENCE_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap());

/// Candidate JSON strings in a response: the text itself, the outermost
/// `{...}` slice, and the contents of any code fences.
fn extract_json_candidates(text: &str) -> Vec<String> {
    let mut candidates = vec![text.to_string()];

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(text[start..=end].to_string());
        }
    }

    for cap in FENCE_RE.captures_iter(text) {
        if let Some(inner) = cap.get(1) {
            let inner_trimmed = inner.as_str().trim();
            if !inner_trimmed.is_empty() {
                candidates.push(inner_trimmed.to_string());
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct OpenArgs {
        filepath: String,
    }

    fn request_with(functions: &[&str]) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system("You are an expert developer."),
            ChatMessage::user("Goal: fix it"),
            ChatMessage::assistant("calling open with args: a.ts"),
        ])
        .functions(
            functions
                .iter()
                .map(|name| FunctionSpec::new::<OpenArgs>(*name, "Open a file"))
                .collect(),
        )
    }

    #[test]
    fn preamble_lists_functions_and_forced_call() {
        let request = request_with(&[]).force(FunctionSpec::new::<OpenArgs>("open", "Open a file"));
        let preamble = render_preamble(&request);
        assert!(preamble.starts_with("You are an expert developer."));
        assert!(preamble.contains("### open\nOpen a file"));
        assert!(preamble.contains("\"filepath\""));
        assert!(preamble.ends_with("You must call the `open` function."));
    }

    #[test]
    fn preamble_without_functions_is_system_text() {
        let request = CompletionRequest::new(vec![ChatMessage::system("Be brief.")]);
        assert_eq!(render_preamble(&request), "Be brief.");
    }

    #[test]
    fn transcript_labels_turns() {
        let request = request_with(&[]);
        assert_eq!(
            render_transcript(&request.messages),
            "USER:\nGoal: fix it\n\nASSISTANT:\ncalling open with args: a.ts"
        );
    }

    #[test]
    fn parses_fenced_function_call() {
        let request = request_with(&["open", "done"]);
        let response = "Sure.\n```json\n{\"name\": \"open\", \"arguments\": {\"filepath\": \"src/a.ts\"}}\n```";
        let choice = parse_choice(response, &request).unwrap();
        assert_eq!(
            choice,
            Choice::FunctionCall(FunctionCall::new("open", json!({"filepath": "src/a.ts"})))
        );
    }

    #[test]
    fn decodes_string_encoded_arguments() {
        let request = request_with(&["open"]);
        let response = r#"{"name": "open", "arguments": "{\"filepath\": \"a.ts\"}"}"#;
        let call = parse_choice(response, &request).unwrap();
        assert_eq!(call.function_call().unwrap().arguments, json!({"filepath": "a.ts"}));
    }

    #[test]
    fn unknown_function_falls_back_to_text() {
        let request = request_with(&["open"]);
        let response = r#"{"name": "delete", "arguments": {}}"#;
        assert_eq!(parse_choice(response, &request).unwrap(), Choice::Text(response.to_string()));
    }

    #[test]
    fn forced_call_accepts_bare_arguments() {
        let request = request_with(&[]).force(FunctionSpec::new::<OpenArgs>("open", ""));
        let call = parse_choice(r#"{"filepath": "b.ts"}"#, &request).unwrap();
        assert_eq!(call, Choice::FunctionCall(FunctionCall::new("open", json!({"filepath": "b.ts"}))));
    }

    #[test]
    fn forced_call_without_json_is_parse_error() {
        let request = request_with(&[]).force(FunctionSpec::new::<OpenArgs>("open", ""));
        let err = parse_choice("I would open the file.", &request).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn classify_transient_errors() {
        let rate = LlmError::ApiError("HTTP 429 Too Many Requests".to_string());
        assert_eq!(classify_error(&rate), Some("Rate limited by API"));
        assert!(is_retryable(&rate));

        let auth = LlmError::ApiError("401 invalid api key".to_string());
        assert_eq!(classify_error(&auth), None);
        assert!(!is_retryable(&auth));

        assert!(!is_retryable(&LlmError::NotConfigured("x".to_string())));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(0), Duration::from_secs(10));
        assert_eq!(retry_backoff(1), Duration::from_secs(20));
        assert_eq!(retry_backoff(2), Duration::from_secs(40));
        assert_eq!(retry_backoff(3), MAX_BACKOFF);
        assert_eq!(retry_backoff(30), MAX_BACKOFF);
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let err = RigClient::new(ProviderConfig::default()).err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured(_)));
    }

    #[test]
    fn compatible_provider_requires_base_url() {
        let config = ProviderConfig {
            name: ProviderName::OpenAICompatible,
            api_key: Some("sk-local".to_string()),
            ..ProviderConfig::default()
        };
        assert!(matches!(RigClient::new(config), Err(LlmError::NotConfigured(_))));
    }
}
