//! CompletionClient trait and function-calling types.
//!
//! The agent, voter, editor and review pipeline all talk to the model
//! through [`CompletionClient`], which keeps them independent of the LLM
//! library. The production implementation lives in [`rig`].

pub mod rig;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ChatMessage;

/// Errors from the completion client.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("model did not call the `{0}` function")]
    NoFunctionCall(String),

    #[error("invalid arguments for `{function}`: {source}")]
    InvalidArguments {
        function: String,
        source: serde_json::Error,
    },
}

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: serde_json::Value,
}

impl FunctionSpec {
    /// Describe a function whose arguments deserialize into `T`.
    pub fn new<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            description: description.into(),
            parameters: schema.to_value(),
        }
    }
}

/// Whether the model may answer freely or must call one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FunctionCallMode {
    #[default]
    Auto,
    Force(String),
}

/// A structured function invocation returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        serde_json::from_value(self.arguments.clone()).map_err(|source| LlmError::InvalidArguments {
            function: self.name.clone(),
            source,
        })
    }
}

/// One completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    Text(String),
    FunctionCall(FunctionCall),
}

impl Choice {
    pub fn function_call(&self) -> Option<&FunctionCall> {
        match self {
            Choice::FunctionCall(call) => Some(call),
            Choice::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Choice::Text(text) => Some(text),
            Choice::FunctionCall(_) => None,
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub functions: Vec<FunctionSpec>,
    pub function_call: FunctionCallMode,
    /// Number of completions to return.
    pub n: usize,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            functions: Vec::new(),
            function_call: FunctionCallMode::Auto,
            n: 1,
            temperature: 0.0,
        }
    }

    pub fn functions(mut self, functions: Vec<FunctionSpec>) -> Self {
        self.functions = functions;
        self
    }

    /// Offer a single function and require the model to call it.
    pub fn force(mut self, function: FunctionSpec) -> Self {
        self.function_call = FunctionCallMode::Force(function.name.clone());
        self.functions = vec![function];
        self
    }

    pub fn n(mut self, n: usize) -> Self {
        self.n = n.max(1);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Name of the function the model must call, if any.
    pub fn forced_function(&self) -> Option<&str> {
        match &self.function_call {
            FunctionCallMode::Force(name) => Some(name),
            FunctionCallMode::Auto => None,
        }
    }
}

/// Chat completion with function calling.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return `request.n` choices for the conversation.
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<Choice>, LlmError>;
}

/// Force a single call to `function` and decode its arguments.
pub async fn call_function<T: DeserializeOwned>(
    client: &dyn CompletionClient,
    messages: Vec<ChatMessage>,
    function: FunctionSpec,
    temperature: f64,
) -> Result<T, LlmError> {
    let name = function.name.clone();
    let request = CompletionRequest::new(messages)
        .force(function)
        .temperature(temperature);
    let choices = client.complete(request).await?;
    let call = choices
        .iter()
        .find_map(Choice::function_call)
        .filter(|call| call.name == name)
        .ok_or_else(|| LlmError::NoFunctionCall(name.clone()))?;
    call.parse_arguments()
}

/// Scripted client for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued responses and records every request.
    #[derive(Default)]
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Vec<Choice>, LlmError>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_calls(self, calls: Vec<(&str, serde_json::Value)>) -> Self {
            let choices = calls
                .into_iter()
                .map(|(name, args)| Choice::FunctionCall(FunctionCall::new(name, args)))
                .collect();
            self.responses.lock().unwrap().push_back(Ok(choices));
            self
        }

        pub fn push_call(self, name: &str, args: serde_json::Value) -> Self {
            self.push_calls(vec![(name, args)])
        }

        pub fn push_text(self, text: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(vec![Choice::Text(text.to_string())]));
            self
        }

        pub fn push_error(self, message: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(LlmError::ApiError(message.to_string())));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<Vec<Choice>, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::ApiError("script exhausted".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Pick {
        index: usize,
    }

    #[test]
    fn function_spec_carries_schema() {
        let spec = FunctionSpec::new::<Pick>("pick", "Pick one");
        assert_eq!(spec.parameters["type"], "object");
        assert!(spec.parameters["properties"]["index"].is_object());
    }

    #[test]
    fn force_offers_only_forced_function() {
        let request = CompletionRequest::new(vec![])
            .functions(vec![FunctionSpec::new::<Pick>("other", "")])
            .force(FunctionSpec::new::<Pick>("pick", ""))
            .n(0);
        assert_eq!(request.forced_function(), Some("pick"));
        assert_eq!(request.functions.len(), 1);
        assert_eq!(request.n, 1);
    }

    #[tokio::test]
    async fn call_function_decodes_arguments() {
        let client = ScriptedClient::new().push_call("pick", json!({"index": 2}));
        let pick: Pick = call_function(&client, vec![], FunctionSpec::new::<Pick>("pick", ""), 0.0)
            .await
            .unwrap();
        assert_eq!(pick, Pick { index: 2 });
    }

    #[tokio::test]
    async fn call_function_rejects_text_reply() {
        let client = ScriptedClient::new().push_text("I think the second one");
        let err = call_function::<Pick>(&client, vec![], FunctionSpec::new::<Pick>("pick", ""), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NoFunctionCall(name) if name == "pick"));
    }

    #[tokio::test]
    async fn call_function_reports_bad_arguments() {
        let client = ScriptedClient::new().push_call("pick", json!({"index": "two"}));
        let err = call_function::<Pick>(&client, vec![], FunctionSpec::new::<Pick>("pick", ""), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidArguments { .. }));
    }
}
