//! Agent actions, their typed arguments, and per-run action bookkeeping.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// How an edit is spliced into the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EditMode {
    /// Add the code at the start line without removing anything.
    Insert,
    /// Replace existing lines from the start line with the code.
    Overwrite,
}

/// The kinds of action the agent may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Open,
    Edit,
    Done,
}

/// Arguments for opening a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OpenArgs {
    /// The filepath to get the contents of.
    pub filepath: String,
    /// The next part of the plan to achieve the goal.
    #[serde(rename = "nextStep", default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Arguments for editing a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EditArgs {
    /// Either "insert" (add code at the start line) or "overwrite" (replace
    /// the lines starting at the start line).
    pub mode: EditMode,
    /// The filepath to edit the contents of.
    pub filepath: String,
    /// The code to place at the start line.
    pub code: String,
    /// 1-based line where the change starts.
    #[serde(rename = "lineStart", deserialize_with = "lenient_line")]
    #[schemars(with = "i64")]
    pub line_start: i64,
    /// The next part of the plan to achieve the goal.
    #[serde(rename = "nextStep", default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Arguments for finishing the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DoneArgs {
    /// The completed goal.
    pub goal: String,
}

/// Error turning a model function call into an [`Action`].
#[derive(Error, Debug)]
pub enum ActionParseError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid arguments for {action}: {source}")]
    InvalidArguments {
        action: ActionKind,
        source: serde_json::Error,
    },
}

/// A single agent action with strongly-typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Open(OpenArgs),
    Edit(EditArgs),
    Done(DoneArgs),
}

impl Action {
    /// Parse a function name and JSON arguments into a typed action.
    pub fn from_call(name: &str, arguments: &serde_json::Value) -> Result<Self, ActionParseError> {
        let kind: ActionKind = name
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| ActionParseError::UnknownAction(name.to_string()))?;
        let invalid = |source| ActionParseError::InvalidArguments { action: kind, source };
        let action = match kind {
            ActionKind::Open => Action::Open(serde_json::from_value(arguments.clone()).map_err(invalid)?),
            ActionKind::Edit => Action::Edit(serde_json::from_value(arguments.clone()).map_err(invalid)?),
            ActionKind::Done => Action::Done(serde_json::from_value(arguments.clone()).map_err(invalid)?),
        };
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Open(_) => ActionKind::Open,
            Action::Edit(_) => ActionKind::Edit,
            Action::Done(_) => ActionKind::Done,
        }
    }

    /// The file the action targets, if any.
    pub fn filepath(&self) -> Option<&str> {
        match self {
            Action::Open(args) => Some(&args.filepath),
            Action::Edit(args) => Some(&args.filepath),
            Action::Done(_) => None,
        }
    }

    /// The model's stated rationale for what comes next.
    pub fn next_step(&self) -> Option<&str> {
        match self {
            Action::Open(args) => args.next_step.as_deref(),
            Action::Edit(args) => args.next_step.as_deref(),
            Action::Done(_) => None,
        }
    }

    /// Canonical one-line rendering used for voting and the transcript.
    ///
    /// Two candidates are considered identical iff their renderings match.
    pub fn render(&self) -> String {
        match self {
            Action::Open(args) => format!("calling open with args: {}", args.filepath),
            Action::Edit(args) => format!(
                "calling edit with args: {}, {}, {}, {}",
                args.mode, args.filepath, args.line_start, args.code
            ),
            Action::Done(args) => format!("calling done with args: {}", args.goal),
        }
    }
}

/// Accept integer, float, or numeric-string line numbers from the model.
pub(crate) fn lenient_line<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("invalid line number: {n}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("invalid line number: {s}"))),
        other => Err(D::Error::custom(format!("invalid line number: {other}"))),
    }
}

/// One executed step, appended to the run's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub action: Action,
}

impl ActionRecord {
    pub fn new(action: Action) -> Self {
        Self { action }
    }

    pub fn name(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Filepaths each action kind has been applied to in this run.
///
/// Grows monotonically; consulted before allowing an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap {
    entries: IndexMap<ActionKind, Vec<String>>,
}

impl ActionMap {
    pub fn record(&mut self, kind: ActionKind, filepath: &str) {
        self.entries.entry(kind).or_default().push(filepath.to_string());
    }

    pub fn paths(&self, kind: ActionKind) -> &[String] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_opened(&self, filepath: &str) -> bool {
        self.paths(ActionKind::Open).iter().any(|p| p == filepath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_edit_with_float_line() {
        let action = Action::from_call(
            "edit",
            &json!({"mode": "overwrite", "filepath": "src/a.ts", "code": "x", "lineStart": 12.0}),
        )
        .unwrap();
        match action {
            Action::Edit(args) => {
                assert_eq!(args.line_start, 12);
                assert_eq!(args.mode, EditMode::Overwrite);
                assert!(args.next_step.is_none());
            }
            other => panic!("expected edit, got {other:?}"),
        }
    }

    #[test]
    fn parse_is_case_insensitive_on_name() {
        let action = Action::from_call("Open", &json!({"filepath": "a.ts", "nextStep": "read"})).unwrap();
        assert_eq!(action.kind(), ActionKind::Open);
        assert_eq!(action.next_step(), Some("read"));
    }

    #[test]
    fn unknown_action_rejected() {
        let err = Action::from_call("delete", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown action"));
    }

    #[test]
    fn missing_arguments_rejected() {
        let err = Action::from_call("edit", &json!({"filepath": "a.ts"})).unwrap_err();
        assert!(matches!(err, ActionParseError::InvalidArguments { action: ActionKind::Edit, .. }));
    }

    #[test]
    fn render_is_canonical() {
        let a = Action::Open(OpenArgs { filepath: "a.ts".into(), next_step: Some("one".into()) });
        let b = Action::Open(OpenArgs { filepath: "a.ts".into(), next_step: Some("two".into()) });
        assert_eq!(a.render(), b.render());
        assert_ne!(a, b);
    }

    #[test]
    fn action_map_tracks_opens() {
        let mut map = ActionMap::default();
        assert!(!map.has_opened("a.ts"));
        map.record(ActionKind::Open, "a.ts");
        map.record(ActionKind::Edit, "a.ts");
        assert!(map.has_opened("a.ts"));
        assert_eq!(map.paths(ActionKind::Edit), ["a.ts".to_string()]);
        assert!(map.paths(ActionKind::Done).is_empty());
    }
}
