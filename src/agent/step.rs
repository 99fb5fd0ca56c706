//! Per-step rules: decoding candidates, the open-before-edit gate and the
//! repetition guard.

use tracing::{debug, info};

use super::StepError;
use crate::hosting::normalize_path;
use crate::llm::Choice;
use crate::models::action::{Action, ActionMap, ActionRecord, OpenArgs};

/// Decode every candidate that names a known action with valid arguments.
pub fn parse_candidates(choices: &[Choice]) -> Vec<Action> {
    choices
        .iter()
        .filter_map(|choice| match choice {
            Choice::FunctionCall(call) => match Action::from_call(&call.name, &call.arguments) {
                Ok(action) => Some(action),
                Err(e) => {
                    debug!(error = %e, "discarding candidate");
                    None
                }
            },
            Choice::Text(_) => {
                debug!("discarding candidate without a function call");
                None
            }
        })
        .collect()
}

/// An edit on a file never opened in this run becomes an open of that file.
/// Paths are compared with any leading `/` removed.
pub fn gate(action: Action, map: &ActionMap) -> Action {
    match action {
        Action::Edit(args) if !map.has_opened(normalize_path(&args.filepath)) => {
            info!(file = %args.filepath, "edit before open, opening instead");
            Action::Open(OpenArgs {
                filepath: args.filepath,
                next_step: args.next_step,
            })
        }
        other => other,
    }
}

/// Fails when `action` repeats the previous step exactly.
pub fn check_repetition(history: &[ActionRecord], action: &Action) -> Result<(), StepError> {
    match history.last() {
        Some(last) if last.action == *action => Err(StepError::Repetition(action.render())),
        _ => Ok(()),
    }
}

/// The user turn that follows an action: its result and the stated next step.
pub fn result_message(result: &str, next_step: Option<&str>) -> String {
    match next_step {
        Some(next) if !next.trim().is_empty() => format!("{result}\n\nNext step: {next}"),
        _ => result.to_string(),
    }
}
