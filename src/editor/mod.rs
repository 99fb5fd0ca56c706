//! Line-level edits with syntax validation and model-driven repair.
//!
//! An edit is spliced into the file and, when a scope parser is registered
//! for the file's extension, the result is parsed. A result that does not
//! parse is handed back to the model together with the parser error, up to
//! a fixed number of rounds. If it still does not parse the edit fails and
//! nothing is returned for committing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_REPAIR_ATTEMPTS;
use crate::llm::{CompletionClient, LlmError, call_function};
use crate::models::EditMode;
use crate::prompts::{self, RepairArgs};
use crate::scope::ScopeRegistry;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{filename} still fails to parse after {attempts} repair attempts: {error}")]
    Unrepaired {
        filename: String,
        attempts: usize,
        error: String,
    },

    #[error("repair request failed: {0}")]
    Llm(#[from] LlmError),
}

/// Splice `code` into `contents` at 1-based `line_start`.
///
/// Lines at or before 0 address the top of the file, lines past the end
/// append. Overwrite drops blank lines from `code` and replaces as many
/// existing lines as remain.
pub fn splice(contents: &str, mode: EditMode, code: &str, line_start: i64) -> String {
    let mut lines: Vec<&str> = contents.split('\n').collect();
    let at = usize::try_from(line_start.saturating_sub(1))
        .unwrap_or(0)
        .min(lines.len());

    let code_lines: Vec<&str> = match mode {
        EditMode::Insert => code.split('\n').collect(),
        EditMode::Overwrite => code.split('\n').filter(|l| !l.is_empty()).collect(),
    };
    let remove = match mode {
        EditMode::Insert => 0,
        EditMode::Overwrite => code_lines.len().min(lines.len() - at),
    };
    lines.splice(at..at + remove, code_lines);
    lines.join("\n")
}

/// Applies edits and repairs syntax errors they introduce.
#[derive(Clone)]
pub struct EditExecutor {
    client: Arc<dyn CompletionClient>,
    registry: ScopeRegistry,
    repair_attempts: usize,
}

impl EditExecutor {
    pub fn new(client: Arc<dyn CompletionClient>, registry: ScopeRegistry) -> Self {
        Self {
            client,
            registry,
            repair_attempts: DEFAULT_REPAIR_ATTEMPTS,
        }
    }

    pub fn with_repair_attempts(mut self, attempts: usize) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// The updated contents, validated when a parser exists for `filename`.
    pub async fn apply_edit(
        &self,
        mode: EditMode,
        filename: &str,
        contents: &str,
        code: &str,
        line_start: i64,
    ) -> Result<String, EditError> {
        let mut updated = splice(contents, mode, code, line_start);
        let Some(parser) = self.registry.for_filename(filename) else {
            debug!(file = %filename, "no parser registered, skipping validation");
            return Ok(updated);
        };

        let mut check = parser.validate_syntax(&updated);
        let mut attempt = 0;
        while !check.valid && attempt < self.repair_attempts {
            attempt += 1;
            let error = check.error.clone();
            warn!(file = %filename, attempt, error = %error, "edit left file unparsable, requesting repair");

            let repair: RepairArgs = call_function(
                self.client.as_ref(),
                prompts::repair_messages(&prompts::number_lines(&updated), &error),
                prompts::repair_function(),
                0.0,
            )
            .await?;
            updated = splice(&updated, repair.mode, &repair.code, repair.line_start);
            check = parser.validate_syntax(&updated);
        }

        if !check.valid {
            return Err(EditError::Unrepaired {
                filename: filename.to_string(),
                attempts: attempt,
                error: check.error,
            });
        }
        if attempt > 0 {
            info!(file = %filename, attempts = attempt, "edit repaired");
        }
        Ok(updated)
    }
}
