//! Prompt context for one changed file.
//!
//! Three strategies, from coarsest to richest:
//!
//! - **raw**: the patch as-is. Used for files without base contents.
//! - **expanded**: each hunk inside a window of the original file.
//! - **scoped**: each hunk spliced into the full text of its enclosing
//!   function or type declaration, with hunks sharing a scope combined.
//!
//! The scoped strategy degrades per hunk to expansion when no scope is
//! found, and per file when the patch does not apply or the file has no
//! registered parser.

pub mod hunks;

use indexmap::IndexMap;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::DEFAULT_CONTEXT_LINES;
use crate::diff::{DiffError, apply_patch, parse_patch};
use crate::models::diff::Hunk;
use crate::models::pr::PrFile;
use crate::scope::{EnclosingScope, ScopeError, ScopeKey, ScopeRegistry, SourceScopeParser};

/// Errors from the scoped strategy. All are recovered by falling back.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("patch does not apply to base contents: {0}")]
    Apply(#[from] DiffError),

    #[error("no hunks to combine")]
    EmptyCombination,
}

/// How a file's changes are rendered into the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContextStrategy {
    Raw,
    Expanded,
    #[default]
    Scoped,
}

/// Builds the `## <filename>` prompt section for a changed file.
#[derive(Debug, Clone)]
pub struct PatchContextBuilder {
    registry: ScopeRegistry,
    context_lines: usize,
}

impl Default for PatchContextBuilder {
    fn default() -> Self {
        Self::new(ScopeRegistry::default(), DEFAULT_CONTEXT_LINES)
    }
}

impl PatchContextBuilder {
    pub fn new(registry: ScopeRegistry, context_lines: usize) -> Self {
        Self {
            registry,
            context_lines,
        }
    }

    /// Render with the richest strategy available for the file.
    pub fn build_context(&self, file: &PrFile) -> String {
        self.build(file, ContextStrategy::Scoped)
    }

    /// Render with `strategy`, falling back to coarser ones as needed.
    pub fn build(&self, file: &PrFile, strategy: ContextStrategy) -> String {
        let Some(old) = file.old_contents.as_deref() else {
            return raw_patch_strategy(file);
        };
        match strategy {
            ContextStrategy::Raw => raw_patch_strategy(file),
            ContextStrategy::Expanded => expanded_patch_strategy(file, old, self.context_lines),
            ContextStrategy::Scoped => match self.registry.for_filename(&file.filename) {
                None => expanded_patch_strategy(file, old, self.context_lines),
                Some(parser) => match self.scoped_chunks(file, old, parser.as_ref()) {
                    Ok(chunks) => file_section(&file.filename, &chunks),
                    Err(e) => {
                        warn!(file = %file.filename, error = %e, "scoped context failed, expanding hunks");
                        expanded_patch_strategy(file, old, self.context_lines)
                    }
                },
            },
        }
    }

    /// Per-scope and per-fallback context chunks for one file.
    pub fn scoped_chunks(
        &self,
        file: &PrFile,
        old: &str,
        parser: &dyn SourceScopeParser,
    ) -> Result<Vec<String>, ContextError> {
        let patch = parse_patch(&file.patch);
        let updated = apply_patch(old, &patch)?;
        let updated_lines: Vec<&str> = updated.split('\n').collect();

        let arena = match parser.parse_scopes(&updated) {
            Ok(arena) => Some(arena),
            Err(e @ ScopeError::Language(_)) => {
                warn!(file = %file.filename, language = parser.language(), error = %e, "parser unavailable, expanding hunks");
                None
            }
            Err(e) => {
                debug!(file = %file.filename, error = %e, "scope parse failed");
                None
            }
        };

        let mut by_scope: IndexMap<ScopeKey, (EnclosingScope, Vec<Hunk>)> = IndexMap::new();
        let mut expand: Vec<Hunk> = Vec::new();

        for hunk in patch.hunks {
            let scope = arena.as_ref().and_then(|arena| {
                let (start, end) = hunks::query_range(&hunk)?;
                arena.enclosing(start, end)
            });
            match scope {
                Some(scope) => {
                    by_scope
                        .entry(scope.key())
                        .or_insert_with(|| (scope, Vec::new()))
                        .1
                        .push(hunk);
                }
                None => {
                    debug!(
                        file = %file.filename,
                        hunk = %hunk.range_header(),
                        "no enclosing scope, expanding hunk"
                    );
                    expand.push(hunk);
                }
            }
        }

        let mut chunks = Vec::with_capacity(by_scope.len() + expand.len());
        for (key, (scope, grouped)) in by_scope {
            debug!(file = %file.filename, scope = %key, hunks = grouped.len(), "combining hunks");
            let combined = hunks::combine_hunks(&updated_lines, grouped)?;
            chunks.push(hunks::inject_into_scope(&updated_lines, &scope, &combined));
        }

        let old_lines: Vec<&str> = old.split('\n').collect();
        chunks.extend(
            expand
                .iter()
                .map(|hunk| hunks::expand_hunk(&old_lines, hunk, self.context_lines)),
        );
        Ok(chunks)
    }
}

/// The patch text under the file header.
pub fn raw_patch_strategy(file: &PrFile) -> String {
    format!("## {}\n\n{}", file.filename, file.patch)
}

/// Every hunk inside a window of `old`.
pub fn expanded_patch_strategy(file: &PrFile, old: &str, context_lines: usize) -> String {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let chunks: Vec<String> = parse_patch(&file.patch)
        .hunks
        .iter()
        .map(|hunk| hunks::expand_hunk(&old_lines, hunk, context_lines))
        .collect();
    file_section(&file.filename, &chunks)
}

fn file_section(filename: &str, chunks: &[String]) -> String {
    format!("## {}\n\n{}", filename, chunks.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str, old: Option<&str>, patch: &str) -> PrFile {
        PrFile {
            old_contents: old.map(str::to_string),
            ..PrFile::new(name, patch)
        }
    }

    #[test]
    fn new_file_uses_raw_patch() {
        let f = file("src/new.ts", None, "@@ -0,0 +1 @@\n+export const a = 1;");
        assert_eq!(
            PatchContextBuilder::default().build_context(&f),
            "## src/new.ts\n\n@@ -0,0 +1 @@\n+export const a = 1;"
        );
    }

    #[test]
    fn unregistered_extension_expands() {
        let old = "a\nb\nc\n";
        let f = file("notes.md", Some(old), "@@ -2,1 +2,1 @@\n-b\n+B\n");
        let out = PatchContextBuilder::new(ScopeRegistry::default(), 1).build_context(&f);
        assert_eq!(out, "## notes.md\n\na\n@@ -2,1 +2,1 @@\n-b\n+B\nc");
    }

    #[test]
    fn patch_that_does_not_apply_falls_back_to_expansion() {
        let old = "const a = 1;\nconst b = 2;\n";
        let f = file("a.js", Some(old), "@@ -1,1 +1,1 @@\n-const z = 9;\n+const z = 10;\n");
        let out = PatchContextBuilder::new(ScopeRegistry::default(), 1).build_context(&f);
        assert_eq!(out, "## a.js\n\n@@ -1,1 +1,1 @@\n-const z = 9;\n+const z = 10;\nconst b = 2;");
    }

    #[test]
    fn top_level_change_is_expanded_and_scoped_change_injected() {
        let old = "const a = 1;\n\nfunction f() {\n  return 1;\n}\n";
        let patch = "@@ -1,1 +1,1 @@\n-const a = 1;\n+const a = 2;\n@@ -4,1 +4,1 @@\n-  return 1;\n+  return 2;\n";
        let f = file("a.js", Some(old), patch);
        let out = PatchContextBuilder::new(ScopeRegistry::default(), 1).build_context(&f);
        assert_eq!(
            out,
            "## a.js\n\n@@ -4,1 +4,1 @@\nfunction f() {\n-  return 1;\n+  return 2;\n}\n\n@@ -1,1 +1,1 @@\n-const a = 1;\n+const a = 2;\n"
        );
    }

    struct MissingGrammar;

    impl SourceScopeParser for MissingGrammar {
        fn language(&self) -> &'static str {
            "javascript"
        }

        fn parse_scopes(&self, _source: &str) -> Result<crate::scope::ScopeArena, ScopeError> {
            Err(ScopeError::Language("incompatible language version".to_string()))
        }

        fn validate_syntax(&self, _source: &str) -> crate::scope::SyntaxCheck {
            crate::scope::SyntaxCheck::failed("incompatible language version")
        }
    }

    #[test]
    fn unavailable_grammar_expands_every_hunk() {
        let old = "function f() {\n  return 1;\n}\n";
        let f = file("a.js", Some(old), "@@ -2,1 +2,1 @@\n-  return 1;\n+  return 2;\n");
        let mut registry = ScopeRegistry::empty();
        registry.register("js", std::sync::Arc::new(MissingGrammar));
        let builder = PatchContextBuilder::new(registry, 1);

        let chunks = builder.scoped_chunks(&f, old, &MissingGrammar).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            builder.build_context(&f),
            PatchContextBuilder::new(ScopeRegistry::empty(), 1).build(&f, ContextStrategy::Expanded)
        );
        assert_eq!(
            builder.build_context(&f),
            "## a.js\n\nfunction f() {\n@@ -2,1 +2,1 @@\n-  return 1;\n+  return 2;\n}"
        );
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("expanded".parse::<ContextStrategy>().unwrap(), ContextStrategy::Expanded);
        assert_eq!(ContextStrategy::default().to_string(), "scoped");
    }
}
