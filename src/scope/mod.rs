//! Source scope lookup: which function or type declaration encloses a line range.
//!
//! A [`SourceScopeParser`] turns source text into a [`ScopeArena`], a flat
//! pre-order list of scope-bearing nodes. Queries against the arena pick the
//! outermost scope that fully contains a line range.

pub mod javascript;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use javascript::{Dialect, JavaScriptScopeParser};

/// Errors from scope parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("failed to configure parser: {0}")]
    Language(String),

    #[error("parser produced no tree")]
    NoTree,

    #[error("{0}")]
    Syntax(String),
}

/// Index of a scope inside its [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

/// A scope-bearing syntax node, reduced to its 1-based inclusive line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeNode {
    pub kind: &'static str,
    pub start_line: usize,
    pub end_line: usize,
    pub parent: Option<ScopeId>,
}

impl ScopeNode {
    pub fn size(&self) -> usize {
        self.end_line - self.start_line
    }

    pub fn contains(&self, line_start: usize, line_end: usize) -> bool {
        self.start_line <= line_start && line_end <= self.end_line
    }
}

/// All scopes of one parsed source file, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeArena {
    nodes: Vec<ScopeNode>,
}

impl ScopeArena {
    pub fn push(&mut self, node: ScopeNode) -> ScopeId {
        self.nodes.push(node);
        ScopeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.nodes.get(id.0)
    }

    /// The largest scope containing `[line_start, line_end]`.
    ///
    /// Only a strictly larger scope replaces the current pick, so the first
    /// of equal-sized candidates wins and a single-line scope is never
    /// selected.
    pub fn enclosing(&self, line_start: usize, line_end: usize) -> Option<EnclosingScope> {
        let mut largest = 0;
        let mut best = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if node.contains(line_start, line_end) && node.size() > largest {
                largest = node.size();
                best = Some(EnclosingScope {
                    id: ScopeId(index),
                    kind: node.kind,
                    start_line: node.start_line,
                    end_line: node.end_line,
                });
            }
        }
        best
    }
}

/// The scope chosen for a line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnclosingScope {
    pub id: ScopeId,
    pub kind: &'static str,
    pub start_line: usize,
    pub end_line: usize,
}

impl EnclosingScope {
    pub fn key(&self) -> ScopeKey {
        ScopeKey {
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

/// Identity of a scope by its line range. Hunks with equal keys are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub start_line: usize,
    pub end_line: usize,
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start_line, self.end_line)
    }
}

/// Result of a syntax dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxCheck {
    pub valid: bool,
    /// The parser's error message; empty when valid.
    pub error: String,
}

impl SyntaxCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: error.into(),
        }
    }
}

/// A single-language parser answering scope and syntax queries.
pub trait SourceScopeParser: Send + Sync {
    /// Short language name for logs.
    fn language(&self) -> &'static str;

    /// Parse `source` and collect every scope-bearing node.
    ///
    /// Sources with syntax errors are rejected so callers fall back to
    /// line-window context.
    fn parse_scopes(&self, source: &str) -> Result<ScopeArena, ScopeError>;

    /// Parse `source` and report whether it is syntactically valid.
    fn validate_syntax(&self, source: &str) -> SyntaxCheck;

    /// Outermost scope fully containing the 1-based line range.
    fn find_enclosing_scope(
        &self,
        source: &str,
        line_start: usize,
        line_end: usize,
    ) -> Result<Option<EnclosingScope>, ScopeError> {
        Ok(self.parse_scopes(source)?.enclosing(line_start, line_end))
    }
}

/// Maps lowercase file extensions to parsers.
#[derive(Clone)]
pub struct ScopeRegistry {
    parsers: HashMap<String, Arc<dyn SourceScopeParser>>,
}

impl ScopeRegistry {
    /// A registry with no parsers; every file uses line-window context.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, parser: Arc<dyn SourceScopeParser>) {
        self.parsers.insert(extension.to_lowercase(), parser);
    }

    /// Parser for a bare extension such as `"ts"`.
    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn SourceScopeParser>> {
        self.parsers.get(&extension.to_lowercase()).cloned()
    }

    /// Parser for a filename, looked up by its extension.
    pub fn for_filename(&self, filename: &str) -> Option<Arc<dyn SourceScopeParser>> {
        let name = filename.rsplit('/').next().unwrap_or(filename);
        let (_, ext) = name.rsplit_once('.')?;
        self.for_extension(ext)
    }
}

impl Default for ScopeRegistry {
    /// JavaScript and TypeScript family parsers.
    fn default() -> Self {
        let mut registry = Self::empty();
        let js: Arc<dyn SourceScopeParser> = Arc::new(JavaScriptScopeParser::new(Dialect::JavaScript));
        let ts: Arc<dyn SourceScopeParser> = Arc::new(JavaScriptScopeParser::new(Dialect::TypeScript));
        let tsx: Arc<dyn SourceScopeParser> = Arc::new(JavaScriptScopeParser::new(Dialect::Tsx));
        for ext in ["js", "jsx", "mjs", "cjs"] {
            registry.register(ext, Arc::clone(&js));
        }
        for ext in ["ts", "mts", "cts"] {
            registry.register(ext, Arc::clone(&ts));
        }
        registry.register("tsx", tsx);
        registry
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<&String> = self.parsers.keys().collect();
        extensions.sort();
        f.debug_struct("ScopeRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(start_line: usize, end_line: usize) -> ScopeNode {
        ScopeNode {
            kind: "function_declaration",
            start_line,
            end_line,
            parent: None,
        }
    }

    #[test]
    fn outermost_containing_scope_wins() {
        let mut arena = ScopeArena::default();
        let outer = arena.push(node(1, 30));
        arena.push(ScopeNode {
            parent: Some(outer),
            ..node(5, 10)
        });
        let found = arena.enclosing(6, 7).unwrap();
        assert_eq!(found.key(), ScopeKey { start_line: 1, end_line: 30 });
    }

    #[test]
    fn equal_sizes_keep_first() {
        let mut arena = ScopeArena::default();
        arena.push(node(1, 10));
        arena.push(node(1, 10));
        assert_eq!(arena.enclosing(2, 3).unwrap().id, ScopeId(0));
    }

    #[test]
    fn partial_overlap_is_not_containment() {
        let mut arena = ScopeArena::default();
        arena.push(node(5, 10));
        assert!(arena.enclosing(8, 12).is_none());
        assert!(arena.enclosing(1, 2).is_none());
    }

    #[test]
    fn single_line_scope_never_selected() {
        let mut arena = ScopeArena::default();
        arena.push(node(4, 4));
        assert!(arena.enclosing(4, 4).is_none());
    }

    #[test]
    fn scope_key_display() {
        assert_eq!(ScopeKey { start_line: 5, end_line: 20 }.to_string(), "5 -> 20");
    }

    #[test]
    fn registry_looks_up_by_filename() {
        let registry = ScopeRegistry::default();
        assert_eq!(registry.for_filename("src/App.TSX").unwrap().language(), "tsx");
        assert_eq!(registry.for_filename("lib/util.mjs").unwrap().language(), "javascript");
        assert!(registry.for_filename("main.rs").is_none());
        assert!(registry.for_filename("Makefile").is_none());
        assert!(ScopeRegistry::empty().for_extension("ts").is_none());
    }
}
