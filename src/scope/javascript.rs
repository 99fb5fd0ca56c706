//! Tree-sitter backed scope parser for JavaScript, TypeScript and TSX.

use std::cell::RefCell;

use tree_sitter::{Language, Node, Parser, Tree, TreeCursor};

use super::{ScopeArena, ScopeError, ScopeId, ScopeNode, SourceScopeParser, SyntaxCheck};

/// Function-like nodes plus interface and type declarations.
const SCOPE_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
    "interface_declaration",
    "type_alias_declaration",
];

// Parsers are reused per thread. A grammar that fails to load is kept as
// its error and reported on every parse.
thread_local! {
    static JS_PARSER: RefCell<Result<Parser, ScopeError>> =
        RefCell::new(configured_parser(&tree_sitter_javascript::LANGUAGE.into()));

    static TS_PARSER: RefCell<Result<Parser, ScopeError>> =
        RefCell::new(configured_parser(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()));

    static TSX_PARSER: RefCell<Result<Parser, ScopeError>> =
        RefCell::new(configured_parser(&tree_sitter_typescript::LANGUAGE_TSX.into()));
}

fn configured_parser(language: &Language) -> Result<Parser, ScopeError> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| ScopeError::Language(e.to_string()))?;
    Ok(parser)
}

fn parse_with(slot: &RefCell<Result<Parser, ScopeError>>, source: &str) -> Result<Tree, ScopeError> {
    let mut slot = slot.borrow_mut();
    let parser = slot.as_mut().map_err(|e| e.clone())?;
    parser.parse(source, None).ok_or(ScopeError::NoTree)
}

/// Which grammar of the family to parse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

#[derive(Debug, Clone, Copy)]
pub struct JavaScriptScopeParser {
    dialect: Dialect,
}

impl JavaScriptScopeParser {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    fn parse(&self, source: &str) -> Result<Tree, ScopeError> {
        match self.dialect {
            Dialect::JavaScript => JS_PARSER.with(|slot| parse_with(slot, source)),
            Dialect::TypeScript => TS_PARSER.with(|slot| parse_with(slot, source)),
            Dialect::Tsx => TSX_PARSER.with(|slot| parse_with(slot, source)),
        }
    }
}

impl SourceScopeParser for JavaScriptScopeParser {
    fn language(&self) -> &'static str {
        match self.dialect {
            Dialect::JavaScript => "javascript",
            Dialect::TypeScript => "typescript",
            Dialect::Tsx => "tsx",
        }
    }

    fn parse_scopes(&self, source: &str) -> Result<ScopeArena, ScopeError> {
        let tree = self.parse(source)?;
        let root = tree.root_node();
        if let Some(error) = first_error(root) {
            return Err(ScopeError::Syntax(describe_error(error, source)));
        }

        let mut arena = ScopeArena::default();
        let mut cursor = root.walk();
        collect_scopes(&mut cursor, None, &mut arena);
        Ok(arena)
    }

    fn validate_syntax(&self, source: &str) -> SyntaxCheck {
        let tree = match self.parse(source) {
            Ok(tree) => tree,
            Err(e) => return SyntaxCheck::failed(e.to_string()),
        };
        match first_error(tree.root_node()) {
            Some(error) => SyntaxCheck::failed(describe_error(error, source)),
            None => SyntaxCheck::ok(),
        }
    }
}

/// Pre-order walk recording every scope node with its nearest scope parent.
fn collect_scopes(cursor: &mut TreeCursor, parent: Option<ScopeId>, arena: &mut ScopeArena) {
    loop {
        let node = cursor.node();
        let mut inner_parent = parent;
        if let Some(kind) = SCOPE_KINDS.iter().copied().find(|k| *k == node.kind()) {
            let id = arena.push(ScopeNode {
                kind,
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                parent,
            });
            inner_parent = Some(id);
        }

        if cursor.goto_first_child() {
            collect_scopes(cursor, inner_parent, arena);
            cursor.goto_parent();
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

/// First ERROR or MISSING node in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

fn describe_error(node: Node<'_>, source: &str) -> String {
    let pos = node.start_position();
    let (line, column) = (pos.row + 1, pos.column + 1);
    if node.is_missing() {
        return format!("Missing {} at line {line}, column {column}", node.kind());
    }
    let snippet: String = node
        .utf8_text(source.as_bytes())
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(40)
        .collect();
    format!("Unexpected token at line {line}, column {column}: {snippet:?}")
}
