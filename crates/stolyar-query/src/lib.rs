//! Tree-shaped pattern queries over Stolyar syntax trees.
//!
//! A [`Query`] compiles an S-expression pattern description against a
//! [`Language`] once; matching it against a [`Tree`] yields
//! [`QueryMatch`]es in pre-order, each carrying its named captures.
//!
//! ```text
//! (call_expression function: (identifier) @fn (#eq? @fn "foo"))
//! ```
//!
//! Supported syntax: named nodes `(kind ...)`, anonymous literals `"..."`,
//! wildcards `_` / `(_)`, field constraints `field: ...`, captures `@name`,
//! quantifiers `?` `*` `+`, and the text predicates `#eq?`, `#not-eq?`,
//! `#match?`, `#not-match?`. Malformed patterns fail at compile time with a
//! byte offset — never at match time.

use stolyar_core::Language;
use stolyar_engine::{Node, Tree};

mod exec;
mod lexer;
mod parse;
mod pattern;

#[cfg(test)]
mod query_tests;

/// Errors compiling a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unexpected token at byte {offset}")]
    UnexpectedToken { offset: usize },

    #[error("unexpected end of query")]
    UnexpectedEnd,

    #[error("unknown node kind {name:?} at byte {offset}")]
    UnknownNodeKind { name: String, offset: usize },

    #[error("unknown field {name:?} at byte {offset}")]
    UnknownField { name: String, offset: usize },

    #[error("unknown predicate {name:?} at byte {offset}")]
    UnknownPredicate { name: String, offset: usize },

    #[error("predicate references undefined capture {name:?} at byte {offset}")]
    CaptureNotFound { name: String, offset: usize },

    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// One capture inside a match.
#[derive(Clone, Copy, Debug)]
pub struct QueryCapture<'t> {
    /// Index into [`Query::capture_names`].
    pub index: u32,
    pub node: Node<'t>,
}

/// A successful match of one pattern.
#[derive(Clone, Debug)]
pub struct QueryMatch<'t> {
    pub pattern_index: usize,
    /// Captures in the order the pattern bound them.
    pub captures: Vec<QueryCapture<'t>>,
}

impl<'t> QueryMatch<'t> {
    /// Nodes captured under a given capture index, in match order.
    pub fn nodes_for_capture(&self, index: u32) -> impl Iterator<Item = Node<'t>> + '_ {
        self.captures
            .iter()
            .filter(move |capture| capture.index == index)
            .map(|capture| capture.node)
    }
}

/// A compiled query: one or more patterns plus their predicates.
#[derive(Debug)]
pub struct Query {
    patterns: Vec<pattern::PatternData>,
    capture_names: Vec<String>,
}

impl Query {
    /// Compile `source` against `language`.
    pub fn new(language: &Language, source: &str) -> Result<Self, QueryError> {
        let output = parse::parse_query(language, source)?;
        Ok(Self {
            patterns: output.patterns,
            capture_names: output.capture_names.into_iter().collect(),
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Capture names in declaration order; `QueryCapture::index` indexes
    /// this slice.
    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    pub fn capture_index(&self, name: &str) -> Option<u32> {
        self.capture_names
            .iter()
            .position(|n| n == name)
            .map(|idx| idx as u32)
    }

    /// All matches under `node`, in pre-order. `source` is the text the
    /// tree was parsed from; predicates evaluate against it.
    pub fn matches<'t>(&self, node: Node<'t>, source: &str) -> Vec<QueryMatch<'t>> {
        exec::matches_in(&self.patterns, node, source)
    }

    /// Convenience: matches over a whole tree.
    pub fn tree_matches<'t>(&self, tree: &'t Tree, source: &str) -> Vec<QueryMatch<'t>> {
        self.matches(tree.root_node(), source)
    }
}
