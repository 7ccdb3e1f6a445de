//! Stolyar engine: incremental, error-tolerant GLR parsing over persistent
//! reference-counted syntax trees.
//!
//! The pipeline: a [`stolyar_core::Language`] table drives the [`Parser`],
//! which lexes tokens (or reuses subtrees from a previous [`Tree`]), runs
//! them through a graph-structured stack, and assembles an immutable tree.
//! [`Tree::edit`] plus a re-parse gives cheap incremental updates;
//! [`Tree::changed_ranges`] reports what actually differs between two
//! revisions; [`Node`] and [`TreeCursor`] navigate without mutation.
//!
//! Erroneous input is never fatal: the parse always yields a tree with
//! embedded `ERROR`/missing nodes, because downstream tools need a
//! best-effort tree even for invalid source.

mod cursor;
mod error_costs;
mod external;
mod lexer;
mod node;
mod parser;
mod ranges;
mod reuse;
mod stack;
mod subtree;
mod tree;

#[cfg(test)]
mod engine_tests;

pub use cursor::{Preorder, TreeCursor};
pub use external::{ExternalMatch, ExternalScanner, ExternalState};
pub use node::Node;
pub use parser::{ParseError, Parser, RecoveryPolicy};
pub use tree::Tree;

pub use stolyar_core::{
    FieldId, GrammarTable, InputEdit, Language, LanguageError, Length, Point, Range, Symbol,
};
