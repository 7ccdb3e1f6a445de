//! Core data model for Stolyar.
//!
//! Two layers:
//! - **Table layer**: `GrammarTable`, a plain serde-loadable description of a
//!   compiled grammar (symbols, lexical rules, productions, parse states).
//! - **Language layer**: `Language`, the validated form with indexed lookups,
//!   compiled lexical DFAs, and interned lex modes. Built once per grammar,
//!   immutable and cheaply cloneable for the lifetime of the process.
//!
//! The parsing engine itself lives in `stolyar-engine`; this crate only
//! defines the data that flows between a grammar provider and the engine.

use std::num::NonZeroU16;

mod edit;
mod grammar;
mod language;
mod points;

pub use edit::{InputEdit, Range};
pub use grammar::{
    GrammarTable, LexDef, LexRule, ParseAction, ParseState, Production, SymbolInfo, TableError,
};
pub use language::{Language, LanguageError, LexMode};
pub use points::{Length, Point};

/// Grammar symbol id. Terminals and non-terminals share one numbering.
pub type Symbol = u16;

/// Parse state id. State `0` is the reserved error-recovery state.
pub type StateId = u16;

/// Production id, indexing into the grammar table's production list.
pub type ProductionId = u16;

/// Field id. Zero is reserved, so field ids are `NonZeroU16` (field `n`
/// names the grammar table's `fields[n - 1]`).
pub type FieldId = NonZeroU16;

/// End-of-input sentinel symbol. Grammar tables must reserve symbol 0 for it.
pub const SYM_END: Symbol = 0;

/// Builtin error symbol, used for error nodes produced by recovery.
pub const SYM_ERROR: Symbol = u16::MAX;

/// Builtin symbol used while an error node is being grown during recovery.
pub const SYM_ERROR_REPEAT: Symbol = u16::MAX - 1;

/// The reserved error-recovery parse state.
pub const ERROR_STATE: StateId = 0;

/// Sentinel for "no parse state" (internal nodes, recovery tokens).
pub const STATE_NONE: StateId = u16::MAX;
