//! The grammar table: a plain-data description of a compiled grammar.
//!
//! A table is what a grammar provider hands the engine: symbol metadata,
//! lexical rules for terminals, productions, and the LR parse states. Entries
//! may carry multiple actions per (state, terminal) pair — that is what makes
//! the table a GLR table rather than a plain LR one.
//!
//! Tables have two wire forms: human-readable JSON (`serde_json`) and a
//! compact binary encoding (`postcard`). Neither is consulted on the hot
//! path; `Language::from_table` digests a table into indexed form once.

use serde::{Deserialize, Serialize};

use crate::{FieldId, ProductionId, StateId, Symbol};

/// Metadata for one grammar symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    /// Named nodes appear in queries by name; anonymous ones by literal text.
    pub named: bool,
    /// Invisible symbols are expanded in place during tree traversal.
    pub visible: bool,
    pub terminal: bool,
    /// Extra symbols (comments and the like) may appear between any tokens.
    #[serde(default)]
    pub extra: bool,
    /// Keyword terminals are extracted through the word token at lex time.
    #[serde(default)]
    pub keyword: bool,
    /// External symbols are produced by the host-supplied scanner.
    #[serde(default)]
    pub external: bool,
}

/// How a terminal's text is recognized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexDef {
    /// Exact byte sequence.
    Literal(String),
    /// Anchored regular expression.
    Pattern(String),
}

/// Lexical rule for one terminal symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexRule {
    pub symbol: Symbol,
    pub def: LexDef,
    /// Tie-break between equal-length matches; higher wins.
    #[serde(default)]
    pub precedence: i32,
}

/// One production: `symbol -> <child_count children>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub symbol: Symbol,
    pub child_count: u16,
    /// Field assigned to each child slot. Empty means "no fields".
    #[serde(default)]
    pub field_slots: Vec<Option<FieldId>>,
    /// Bias when merging ambiguous parses; higher wins.
    #[serde(default)]
    pub dynamic_precedence: i32,
}

impl Production {
    /// Field for a structural child slot, if the production declares one.
    #[inline]
    pub fn field_for_slot(&self, slot: usize) -> Option<FieldId> {
        self.field_slots.get(slot).copied().flatten()
    }
}

/// A parse action for one (state, lookahead terminal) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseAction {
    Shift { state: StateId },
    /// Shift an extra token without leaving the current state.
    ShiftExtra,
    Reduce { production: ProductionId },
    Accept,
}

/// One LR parse state: terminal actions plus non-terminal gotos.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseState {
    /// Sorted by symbol. Multiple actions per terminal are GLR conflicts.
    pub actions: Vec<(Symbol, Vec<ParseAction>)>,
    /// Sorted by symbol.
    pub gotos: Vec<(Symbol, StateId)>,
    /// Whether the external scanner must be consulted in this state.
    #[serde(default)]
    pub external: bool,
}

impl ParseState {
    pub fn actions_for(&self, symbol: Symbol) -> &[ParseAction] {
        match self.actions.binary_search_by_key(&symbol, |(s, _)| *s) {
            Ok(idx) => &self.actions[idx].1,
            Err(_) => &[],
        }
    }

    pub fn goto_for(&self, symbol: Symbol) -> Option<StateId> {
        self.gotos
            .binary_search_by_key(&symbol, |(s, _)| *s)
            .ok()
            .map(|idx| self.gotos[idx].1)
    }
}

/// Errors decoding a serialized grammar table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid grammar table json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid grammar table bytes: {0}")]
    Binary(#[from] postcard::Error),
}

/// A complete compiled grammar, as plain data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrammarTable {
    pub name: String,
    /// Symbol 0 must be the end-of-input sentinel.
    pub symbols: Vec<SymbolInfo>,
    /// Field names; `FieldId` `n` names `fields[n - 1]`.
    #[serde(default)]
    pub fields: Vec<String>,
    pub productions: Vec<Production>,
    /// State 0 is the reserved error-recovery state.
    pub states: Vec<ParseState>,
    pub start_state: StateId,
    pub lexical: Vec<LexRule>,
    /// Leading-trivia pattern, absorbed as token padding. `None` disables
    /// trivia skipping entirely.
    #[serde(default)]
    pub trivia_pattern: Option<String>,
    /// The identifier-shaped token keywords are extracted through.
    #[serde(default)]
    pub word_token: Option<Symbol>,
    /// External scanner symbols, in the scanner's own indexing order.
    #[serde(default)]
    pub external_symbols: Vec<Symbol>,
}

impl GrammarTable {
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, TableError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TableError> {
        Ok(postcard::to_allocvec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_table() -> GrammarTable {
        GrammarTable {
            name: "tiny".to_string(),
            symbols: vec![
                SymbolInfo {
                    name: "end".to_string(),
                    named: false,
                    visible: false,
                    terminal: true,
                    extra: false,
                    keyword: false,
                    external: false,
                },
                SymbolInfo {
                    name: "word".to_string(),
                    named: true,
                    visible: true,
                    terminal: true,
                    extra: false,
                    keyword: false,
                    external: false,
                },
                SymbolInfo {
                    name: "doc".to_string(),
                    named: true,
                    visible: true,
                    terminal: false,
                    extra: false,
                    keyword: false,
                    external: false,
                },
            ],
            fields: vec![],
            productions: vec![Production {
                symbol: 2,
                child_count: 1,
                field_slots: vec![],
                dynamic_precedence: 0,
            }],
            states: vec![
                ParseState::default(),
                ParseState {
                    actions: vec![(1, vec![ParseAction::Shift { state: 2 }])],
                    gotos: vec![(2, 3)],
                    external: false,
                },
                ParseState {
                    actions: vec![(0, vec![ParseAction::Reduce { production: 0 }])],
                    gotos: vec![],
                    external: false,
                },
                ParseState {
                    actions: vec![(0, vec![ParseAction::Accept])],
                    gotos: vec![],
                    external: false,
                },
            ],
            start_state: 1,
            lexical: vec![LexRule {
                symbol: 1,
                def: LexDef::Pattern("[a-z]+".to_string()),
                precedence: 0,
            }],
            trivia_pattern: Some("[ \\t\\r\\n]+".to_string()),
            word_token: None,
            external_symbols: vec![],
        }
    }

    #[test]
    fn json_roundtrip() {
        let table = tiny_table();
        let json = table.to_json().unwrap();
        let back = GrammarTable::from_json(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn binary_roundtrip() {
        let table = tiny_table();
        let bytes = table.to_bytes().unwrap();
        let back = GrammarTable::from_bytes(&bytes).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn actions_for_missing_symbol_is_empty() {
        let table = tiny_table();
        assert!(table.states[1].actions_for(7).is_empty());
        assert_eq!(table.states[1].goto_for(2), Some(3));
    }
}
