//! The validated, indexed form of a grammar table.
//!
//! `Language::from_table` digests a `GrammarTable` once: it checks every
//! cross-reference, compiles terminal patterns into anchored DFAs, interns
//! per-state *lex modes* (two states share a lex mode iff they accept the
//! same terminal and external sets — the token-reuse check during
//! incremental parsing compares lex modes, not raw states), and builds the
//! keyword table. A `Language` is immutable and cheap to clone.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use regex_automata::dfa::{Automaton, StartKind, dense};
use regex_automata::{Anchored, Input};
use tracing::debug;

use crate::grammar::{GrammarTable, LexDef, ParseAction, Production, SymbolInfo};
use crate::{ERROR_STATE, FieldId, ProductionId, StateId, SYM_END, SYM_ERROR, SYM_ERROR_REPEAT, Symbol};

/// Interned lex-context id for a parse state.
pub type LexMode = u16;

const SHIFT_EXTRA_ACTIONS: &[ParseAction] = &[ParseAction::ShiftExtra];

/// Errors detected while validating a grammar table.
#[derive(Debug, thiserror::Error)]
pub enum LanguageError {
    /// The table has no symbols or no states.
    #[error("grammar table is empty")]
    Empty,

    /// Symbol 0 must be the end-of-input terminal.
    #[error("symbol 0 must be the end-of-input terminal")]
    BadEndSentinel,

    #[error("start state {0} is out of range or reserved")]
    BadStartState(StateId),

    #[error("symbol {symbol} out of range ({context})")]
    SymbolOutOfRange { symbol: Symbol, context: &'static str },

    #[error("state {state} out of range ({context})")]
    StateOutOfRange { state: StateId, context: &'static str },

    #[error("production {0} out of range")]
    ProductionOutOfRange(ProductionId),

    #[error("production {production} has {slots} field slots for {children} children")]
    FieldSlotMismatch {
        production: usize,
        slots: usize,
        children: u16,
    },

    #[error("field id {0} out of range")]
    FieldOutOfRange(u16),

    #[error("terminal {0} has more than one lexical rule")]
    DuplicateLexRule(Symbol),

    #[error("terminal {0} has no lexical rule")]
    MissingLexRule(Symbol),

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("keyword {0} is not a literal matched by the word token")]
    InvalidKeyword(Symbol),

    #[error("word token {0} is not a pattern terminal")]
    InvalidWordToken(Symbol),

    #[error("external symbol {0} is not flagged external")]
    InvalidExternal(Symbol),
}

enum TokenMatcher {
    Literal(String),
    Dfa(dense::DFA<Vec<u32>>),
}

struct LanguageData {
    table: GrammarTable,
    /// Indexed by symbol.
    matchers: Vec<Option<TokenMatcher>>,
    /// Tie-break precedence per symbol, parallel to `matchers`.
    lex_precedence: Vec<i32>,
    trivia: Option<dense::DFA<Vec<u32>>>,
    /// Indexed by state.
    lex_modes: Vec<LexMode>,
    /// Terminals with explicit actions, per state, sorted.
    valid_terminals: Vec<Vec<Symbol>>,
    /// Terminal symbols flagged extra.
    extras: Vec<Symbol>,
    keywords: IndexMap<String, Symbol>,
    external_index: IndexMap<Symbol, u16>,
}

/// A compiled grammar, ready to drive the engine. Cheap to clone.
#[derive(Clone)]
pub struct Language {
    data: Arc<LanguageData>,
}

fn compile_dfa(pattern: &str) -> Result<dense::DFA<Vec<u32>>, LanguageError> {
    dense::Builder::new()
        .configure(dense::Config::new().start_kind(StartKind::Anchored))
        .build(pattern)
        .map_err(|err| LanguageError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

fn anchored_match_end(dfa: &dense::DFA<Vec<u32>>, text: &str, start: usize) -> Option<u32> {
    let input = Input::new(text).range(start..).anchored(Anchored::Yes);
    match dfa.try_search_fwd(&input) {
        Ok(Some(half)) => Some(half.offset() as u32),
        _ => None,
    }
}

impl Language {
    /// Validate and index a grammar table.
    pub fn from_table(table: GrammarTable) -> Result<Self, LanguageError> {
        if table.symbols.is_empty() || table.states.is_empty() {
            return Err(LanguageError::Empty);
        }
        let end = &table.symbols[SYM_END as usize];
        if !end.terminal || end.visible {
            return Err(LanguageError::BadEndSentinel);
        }
        let state_count = table.states.len() as u32;
        if table.start_state == ERROR_STATE || u32::from(table.start_state) >= state_count {
            return Err(LanguageError::BadStartState(table.start_state));
        }

        let symbol_in_range = |symbol: Symbol| (symbol as usize) < table.symbols.len();

        // Productions.
        for (idx, prod) in table.productions.iter().enumerate() {
            if !symbol_in_range(prod.symbol) {
                return Err(LanguageError::SymbolOutOfRange {
                    symbol: prod.symbol,
                    context: "production symbol",
                });
            }
            if !prod.field_slots.is_empty() && prod.field_slots.len() != prod.child_count as usize {
                return Err(LanguageError::FieldSlotMismatch {
                    production: idx,
                    slots: prod.field_slots.len(),
                    children: prod.child_count,
                });
            }
            for field in prod.field_slots.iter().flatten() {
                if field.get() as usize > table.fields.len() {
                    return Err(LanguageError::FieldOutOfRange(field.get()));
                }
            }
        }

        // States.
        for state in &table.states {
            for (symbol, actions) in &state.actions {
                if !symbol_in_range(*symbol) {
                    return Err(LanguageError::SymbolOutOfRange {
                        symbol: *symbol,
                        context: "state action",
                    });
                }
                for action in actions {
                    match *action {
                        ParseAction::Shift { state } => {
                            if u32::from(state) >= state_count {
                                return Err(LanguageError::StateOutOfRange {
                                    state,
                                    context: "shift target",
                                });
                            }
                        }
                        ParseAction::Reduce { production } => {
                            if production as usize >= table.productions.len() {
                                return Err(LanguageError::ProductionOutOfRange(production));
                            }
                        }
                        ParseAction::ShiftExtra | ParseAction::Accept => {}
                    }
                }
            }
            for (symbol, target) in &state.gotos {
                if !symbol_in_range(*symbol) {
                    return Err(LanguageError::SymbolOutOfRange {
                        symbol: *symbol,
                        context: "goto symbol",
                    });
                }
                if u32::from(*target) >= state_count {
                    return Err(LanguageError::StateOutOfRange {
                        state: *target,
                        context: "goto target",
                    });
                }
            }
        }

        // Lexical rules.
        let mut matchers: Vec<Option<TokenMatcher>> = Vec::new();
        matchers.resize_with(table.symbols.len(), || None);
        let mut lex_precedence = vec![0i32; table.symbols.len()];
        for rule in &table.lexical {
            if !symbol_in_range(rule.symbol) {
                return Err(LanguageError::SymbolOutOfRange {
                    symbol: rule.symbol,
                    context: "lexical rule",
                });
            }
            let slot = &mut matchers[rule.symbol as usize];
            if slot.is_some() {
                return Err(LanguageError::DuplicateLexRule(rule.symbol));
            }
            *slot = Some(match &rule.def {
                LexDef::Literal(text) => TokenMatcher::Literal(text.clone()),
                LexDef::Pattern(pattern) => TokenMatcher::Dfa(compile_dfa(pattern)?),
            });
            lex_precedence[rule.symbol as usize] = rule.precedence;
        }
        for (idx, info) in table.symbols.iter().enumerate() {
            let symbol = idx as Symbol;
            if symbol == SYM_END || !info.terminal || info.external {
                continue;
            }
            if matchers[idx].is_none() {
                return Err(LanguageError::MissingLexRule(symbol));
            }
        }

        let trivia = match &table.trivia_pattern {
            Some(pattern) => Some(compile_dfa(pattern)?),
            None => None,
        };

        // Word token and keywords.
        let word_dfa = match table.word_token {
            Some(word) => match matchers.get(word as usize).and_then(|m| m.as_ref()) {
                Some(TokenMatcher::Dfa(dfa)) => Some(dfa),
                _ => return Err(LanguageError::InvalidWordToken(word)),
            },
            None => None,
        };
        let mut keywords = IndexMap::new();
        for (idx, info) in table.symbols.iter().enumerate() {
            if !info.keyword {
                continue;
            }
            let symbol = idx as Symbol;
            let (Some(word_dfa), Some(TokenMatcher::Literal(text))) =
                (word_dfa, matchers[idx].as_ref())
            else {
                return Err(LanguageError::InvalidKeyword(symbol));
            };
            if anchored_match_end(word_dfa, text, 0) != Some(text.len() as u32) {
                return Err(LanguageError::InvalidKeyword(symbol));
            }
            keywords.insert(text.clone(), symbol);
        }

        // Externals.
        let mut external_index = IndexMap::new();
        for (idx, symbol) in table.external_symbols.iter().enumerate() {
            if !symbol_in_range(*symbol) || !table.symbols[*symbol as usize].external {
                return Err(LanguageError::InvalidExternal(*symbol));
            }
            external_index.insert(*symbol, idx as u16);
        }

        // Per-state terminal sets and interned lex modes.
        let mut valid_terminals = Vec::with_capacity(table.states.len());
        let mut mode_keys: IndexSet<(Vec<Symbol>, bool)> = IndexSet::new();
        let mut lex_modes = Vec::with_capacity(table.states.len());
        for state in &table.states {
            let mut terminals: Vec<Symbol> = state
                .actions
                .iter()
                .map(|(symbol, _)| *symbol)
                .filter(|symbol| table.symbols[*symbol as usize].terminal)
                .collect();
            terminals.sort_unstable();
            let (mode, _) = mode_keys.insert_full((terminals.clone(), state.external));
            lex_modes.push(mode as LexMode);
            valid_terminals.push(terminals);
        }

        let extras: Vec<Symbol> = table
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, info)| info.extra && info.terminal)
            .map(|(idx, _)| idx as Symbol)
            .collect();

        debug!(
            name = %table.name,
            symbols = table.symbols.len(),
            states = table.states.len(),
            lex_modes = mode_keys.len(),
            "language compiled"
        );

        Ok(Self {
            data: Arc::new(LanguageData {
                table,
                matchers,
                lex_precedence,
                trivia,
                lex_modes,
                valid_terminals,
                extras,
                keywords,
                external_index,
            }),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.data.table.name
    }

    #[inline]
    pub fn start_state(&self) -> StateId {
        self.data.table.start_state
    }

    #[inline]
    pub fn state_count(&self) -> usize {
        self.data.table.states.len()
    }

    #[inline]
    pub fn symbol_count(&self) -> usize {
        self.data.table.symbols.len()
    }

    pub fn symbol_info(&self, symbol: Symbol) -> Option<&SymbolInfo> {
        self.data.table.symbols.get(symbol as usize)
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        match symbol {
            SYM_ERROR => "ERROR",
            SYM_ERROR_REPEAT => "_error_repeat",
            _ => self
                .symbol_info(symbol)
                .map(|info| info.name.as_str())
                .unwrap_or("<invalid>"),
        }
    }

    pub fn symbol_for_name(&self, name: &str, named: bool) -> Option<Symbol> {
        if name == "ERROR" && named {
            return Some(SYM_ERROR);
        }
        self.data
            .table
            .symbols
            .iter()
            .position(|info| info.name == name && info.named == named)
            .map(|idx| idx as Symbol)
    }

    pub fn is_named(&self, symbol: Symbol) -> bool {
        match symbol {
            SYM_ERROR => true,
            SYM_ERROR_REPEAT => false,
            _ => self.symbol_info(symbol).is_some_and(|info| info.named),
        }
    }

    pub fn is_visible(&self, symbol: Symbol) -> bool {
        match symbol {
            SYM_ERROR => true,
            SYM_ERROR_REPEAT => false,
            _ => self.symbol_info(symbol).is_some_and(|info| info.visible),
        }
    }

    pub fn is_extra(&self, symbol: Symbol) -> bool {
        self.symbol_info(symbol).is_some_and(|info| info.extra)
    }

    pub fn is_terminal(&self, symbol: Symbol) -> bool {
        symbol == SYM_ERROR || self.symbol_info(symbol).is_some_and(|info| info.terminal)
    }

    pub fn is_keyword(&self, symbol: Symbol) -> bool {
        self.symbol_info(symbol).is_some_and(|info| info.keyword)
    }

    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.data
            .table
            .fields
            .get(field.get() as usize - 1)
            .map(String::as_str)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.data
            .table
            .fields
            .iter()
            .position(|field| field == name)
            .and_then(|idx| FieldId::new(idx as u16 + 1))
    }

    pub fn production(&self, production: ProductionId) -> &Production {
        &self.data.table.productions[production as usize]
    }

    /// Actions for a lookahead terminal. Extras with no explicit entry fall
    /// back to a shift-extra action, so extras are acceptable everywhere.
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        let explicit = self.data.table.states[state as usize].actions_for(symbol);
        if explicit.is_empty() && self.is_extra(symbol) {
            return SHIFT_EXTRA_ACTIONS;
        }
        explicit
    }

    pub fn goto_state(&self, state: StateId, symbol: Symbol) -> Option<StateId> {
        self.data.table.states[state as usize].goto_for(symbol)
    }

    /// Terminals with explicit actions in a state, sorted.
    pub fn valid_terminals(&self, state: StateId) -> &[Symbol] {
        &self.data.valid_terminals[state as usize]
    }

    pub fn extras(&self) -> &[Symbol] {
        &self.data.extras
    }

    pub fn lex_mode(&self, state: StateId) -> LexMode {
        self.data.lex_modes[state as usize]
    }

    pub fn has_external_tokens(&self, state: StateId) -> bool {
        self.data.table.states[state as usize].external
    }

    pub fn external_symbols(&self) -> &[Symbol] {
        &self.data.table.external_symbols
    }

    pub fn external_index(&self, symbol: Symbol) -> Option<u16> {
        self.data.external_index.get(&symbol).copied()
    }

    pub fn word_token(&self) -> Option<Symbol> {
        self.data.table.word_token
    }

    pub fn keyword_for_text(&self, text: &str) -> Option<Symbol> {
        self.data.keywords.get(text).copied()
    }

    /// All terminals that have a lexical rule (used for recovery lexing).
    pub fn lexable_terminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.data
            .matchers
            .iter()
            .enumerate()
            .filter(|(_, matcher)| matcher.is_some())
            .map(|(idx, _)| idx as Symbol)
    }

    pub fn lex_precedence(&self, symbol: Symbol) -> i32 {
        self.data
            .lex_precedence
            .get(symbol as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Match a terminal at `start`, returning the end offset of the match.
    pub fn lex_match(&self, symbol: Symbol, text: &str, start: usize) -> Option<u32> {
        match self.data.matchers.get(symbol as usize)?.as_ref()? {
            TokenMatcher::Literal(literal) => text[start..]
                .starts_with(literal.as_str())
                .then(|| (start + literal.len()) as u32),
            TokenMatcher::Dfa(dfa) => {
                let end = anchored_match_end(dfa, text, start)?;
                (end as usize > start).then_some(end)
            }
        }
    }

    /// Length of leading trivia at `start`, absorbed as token padding.
    pub fn trivia_len(&self, text: &str, start: usize) -> u32 {
        match &self.data.trivia {
            Some(dfa) => anchored_match_end(dfa, text, start)
                .map(|end| end - start as u32)
                .unwrap_or(0),
            None => 0,
        }
    }
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("symbols", &self.symbol_count())
            .field("states", &self.state_count())
            .finish()
    }
}
