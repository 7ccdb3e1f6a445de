//! Compiled pattern representation.
//!
//! Each pattern is a tree of steps mirroring the shape it matches: a step
//! constrains one node (symbol, wildcard, or anonymous literal, plus an
//! optional field), carries its captures and quantifier, and owns the steps
//! for its children. Predicates are compiled alongside — `#match?` regexes
//! become DFAs at compile time, so match time only runs searches.

use regex_automata::dfa::dense;
use stolyar_core::{FieldId, Symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StepKind {
    /// `(symbol ...)`
    Named(Symbol),
    /// `"literal"`
    Anonymous(Symbol),
    /// `(_)` matches any named node; bare `_` matches any node at all.
    Wildcard { named_only: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Quantifier {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Clone, Debug)]
pub(crate) struct Step {
    pub kind: StepKind,
    pub field: Option<FieldId>,
    pub captures: Vec<u32>,
    pub quantifier: Quantifier,
    pub children: Vec<Step>,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            field: None,
            captures: Vec::new(),
            quantifier: Quantifier::One,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Predicate {
    /// `(#eq? @cap "text")` / `(#not-eq? ...)`
    TextEq {
        capture: u32,
        value: String,
        negated: bool,
    },
    /// `(#match? @cap "regex")` / `(#not-match? ...)`
    TextMatch {
        capture: u32,
        dfa: Box<dense::DFA<Vec<u32>>>,
        negated: bool,
    },
}

#[derive(Debug)]
pub(crate) struct PatternData {
    pub root: Step,
    pub predicates: Vec<Predicate>,
}
