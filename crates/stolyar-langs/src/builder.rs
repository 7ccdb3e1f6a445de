//! SLR(1) table construction for the bundled demo grammars.
//!
//! This is deliberately the textbook algorithm — LR(0) item sets with
//! FOLLOW-based reductions — because the point is producing *tables*, not a
//! grammar compiler: conflicts are not resolved, they are kept as
//! multi-action entries, which is exactly what drives the engine's GLR
//! machinery in tests. Symbol naming follows the usual convention: rules
//! whose name starts with `_` become invisible nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use stolyar_core::{
    FieldId, GrammarTable, Language, LanguageError, LexDef, LexRule, ParseAction, ParseState,
    Production, SYM_END, StateId, Symbol, SymbolInfo,
};

/// Errors in the grammar description itself.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("rule references unknown symbol {0:?}")]
    UnknownSymbol(String),

    #[error("grammar has no rules")]
    NoRules,

    #[error("duplicate terminal {0:?}")]
    DuplicateTerminal(String),

    #[error(transparent)]
    Language(#[from] LanguageError),
}

struct TerminalDef {
    name: String,
    def: LexDef,
    named: bool,
    extra: bool,
    keyword: bool,
    precedence: i32,
}

struct RuleDef {
    lhs: String,
    rhs: Vec<String>,
    fields: Vec<Option<String>>,
    dynamic_precedence: i32,
}

pub struct GrammarBuilder {
    name: String,
    terminals: Vec<TerminalDef>,
    rules: Vec<RuleDef>,
    trivia: Option<String>,
    word: Option<String>,
}

impl GrammarBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            terminals: Vec::new(),
            rules: Vec::new(),
            trivia: Some(r"[ \t\r\n]+".to_string()),
            word: None,
        }
    }

    pub fn trivia(&mut self, pattern: &str) -> &mut Self {
        self.trivia = Some(pattern.to_string());
        self
    }

    /// A named pattern terminal.
    pub fn token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.terminals.push(TerminalDef {
            name: name.to_string(),
            def: LexDef::Pattern(pattern.to_string()),
            named: true,
            extra: false,
            keyword: false,
            precedence: 0,
        });
        self
    }

    /// An anonymous literal terminal (punctuation and the like).
    pub fn literal(&mut self, text: &str) -> &mut Self {
        self.terminals.push(TerminalDef {
            name: text.to_string(),
            def: LexDef::Literal(text.to_string()),
            named: false,
            extra: false,
            keyword: false,
            precedence: 1,
        });
        self
    }

    /// A keyword: a literal extracted through the word token.
    pub fn keyword(&mut self, text: &str) -> &mut Self {
        self.terminals.push(TerminalDef {
            name: text.to_string(),
            def: LexDef::Literal(text.to_string()),
            named: false,
            extra: false,
            keyword: true,
            precedence: 1,
        });
        self
    }

    /// A named terminal allowed between any two tokens (e.g. comments).
    pub fn extra_token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.terminals.push(TerminalDef {
            name: name.to_string(),
            def: LexDef::Pattern(pattern.to_string()),
            named: true,
            extra: true,
            keyword: false,
            precedence: 0,
        });
        self
    }

    pub fn word(&mut self, name: &str) -> &mut Self {
        self.word = Some(name.to_string());
        self
    }

    /// A production. The first rule's left-hand side is the start symbol.
    pub fn rule(&mut self, lhs: &str, rhs: &[&str]) -> &mut Self {
        self.rule_with_fields(lhs, rhs, &[])
    }

    /// A production with per-slot field names (`None` for unnamed slots).
    pub fn rule_with_fields(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        fields: &[Option<&str>],
    ) -> &mut Self {
        self.rules.push(RuleDef {
            lhs: lhs.to_string(),
            rhs: rhs.iter().map(|s| s.to_string()).collect(),
            fields: fields
                .iter()
                .map(|f| f.map(|name| name.to_string()))
                .collect(),
            dynamic_precedence: 0,
        });
        self
    }

    pub fn build(&self) -> Result<Language, BuildError> {
        Ok(Language::from_table(self.build_table()?)?)
    }

    pub fn build_table(&self) -> Result<GrammarTable, BuildError> {
        if self.rules.is_empty() {
            return Err(BuildError::NoRules);
        }

        // --- symbol numbering: end, terminals, then non-terminals --------
        let mut symbols = vec![SymbolInfo {
            name: "end".to_string(),
            named: false,
            visible: false,
            terminal: true,
            extra: false,
            keyword: false,
            external: false,
        }];
        let mut ids: HashMap<String, Symbol> = HashMap::new();
        for terminal in &self.terminals {
            if ids.contains_key(&terminal.name) {
                return Err(BuildError::DuplicateTerminal(terminal.name.clone()));
            }
            ids.insert(terminal.name.clone(), symbols.len() as Symbol);
            symbols.push(SymbolInfo {
                name: terminal.name.clone(),
                named: terminal.named,
                visible: true,
                terminal: true,
                extra: terminal.extra,
                keyword: terminal.keyword,
                external: false,
            });
        }
        for rule in &self.rules {
            if !ids.contains_key(&rule.lhs) {
                let hidden = rule.lhs.starts_with('_');
                ids.insert(rule.lhs.clone(), symbols.len() as Symbol);
                symbols.push(SymbolInfo {
                    name: rule.lhs.clone(),
                    named: !hidden,
                    visible: !hidden,
                    terminal: false,
                    extra: false,
                    keyword: false,
                    external: false,
                });
            }
        }

        // --- field numbering, in order of first appearance ---------------
        let mut fields: Vec<String> = Vec::new();
        for rule in &self.rules {
            for field in rule.fields.iter().flatten() {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        let field_id = |name: &str| -> Option<FieldId> {
            fields
                .iter()
                .position(|f| f == name)
                .and_then(|idx| FieldId::new(idx as u16 + 1))
        };

        // --- productions --------------------------------------------------
        let mut productions = Vec::new();
        let mut prods: Vec<(Symbol, Vec<Symbol>)> = Vec::new();
        for rule in &self.rules {
            let lhs = ids[&rule.lhs];
            let mut rhs = Vec::with_capacity(rule.rhs.len());
            for name in &rule.rhs {
                let symbol = *ids
                    .get(name)
                    .ok_or_else(|| BuildError::UnknownSymbol(name.clone()))?;
                rhs.push(symbol);
            }
            let field_slots = if rule.fields.iter().any(Option::is_some) {
                rule.rhs
                    .iter()
                    .enumerate()
                    .map(|(slot, _)| {
                        rule.fields
                            .get(slot)
                            .and_then(|f| f.as_deref())
                            .and_then(field_id)
                    })
                    .collect()
            } else {
                Vec::new()
            };
            productions.push(Production {
                symbol: lhs,
                child_count: rhs.len() as u16,
                field_slots,
                dynamic_precedence: rule.dynamic_precedence,
            });
            prods.push((lhs, rhs));
        }
        let start_symbol = prods[0].0;

        let nonterminals: HashSet<Symbol> = prods.iter().map(|(lhs, _)| *lhs).collect();
        let is_terminal = |symbol: Symbol| !nonterminals.contains(&symbol);

        // --- nullable / FIRST / FOLLOW -----------------------------------
        let mut nullable: HashSet<Symbol> = HashSet::new();
        loop {
            let before = nullable.len();
            for (lhs, rhs) in &prods {
                if rhs.iter().all(|s| nullable.contains(s)) {
                    nullable.insert(*lhs);
                }
            }
            if nullable.len() == before {
                break;
            }
        }

        let mut first: HashMap<Symbol, BTreeSet<Symbol>> = HashMap::new();
        loop {
            let mut changed = false;
            for (lhs, rhs) in &prods {
                let mut add: BTreeSet<Symbol> = BTreeSet::new();
                for symbol in rhs {
                    if is_terminal(*symbol) {
                        add.insert(*symbol);
                        break;
                    }
                    if let Some(set) = first.get(symbol) {
                        add.extend(set.iter().copied());
                    }
                    if !nullable.contains(symbol) {
                        break;
                    }
                }
                let entry = first.entry(*lhs).or_default();
                for symbol in add {
                    changed |= entry.insert(symbol);
                }
            }
            if !changed {
                break;
            }
        }
        let first_of = |symbol: Symbol| -> BTreeSet<Symbol> {
            if is_terminal(symbol) {
                BTreeSet::from([symbol])
            } else {
                first.get(&symbol).cloned().unwrap_or_default()
            }
        };

        let mut follow: HashMap<Symbol, BTreeSet<Symbol>> = HashMap::new();
        follow.entry(start_symbol).or_default().insert(SYM_END);
        loop {
            let mut changed = false;
            for (lhs, rhs) in &prods {
                for (i, symbol) in rhs.iter().enumerate() {
                    if is_terminal(*symbol) {
                        continue;
                    }
                    let mut add: BTreeSet<Symbol> = BTreeSet::new();
                    let mut tail_nullable = true;
                    for rest in &rhs[i + 1..] {
                        add.extend(first_of(*rest));
                        if !nullable.contains(rest) {
                            tail_nullable = false;
                            break;
                        }
                    }
                    if tail_nullable {
                        if let Some(set) = follow.get(lhs) {
                            add.extend(set.iter().copied());
                        }
                    }
                    let entry = follow.entry(*symbol).or_default();
                    for s in add {
                        changed |= entry.insert(s);
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // --- LR(0) automaton ---------------------------------------------
        // Item: (production index, dot). `prods.len()` is the augmented
        // production `S' -> start`.
        type Item = (usize, usize);
        let augmented = prods.len();
        let mut rhs_list: Vec<Vec<Symbol>> =
            prods.iter().map(|(_, rhs)| rhs.clone()).collect();
        rhs_list.push(vec![start_symbol]);

        let closure = |kernel: &BTreeSet<Item>| -> BTreeSet<Item> {
            let mut set = kernel.clone();
            let mut queue: Vec<Item> = set.iter().copied().collect();
            while let Some((prod, dot)) = queue.pop() {
                let Some(next) = rhs_list[prod].get(dot) else {
                    continue;
                };
                if is_terminal(*next) {
                    continue;
                }
                for (i, (lhs, _)) in prods.iter().enumerate() {
                    if lhs == next && set.insert((i, 0)) {
                        queue.push((i, 0));
                    }
                }
            }
            set
        };

        let initial = closure(&BTreeSet::from([(augmented, 0)]));
        let mut state_ids: HashMap<BTreeSet<Item>, usize> = HashMap::new();
        let mut item_sets: Vec<BTreeSet<Item>> = vec![initial.clone()];
        state_ids.insert(initial, 0);
        let mut transitions: Vec<BTreeMap<Symbol, usize>> = vec![BTreeMap::new()];
        let mut queue = vec![0usize];
        while let Some(idx) = queue.pop() {
            let items = item_sets[idx].clone();
            let mut by_symbol: BTreeMap<Symbol, BTreeSet<Item>> = BTreeMap::new();
            for (prod, dot) in &items {
                if let Some(next) = rhs_list[*prod].get(*dot) {
                    by_symbol
                        .entry(*next)
                        .or_default()
                        .insert((*prod, dot + 1));
                }
            }
            for (symbol, kernel) in by_symbol {
                let set = closure(&kernel);
                let target = match state_ids.get(&set) {
                    Some(target) => *target,
                    None => {
                        let target = item_sets.len();
                        state_ids.insert(set.clone(), target);
                        item_sets.push(set);
                        transitions.push(BTreeMap::new());
                        queue.push(target);
                        target
                    }
                };
                transitions[idx].insert(symbol, target);
            }
        }

        // --- parse states (offset by one for the reserved error state) ---
        let offset = |idx: usize| -> StateId { (idx + 1) as StateId };
        let mut states = vec![ParseState::default()];
        for (idx, items) in item_sets.iter().enumerate() {
            let mut actions: BTreeMap<Symbol, Vec<ParseAction>> = BTreeMap::new();
            let mut gotos: Vec<(Symbol, StateId)> = Vec::new();
            for (symbol, target) in &transitions[idx] {
                if is_terminal(*symbol) {
                    actions.entry(*symbol).or_default().push(ParseAction::Shift {
                        state: offset(*target),
                    });
                } else {
                    gotos.push((*symbol, offset(*target)));
                }
            }
            for (prod, dot) in items {
                if *dot < rhs_list[*prod].len() {
                    continue;
                }
                if *prod == augmented {
                    actions.entry(SYM_END).or_default().push(ParseAction::Accept);
                    continue;
                }
                let lhs = prods[*prod].0;
                if let Some(set) = follow.get(&lhs) {
                    for symbol in set {
                        actions
                            .entry(*symbol)
                            .or_default()
                            .push(ParseAction::Reduce {
                                production: *prod as u16,
                            });
                    }
                }
            }
            states.push(ParseState {
                actions: actions.into_iter().collect(),
                gotos,
                external: false,
            });
        }

        let word_token = self.word.as_ref().and_then(|name| ids.get(name)).copied();
        let lexical = self
            .terminals
            .iter()
            .map(|terminal| LexRule {
                symbol: ids[&terminal.name],
                def: terminal.def.clone(),
                precedence: terminal.precedence,
            })
            .collect();

        Ok(GrammarTable {
            name: self.name.clone(),
            symbols,
            fields,
            productions,
            states,
            start_state: 1,
            lexical,
            trivia_pattern: self.trivia.clone(),
            word_token,
            external_symbols: Vec::new(),
        })
    }
}
