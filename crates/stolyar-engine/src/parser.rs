//! The GLR parser core.
//!
//! One `advance` step services one stack version: pick a lookahead (a
//! reused subtree from the previous tree when possible, a freshly lexed
//! token otherwise), look up the table actions for (state, symbol), and
//! apply them. Multiple actions split the head; converging heads are merged
//! back by the condense pass after every step. A version with no action
//! enters recovery, which either fabricates a missing token, pops to a
//! synchronization state, or skips the offending token inside an error
//! node — so every version keeps moving and a tree is always produced.
//!
//! The parse is single-threaded and cooperative: the cancellation flag is
//! polled once per advance step, and an interrupted parse returns an error
//! without producing a tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stolyar_core::{Language, Length, ParseAction, StateId};
use tracing::{debug, trace};

use crate::error_costs::MAX_COST_FACTOR;
use crate::external::ExternalScanner;
use crate::lexer::Lexer;
use crate::reuse::ReusableNode;
use crate::stack::{Stack, StackVersion};
use crate::subtree::Subtree;
use crate::tree::Tree;

/// Error-recovery tuning knobs. The defaults match the cost constants; both
/// are policy, not contract.
#[derive(Clone, Copy, Debug)]
pub struct RecoveryPolicy {
    /// Cap on simultaneously active stack heads.
    pub max_heads: usize,
    /// How many frames recovery will inspect when looking for a state that
    /// accepts the offending token.
    pub summary_depth: usize,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_heads: 6,
            summary_depth: 16,
        }
    }
}

/// Ways a parse can fail to produce a tree. Syntax errors are not among
/// them: erroneous input yields a tree with embedded error nodes.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no language set on parser")]
    NoLanguage,

    #[error("parse cancelled")]
    Cancelled,
}

/// A reusable parser instance. Holds the language, the optional external
/// scanner, the cancellation flag, and recovery policy.
pub struct Parser {
    language: Option<Language>,
    scanner: Option<Box<dyn ExternalScanner>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    policy: RecoveryPolicy,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            language: None,
            scanner: None,
            cancel_flag: None,
            policy: RecoveryPolicy::default(),
        }
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = Some(language);
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    pub fn set_external_scanner(&mut self, scanner: Option<Box<dyn ExternalScanner>>) {
        self.scanner = scanner;
    }

    /// Install a flag the host may set from another thread; the parser
    /// polls it at every shift/reduce work unit.
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancel_flag = flag;
    }

    pub fn set_recovery_policy(&mut self, policy: RecoveryPolicy) {
        self.policy = policy;
    }

    /// Parse `text`. With `old_tree` (already `edit`ed to match `text`),
    /// unchanged subtrees are shared into the new tree instead of being
    /// re-parsed.
    pub fn parse(&mut self, text: &str, old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        let language = self.language.clone().ok_or(ParseError::NoLanguage)?;
        let lexer = Lexer::new(text, language.clone());
        let mut stack = Stack::new(language.start_state());
        let mut reuse = old_tree.map(|tree| ReusableNode::new(tree.root_subtree()));
        let mut finished: Option<Subtree> = None;

        // Hard ceiling on work units. Recovery guarantees byte progress, so
        // this is never hit by well-formed tables; it bounds the damage of
        // a pathological one.
        let max_ops = 256usize.saturating_mul(text.len() + 64);
        let mut ops = 0usize;

        loop {
            if let Some(flag) = &self.cancel_flag {
                if flag.load(Ordering::Relaxed) {
                    return Err(ParseError::Cancelled);
                }
            }
            ops += 1;
            if ops > max_ops {
                debug!("work ceiling reached, forcing error tree");
                break;
            }

            let Some(version) = stack
                .active_versions()
                .min_by_key(|v| (stack.position(*v).bytes, stack.error_cost(*v)))
            else {
                break;
            };

            if let Some(best) = &finished {
                if best.error_cost() == 0 {
                    break;
                }
                let cutoff = best.error_cost().saturating_mul(MAX_COST_FACTOR);
                if stack.error_cost(version) >= cutoff {
                    stack.halt(version);
                    continue;
                }
            }

            self.advance(
                &mut stack,
                version,
                &lexer,
                &language,
                reuse.as_mut(),
                &mut finished,
            );
            condense(&mut stack);
            self.prune(&mut stack);
        }

        let total = lexer.text_len();
        let root = finished
            .unwrap_or_else(|| Subtree::new_error_leaf(Length::ZERO, total, 0));
        debug!(
            language = language.name(),
            bytes = total.bytes,
            error_cost = root.error_cost(),
            "parse finished"
        );
        Ok(Tree::new(root, language, total))
    }

    fn advance(
        &mut self,
        stack: &mut Stack,
        version: StackVersion,
        lexer: &Lexer<'_>,
        language: &Language,
        reuse: Option<&mut ReusableNode<'_>>,
        finished: &mut Option<Subtree>,
    ) {
        let state = stack.state(version);
        let position = stack.position(version);

        // Incremental fast path: when a single branch is active, try to
        // push a whole subtree from the previous tree.
        if let Some(walker) = reuse {
            if stack.active_versions().count() == 1 {
                let mode = language.lex_mode(state);
                let candidate = walker.candidate(position, |node| {
                    node.child_count() > 0
                        && node.is_reusable()
                        && language.lex_mode(node.first_leaf_parse_state()) == mode
                        && language.goto_state(state, node.symbol()).is_some()
                        && matches!(
                            language.actions(state, node.first_leaf_symbol()),
                            [ParseAction::Shift { .. }]
                        )
                });
                if let Some(subtree) = candidate {
                    if let Some(next) = language.goto_state(state, subtree.symbol()) {
                        trace!(
                            symbol = language.symbol_name(subtree.symbol()),
                            bytes = subtree.total_bytes(),
                            "reused subtree"
                        );
                        stack.push(version, Some(subtree), next);
                        return;
                    }
                }
            }
        }

        let external_state = stack.external_state(version).cloned();
        let token = lexer.lex(
            position,
            state,
            self.scanner.as_mut(),
            external_state.as_ref(),
        );

        let symbol = token.symbol();
        let actions = language.actions(state, symbol).to_vec();
        if actions.is_empty() {
            self.recover(stack, version, state, token, language, lexer, finished);
            return;
        }

        // GLR: one version per action.
        let mut assignments = vec![(version, actions[0])];
        for action in &actions[1..] {
            let split = stack.split(version);
            trace!(from = version, to = split, "split head");
            assignments.push((split, *action));
        }

        for (ver, action) in assignments {
            match action {
                ParseAction::Shift { state: next } => {
                    trace!(
                        symbol = language.symbol_name(symbol),
                        from = state,
                        to = next,
                        "shift"
                    );
                    if token.has_external_tokens() {
                        stack.set_external_state(ver, token.external_state().cloned());
                    }
                    stack.push(ver, Some(token.clone()), next);
                }
                ParseAction::ShiftExtra => {
                    trace!(symbol = language.symbol_name(symbol), state, "shift extra");
                    if token.has_external_tokens() {
                        stack.set_external_state(ver, token.external_state().cloned());
                    }
                    let mut extra = token.clone();
                    extra.set_extra();
                    stack.push(ver, Some(extra), state);
                }
                ParseAction::Reduce { production } => {
                    reduce(stack, ver, production, language);
                }
                ParseAction::Accept => {
                    accept(stack, ver, token.clone(), language, finished);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recover(
        &self,
        stack: &mut Stack,
        version: StackVersion,
        state: StateId,
        token: Subtree,
        language: &Language,
        lexer: &Lexer<'_>,
        finished: &mut Option<Subtree>,
    ) {
        let position = stack.position(version);

        // Fabricate one missing token if that lets the parser consume the
        // lookahead afterwards; never twice at the same spot.
        if stack.last_missing_byte(version) != Some(position.bytes) {
            for &terminal in language.valid_terminals(state) {
                let [ParseAction::Shift { state: next }] = language.actions(state, terminal)
                else {
                    continue;
                };
                if !language.actions(*next, token.symbol()).is_empty() {
                    debug!(
                        missing = language.symbol_name(terminal),
                        offset = position.bytes,
                        "recovery: inserted missing token"
                    );
                    let missing = Subtree::new_missing_leaf(language, terminal, Length::ZERO);
                    stack.push(version, Some(missing), *next);
                    stack.set_last_missing_byte(version, position.bytes);
                    return;
                }
            }
        }

        // A pure-reduce state only wants to finish an in-progress rule:
        // perform the reduction under a pretended lookahead and retry the
        // real token from the resulting state.
        let can_shift = language.valid_terminals(state).iter().any(|&t| {
            language
                .actions(state, t)
                .iter()
                .any(|action| matches!(action, ParseAction::Shift { .. }))
        });
        if !can_shift {
            for &terminal in language.valid_terminals(state) {
                if let [ParseAction::Reduce { production }] = language.actions(state, terminal) {
                    debug!(
                        symbol = language.symbol_name(terminal),
                        "recovery: reduced under pretended lookahead"
                    );
                    reduce(stack, version, *production, language);
                    return;
                }
            }
        }

        // At end of input there is nothing left to skip: wrap the whole
        // stack into an error root so the parse still yields a tree.
        if token.is_eof() {
            let mut eof = token;
            eof.set_extra();
            stack.push(version, Some(eof), state);
            let slices = stack.pop_all(version);
            for slice in slices {
                let root = Subtree::new_error_node(language, slice.subtrees);
                if finished
                    .as_ref()
                    .is_none_or(|best| root.error_cost() < best.error_cost())
                {
                    *finished = Some(root);
                }
                stack.halt(slice.version);
            }
            debug!("recovery: wrapped unfinished parse in error root");
            return;
        }

        // Pop to a state that accepts the token, wrapping the popped
        // frames into an error node.
        let mut summary = stack.summarize(version, self.policy.summary_depth);
        summary.sort_by_key(|entry| entry.depth);
        for entry in &summary {
            if entry.depth == 0 {
                continue;
            }
            if language.actions(entry.state, token.symbol()).is_empty() {
                continue;
            }
            let popped = stack.pop_frames(version, entry.depth);
            if popped.is_empty() {
                break;
            }
            debug!(
                frames = entry.depth,
                to_state = entry.state,
                "recovery: popped to synchronization state"
            );
            let mut error = Subtree::new_error_node(language, popped);
            error.set_extra();
            stack.push(version, Some(error), entry.state);
            return;
        }

        // Skip the token inside an extra error node. Zero-width tokens are
        // replaced by a one-character error leaf so the position always
        // moves.
        let mut wrapped = if token.total_bytes() == 0 {
            match lexer.one_char_error(position) {
                Some(error) => error,
                None => return,
            }
        } else if token.is_error() {
            token
        } else {
            Subtree::new_error_node(language, vec![token])
        };
        debug!(offset = position.bytes, "recovery: skipped token");
        wrapped.set_extra();
        stack.push(version, Some(wrapped), state);
    }

    fn prune(&self, stack: &mut Stack) {
        let mut active: Vec<StackVersion> = stack.active_versions().collect();
        if active.len() <= self.policy.max_heads {
            return;
        }
        active.sort_by_key(|v| stack.error_cost(*v));
        for version in active.into_iter().skip(self.policy.max_heads) {
            trace!(version, "pruned head over the limit");
            stack.halt(version);
        }
    }
}

fn reduce(
    stack: &mut Stack,
    version: StackVersion,
    production_id: u16,
    language: &Language,
) {
    let production = language.production(production_id).clone();
    let slices = stack.pop_count(version, production.child_count as usize);
    for slice in slices {
        let state_below = stack.state(slice.version);
        let node = Subtree::new_node(language, production.symbol, slice.subtrees, production_id);
        match language.goto_state(state_below, production.symbol) {
            Some(next) => {
                trace!(
                    symbol = language.symbol_name(production.symbol),
                    to = next,
                    "reduce"
                );
                stack.push(slice.version, Some(node), next);
            }
            None => {
                // No continuation for this path: a dead ambiguity branch.
                trace!(
                    symbol = language.symbol_name(production.symbol),
                    "reduce path dead-ended"
                );
                stack.halt(slice.version);
            }
        }
    }
}

fn accept(
    stack: &mut Stack,
    version: StackVersion,
    eof: Subtree,
    language: &Language,
    finished: &mut Option<Subtree>,
) {
    let state = stack.state(version);
    let mut eof = eof;
    eof.set_extra();
    stack.push(version, Some(eof), state);
    let slices = stack.pop_all(version);
    for slice in slices {
        let root = build_root(language, slice.subtrees);
        trace!(error_cost = root.error_cost(), "accept");
        if finished
            .as_ref()
            .is_none_or(|best| root.error_cost() < best.error_cost())
        {
            *finished = Some(root);
        }
        stack.halt(slice.version);
    }
}

/// Assemble the final root from everything on the stack: the start symbol's
/// node, flattened, with surrounding extras and the end-of-input token (it
/// carries the trailing trivia, keeping the root span equal to the source).
fn build_root(language: &Language, subtrees: Vec<Subtree>) -> Subtree {
    let root_idx = subtrees
        .iter()
        .position(|subtree| !subtree.extra() && !subtree.is_eof());
    match root_idx {
        Some(idx) => {
            if subtrees.len() == 1 {
                return subtrees.into_iter().next().expect("non-empty");
            }
            let symbol = subtrees[idx].symbol();
            let production_id = subtrees[idx].production_id();
            let mut children = Vec::new();
            for (i, subtree) in subtrees.into_iter().enumerate() {
                if i == idx {
                    // Splice the start symbol's children in place of the
                    // node itself; a childless root contributes nothing.
                    children.extend(subtree.children().iter().cloned());
                } else {
                    children.push(subtree);
                }
            }
            Subtree::new_node(language, symbol, children, production_id)
        }
        None => Subtree::new_error_node(language, subtrees),
    }
}

fn condense(stack: &mut Stack) {
    let versions: Vec<StackVersion> = stack.active_versions().collect();
    for i in 0..versions.len() {
        for j in (i + 1)..versions.len() {
            if stack.is_active(versions[i]) && stack.is_active(versions[j]) {
                stack.merge(versions[i], versions[j]);
            }
        }
    }
}
