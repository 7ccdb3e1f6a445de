//! Pattern matching over a tree.
//!
//! Matching walks the tree in pre-order and tries every pattern at every
//! visible node. Child steps match the node's children in order with gaps
//! permitted between them; quantified steps are greedy and backtrack.
//! Predicates run only after a structural match, against text slices of the
//! captured nodes.

use regex_automata::Input;
use regex_automata::dfa::Automaton;
use stolyar_engine::Node;

use crate::pattern::{PatternData, Predicate, Quantifier, Step, StepKind};
use crate::{QueryCapture, QueryMatch};

pub(crate) fn matches_in<'t>(
    patterns: &[PatternData],
    root: Node<'t>,
    source: &str,
) -> Vec<QueryMatch<'t>> {
    let mut out = Vec::new();
    walk(root, &mut |node| {
        for (pattern_index, pattern) in patterns.iter().enumerate() {
            let mut captures = Vec::new();
            if match_node(&pattern.root, node, &mut captures)
                && predicates_hold(&pattern.predicates, &captures, source)
            {
                out.push(QueryMatch {
                    pattern_index,
                    captures,
                });
            }
        }
    });
    out
}

fn walk<'t>(node: Node<'t>, visit: &mut impl FnMut(Node<'t>)) {
    visit(node);
    for child in node.children() {
        walk(child, visit);
    }
}

/// Does `node` itself satisfy `step` (and its child steps)?
fn match_node<'t>(step: &Step, node: Node<'t>, captures: &mut Vec<QueryCapture<'t>>) -> bool {
    let kind_ok = match step.kind {
        StepKind::Named(symbol) => node.symbol() == symbol,
        StepKind::Anonymous(symbol) => node.symbol() == symbol,
        StepKind::Wildcard { named_only } => !named_only || node.is_named(),
    };
    if !kind_ok {
        return false;
    }
    let mark = captures.len();
    for &index in &step.captures {
        captures.push(QueryCapture { index, node });
    }
    if match_children(&step.children, &node.children(), 0, 0, captures) {
        true
    } else {
        captures.truncate(mark);
        false
    }
}

/// A child step matches at a specific child: kind, field, and subtree.
fn match_child<'t>(step: &Step, child: Node<'t>, captures: &mut Vec<QueryCapture<'t>>) -> bool {
    if let Some(field) = step.field {
        if child.field_id() != Some(field) {
            return false;
        }
    }
    match_node(step, child, captures)
}

/// Match `steps[si..]` against `children[ci..]`, in order, gaps allowed.
fn match_children<'t>(
    steps: &[Step],
    children: &[Node<'t>],
    si: usize,
    ci: usize,
    captures: &mut Vec<QueryCapture<'t>>,
) -> bool {
    let Some(step) = steps.get(si) else {
        return true;
    };
    match step.quantifier {
        Quantifier::One => {
            for at in ci..children.len() {
                let mark = captures.len();
                if match_child(step, children[at], captures)
                    && match_children(steps, children, si + 1, at + 1, captures)
                {
                    return true;
                }
                captures.truncate(mark);
            }
            false
        }
        Quantifier::ZeroOrOne => {
            for at in ci..children.len() {
                let mark = captures.len();
                if match_child(step, children[at], captures)
                    && match_children(steps, children, si + 1, at + 1, captures)
                {
                    return true;
                }
                captures.truncate(mark);
            }
            match_children(steps, children, si + 1, ci, captures)
        }
        Quantifier::ZeroOrMore => match_repeat(steps, children, si, ci, 0, captures),
        Quantifier::OneOrMore => match_repeat(steps, children, si, ci, 0, captures),
    }
}

/// Greedy repetition with backtracking: try to consume one more occurrence
/// first, fall back to moving on once the minimum is met.
fn match_repeat<'t>(
    steps: &[Step],
    children: &[Node<'t>],
    si: usize,
    ci: usize,
    matched: usize,
    captures: &mut Vec<QueryCapture<'t>>,
) -> bool {
    let step = &steps[si];
    for at in ci..children.len() {
        let mark = captures.len();
        if match_child(step, children[at], captures)
            && match_repeat(steps, children, si, at + 1, matched + 1, captures)
        {
            return true;
        }
        captures.truncate(mark);
    }
    let minimum = match step.quantifier {
        Quantifier::OneOrMore => 1,
        _ => 0,
    };
    if matched >= minimum {
        match_children(steps, children, si + 1, ci, captures)
    } else {
        false
    }
}

fn predicates_hold(
    predicates: &[Predicate],
    captures: &[QueryCapture<'_>],
    source: &str,
) -> bool {
    predicates.iter().all(|predicate| match predicate {
        Predicate::TextEq {
            capture,
            value,
            negated,
        } => captured_texts(captures, *capture, source)
            .all(|text| (text == value.as_str()) != *negated),
        Predicate::TextMatch {
            capture,
            dfa,
            negated,
        } => captured_texts(captures, *capture, source).all(|text| {
            let found = matches!(dfa.try_search_fwd(&Input::new(text)), Ok(Some(_)));
            found != *negated
        }),
    })
}

fn captured_texts<'a>(
    captures: &'a [QueryCapture<'_>],
    index: u32,
    source: &'a str,
) -> impl Iterator<Item = &'a str> {
    captures
        .iter()
        .filter(move |capture| capture.index == index)
        .map(move |capture| capture.node.utf8_text(source))
}
