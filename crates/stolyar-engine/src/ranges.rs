//! Changed-range computation between two tree revisions.
//!
//! Both trees describe the same document (the old one edited, then
//! re-parsed into the new one), so positions line up. The walk is lockstep:
//! a shared subtree (`Arc` pointer equality) is skipped wholesale — that is
//! the payoff of structural sharing. Where identities differ, children are
//! paired from both ends while symbols and spans agree, and the unpaired
//! middle is emitted as one range. A final pass merges overlapping and
//! adjacent ranges, so the result is sorted and non-overlapping; it may be
//! conservative, never incomplete.

use stolyar_core::{Length, Range};

use crate::subtree::Subtree;

pub(crate) fn changed_ranges(old: &Subtree, new: &Subtree) -> Vec<Range> {
    let mut spans: Vec<(Length, Length)> = Vec::new();
    diff(old, new, Length::ZERO, &mut spans);
    merge(spans)
}

fn emit(spans: &mut Vec<(Length, Length)>, start: Length, end: Length) {
    if end.bytes > start.bytes {
        spans.push((start, end));
    }
}

fn larger(a: Length, b: Length) -> Length {
    if a.bytes >= b.bytes { a } else { b }
}

fn diff(old: &Subtree, new: &Subtree, position: Length, spans: &mut Vec<(Length, Length)>) {
    if old.same_identity(new) {
        return;
    }

    let old_end = position + old.total_size();
    let new_end = position + new.total_size();

    if old.symbol() != new.symbol() || old.is_leaf() != new.is_leaf() {
        emit(spans, position, larger(old_end, new_end));
        return;
    }

    if old.is_leaf() {
        // A token that absorbed the edit may keep its kind and span; its
        // text still changed, so it is reported.
        if old.has_changes()
            || old.padding() != new.padding()
            || old.size() != new.size()
        {
            emit(spans, position, larger(old_end, new_end));
        }
        return;
    }

    // Same symbol, both internal: pair children from both ends.
    let old_children = offsets(old, position);
    let new_children = offsets(new, position);

    let mut lo = 0usize;
    while lo < old_children.len() && lo < new_children.len() {
        let (oat, ochild) = &old_children[lo];
        let (nat, nchild) = &new_children[lo];
        if !comparable(ochild, nchild) || oat.bytes != nat.bytes {
            break;
        }
        diff(ochild, nchild, *oat, spans);
        lo += 1;
    }

    let mut hi = 0usize;
    while hi < old_children.len().saturating_sub(lo)
        && hi < new_children.len().saturating_sub(lo)
    {
        let (oat, ochild) = &old_children[old_children.len() - 1 - hi];
        let (nat, nchild) = &new_children[new_children.len() - 1 - hi];
        let oend = *oat + ochild.total_size();
        let nend = *nat + nchild.total_size();
        if !comparable(ochild, nchild) || oend.bytes != nend.bytes || oat.bytes != nat.bytes {
            break;
        }
        diff(ochild, nchild, *oat, spans);
        hi += 1;
    }

    // Whatever is left in the middle changed. The unpaired middle of the
    // old child list is `lo..old_hi`; likewise for the new one.
    let old_hi = old_children.len() - hi;
    let new_hi = new_children.len() - hi;
    let old_span = (lo < old_hi).then(|| {
        let (last_at, last) = &old_children[old_hi - 1];
        (old_children[lo].0, *last_at + last.total_size())
    });
    let new_span = (lo < new_hi).then(|| {
        let (last_at, last) = &new_children[new_hi - 1];
        (new_children[lo].0, *last_at + last.total_size())
    });
    match (old_span, new_span) {
        (Some((os, oe)), Some((ns, ne))) => {
            let start = if os.bytes <= ns.bytes { os } else { ns };
            emit(spans, start, larger(oe, ne));
        }
        (Some((start, end)), None) | (None, Some((start, end))) => {
            emit(spans, start, end);
        }
        (None, None) => {}
    }
}

/// Two children may be paired (and recursed into) when they look like the
/// same piece of syntax: same symbol, same arity class, same span.
fn comparable(old: &Subtree, new: &Subtree) -> bool {
    old.symbol() == new.symbol()
        && old.is_leaf() == new.is_leaf()
        && old.total_size().bytes == new.total_size().bytes
}

fn offsets(subtree: &Subtree, position: Length) -> Vec<(Length, Subtree)> {
    let mut at = position;
    subtree
        .children()
        .iter()
        .map(|child| {
            let entry = (at, child.clone());
            at += child.total_size();
            entry
        })
        .collect()
}

fn merge(mut spans: Vec<(Length, Length)>) -> Vec<Range> {
    spans.sort_by_key(|(start, _)| start.bytes);
    let mut out: Vec<Range> = Vec::new();
    for (start, end) in spans {
        if let Some(last) = out.last_mut() {
            if start.bytes <= last.end_byte {
                if end.bytes > last.end_byte {
                    last.end_byte = end.bytes;
                    last.end_point = end.extent;
                }
                continue;
            }
        }
        out.push(Range {
            start_byte: start.bytes,
            end_byte: end.bytes,
            start_point: start.extent,
            end_point: end.extent,
        });
    }
    out
}
