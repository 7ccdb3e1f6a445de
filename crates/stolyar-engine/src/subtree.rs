//! Persistent, reference-counted subtrees.
//!
//! Two representations: `Inline` for ordinary leaf tokens (a `Copy` value,
//! no allocation) and `Heap` for internal nodes and for leaves that carry
//! extra baggage (error leaves, missing leaves, external-scanner tokens).
//! Heap subtrees sit behind `Arc`, so sharing a subtree between trees or
//! stack branches is a refcount bump and the count is atomic. The only
//! mutation ever applied to a subtree is offset shifting during `edit`,
//! done through `Arc::make_mut`: uniquely-owned nodes are patched in place,
//! shared nodes are cloned along the edited path only.
//!
//! Every subtree measures itself as `padding` (leading trivia) plus `size`
//! (content). Positions are never stored absolutely; a node's offset is the
//! sum of the spans before it, which is what makes whole-subtree reuse after
//! an edit a pure pointer share.

use std::sync::Arc;

use stolyar_core::{
    InputEdit, Language, Length, ProductionId, STATE_NONE, SYM_END, SYM_ERROR, SYM_ERROR_REPEAT,
    StateId, Symbol,
};

use crate::error_costs::{
    COST_PER_MISSING_TREE, COST_PER_RECOVERY, COST_PER_SKIPPED_CHAR, COST_PER_SKIPPED_TREE,
};

/// Opaque external-scanner state snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalState(pub Vec<u8>);

/// A plain leaf token, stored without allocation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InlineToken {
    pub symbol: Symbol,
    pub parse_state: StateId,
    pub padding: Length,
    pub size: Length,
    pub lookahead_bytes: u32,
    pub visible: bool,
    pub named: bool,
    pub extra: bool,
    pub keyword: bool,
    pub has_changes: bool,
}

/// Heap payload: internal nodes, and leaves with extra baggage.
#[derive(Clone, Debug)]
pub(crate) struct SubtreeData {
    pub symbol: Symbol,
    pub parse_state: StateId,
    pub padding: Length,
    pub size: Length,
    pub lookahead_bytes: u32,
    pub error_cost: u32,
    pub dynamic_precedence: i32,
    pub production_id: ProductionId,
    pub children: Vec<Subtree>,
    pub node_count: u32,
    pub visible_child_count: u32,
    pub named_child_count: u32,
    pub first_leaf_symbol: Symbol,
    pub first_leaf_parse_state: StateId,
    pub visible: bool,
    pub named: bool,
    pub extra: bool,
    pub keyword: bool,
    pub fragile_left: bool,
    pub fragile_right: bool,
    pub has_changes: bool,
    pub is_missing: bool,
    pub has_external_tokens: bool,
    pub has_external_scanner_state_change: bool,
    pub external_state: Option<ExternalState>,
}

#[derive(Clone, Debug)]
pub(crate) enum Subtree {
    Inline(InlineToken),
    Heap(Arc<SubtreeData>),
}

impl Subtree {
    /// An ordinary token leaf.
    pub fn new_leaf(
        language: &Language,
        symbol: Symbol,
        padding: Length,
        size: Length,
        lookahead_bytes: u32,
        parse_state: StateId,
        keyword: bool,
    ) -> Subtree {
        Subtree::Inline(InlineToken {
            symbol,
            parse_state,
            padding,
            size,
            lookahead_bytes,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            extra: language.is_extra(symbol),
            keyword,
            has_changes: false,
        })
    }

    /// The zero-width end-of-input token.
    pub fn new_eof(padding: Length, parse_state: StateId) -> Subtree {
        Subtree::Inline(InlineToken {
            symbol: SYM_END,
            parse_state,
            padding,
            size: Length::ZERO,
            lookahead_bytes: 0,
            visible: false,
            named: false,
            extra: false,
            keyword: false,
            has_changes: false,
        })
    }

    /// A leaf produced by the external scanner, carrying its state snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn new_external_leaf(
        language: &Language,
        symbol: Symbol,
        padding: Length,
        size: Length,
        lookahead_bytes: u32,
        parse_state: StateId,
        state: ExternalState,
        state_changed: bool,
    ) -> Subtree {
        Subtree::Heap(Arc::new(SubtreeData {
            symbol,
            parse_state,
            padding,
            size,
            lookahead_bytes,
            error_cost: 0,
            dynamic_precedence: 0,
            production_id: 0,
            children: Vec::new(),
            node_count: 1,
            visible_child_count: 0,
            named_child_count: 0,
            first_leaf_symbol: symbol,
            first_leaf_parse_state: parse_state,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            extra: language.is_extra(symbol),
            keyword: false,
            fragile_left: false,
            fragile_right: false,
            has_changes: false,
            is_missing: false,
            has_external_tokens: true,
            has_external_scanner_state_change: state_changed,
            external_state: Some(state),
        }))
    }

    /// A leaf wrapping skipped bytes that no token matched.
    pub fn new_error_leaf(padding: Length, size: Length, lookahead_bytes: u32) -> Subtree {
        Subtree::Heap(Arc::new(SubtreeData {
            symbol: SYM_ERROR,
            parse_state: STATE_NONE,
            padding,
            size,
            lookahead_bytes,
            error_cost: COST_PER_SKIPPED_TREE + COST_PER_SKIPPED_CHAR * size.bytes,
            dynamic_precedence: 0,
            production_id: 0,
            children: Vec::new(),
            node_count: 1,
            visible_child_count: 0,
            named_child_count: 0,
            first_leaf_symbol: SYM_ERROR,
            first_leaf_parse_state: STATE_NONE,
            visible: true,
            named: true,
            extra: false,
            keyword: false,
            fragile_left: true,
            fragile_right: true,
            has_changes: false,
            is_missing: false,
            has_external_tokens: false,
            has_external_scanner_state_change: false,
            external_state: None,
        }))
    }

    /// A zero-width token fabricated by error recovery.
    pub fn new_missing_leaf(language: &Language, symbol: Symbol, padding: Length) -> Subtree {
        Subtree::Heap(Arc::new(SubtreeData {
            symbol,
            parse_state: STATE_NONE,
            padding,
            size: Length::ZERO,
            lookahead_bytes: 0,
            error_cost: COST_PER_MISSING_TREE,
            dynamic_precedence: 0,
            production_id: 0,
            children: Vec::new(),
            node_count: 1,
            visible_child_count: 0,
            named_child_count: 0,
            first_leaf_symbol: symbol,
            first_leaf_parse_state: STATE_NONE,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            extra: false,
            keyword: false,
            fragile_left: true,
            fragile_right: true,
            has_changes: false,
            is_missing: true,
            has_external_tokens: false,
            has_external_scanner_state_change: false,
            external_state: None,
        }))
    }

    /// An internal node. Aggregates are summarized here, once.
    pub fn new_node(
        language: &Language,
        symbol: Symbol,
        children: Vec<Subtree>,
        production_id: ProductionId,
    ) -> Subtree {
        let is_error = symbol == SYM_ERROR || symbol == SYM_ERROR_REPEAT;

        let mut padding = Length::ZERO;
        let mut size = Length::ZERO;
        let mut error_cost = 0u32;
        let mut dynamic_precedence = 0i32;
        let mut node_count = 1u32;
        let mut visible_child_count = 0u32;
        let mut named_child_count = 0u32;
        let mut has_external_tokens = false;
        let mut has_external_scanner_state_change = false;
        let mut has_changes = false;

        for (i, child) in children.iter().enumerate() {
            if i == 0 {
                padding = child.padding();
                size = child.size();
            } else {
                size += child.total_size();
            }
            error_cost += child.error_cost();
            dynamic_precedence += child.dynamic_precedence();
            node_count += child.node_count();
            if child.visible() {
                visible_child_count += 1;
                if child.named() {
                    named_child_count += 1;
                }
            } else {
                visible_child_count += child.visible_child_count();
                named_child_count += child.named_child_count();
            }
            has_external_tokens |= child.has_external_tokens();
            has_external_scanner_state_change |= child.has_external_scanner_state_change();
            has_changes |= child.has_changes();
        }

        if is_error {
            error_cost += COST_PER_RECOVERY;
            for child in &children {
                if !child.is_error() {
                    error_cost += COST_PER_SKIPPED_TREE;
                }
            }
        }

        if !is_error {
            dynamic_precedence += language.production(production_id).dynamic_precedence;
        }

        let (first_leaf_symbol, first_leaf_parse_state) = children
            .first()
            .map(|child| (child.first_leaf_symbol(), child.first_leaf_parse_state()))
            .unwrap_or((symbol, STATE_NONE));

        let fragile_left = is_error || children.first().is_some_and(Subtree::fragile_left);
        let fragile_right = is_error || children.last().is_some_and(Subtree::fragile_right);

        Subtree::Heap(Arc::new(SubtreeData {
            symbol,
            parse_state: STATE_NONE,
            padding,
            size,
            lookahead_bytes: 0,
            error_cost,
            dynamic_precedence,
            production_id,
            children,
            node_count,
            visible_child_count,
            named_child_count,
            first_leaf_symbol,
            first_leaf_parse_state,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            extra: false,
            keyword: false,
            fragile_left,
            fragile_right,
            has_changes,
            is_missing: false,
            has_external_tokens,
            has_external_scanner_state_change,
            external_state: None,
        }))
    }

    /// An error node wrapping skipped subtrees during recovery.
    pub fn new_error_node(language: &Language, children: Vec<Subtree>) -> Subtree {
        Self::new_node(language, SYM_ERROR, children, 0)
    }

    // --- accessors ---------------------------------------------------------

    pub fn symbol(&self) -> Symbol {
        match self {
            Subtree::Inline(t) => t.symbol,
            Subtree::Heap(d) => d.symbol,
        }
    }

    pub fn padding(&self) -> Length {
        match self {
            Subtree::Inline(t) => t.padding,
            Subtree::Heap(d) => d.padding,
        }
    }

    pub fn size(&self) -> Length {
        match self {
            Subtree::Inline(t) => t.size,
            Subtree::Heap(d) => d.size,
        }
    }

    pub fn total_size(&self) -> Length {
        self.padding() + self.size()
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_size().bytes
    }

    pub fn lookahead_bytes(&self) -> u32 {
        match self {
            Subtree::Inline(t) => t.lookahead_bytes,
            Subtree::Heap(d) => d.lookahead_bytes,
        }
    }

    pub fn children(&self) -> &[Subtree] {
        match self {
            Subtree::Inline(_) => &[],
            Subtree::Heap(d) => &d.children,
        }
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_count() == 0
    }

    pub fn visible(&self) -> bool {
        match self {
            Subtree::Inline(t) => t.visible,
            Subtree::Heap(d) => d.visible,
        }
    }

    pub fn named(&self) -> bool {
        match self {
            Subtree::Inline(t) => t.named,
            Subtree::Heap(d) => d.named,
        }
    }

    pub fn extra(&self) -> bool {
        match self {
            Subtree::Inline(t) => t.extra,
            Subtree::Heap(d) => d.extra,
        }
    }

    pub fn is_keyword(&self) -> bool {
        match self {
            Subtree::Inline(t) => t.keyword,
            Subtree::Heap(d) => d.keyword,
        }
    }

    pub fn is_error(&self) -> bool {
        self.symbol() == SYM_ERROR
    }

    pub fn is_eof(&self) -> bool {
        self.symbol() == SYM_END && self.is_leaf()
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Subtree::Inline(_) => false,
            Subtree::Heap(d) => d.is_missing,
        }
    }

    pub fn error_cost(&self) -> u32 {
        match self {
            Subtree::Inline(_) => 0,
            Subtree::Heap(d) => d.error_cost,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_cost() > 0
    }

    pub fn dynamic_precedence(&self) -> i32 {
        match self {
            Subtree::Inline(_) => 0,
            Subtree::Heap(d) => d.dynamic_precedence,
        }
    }

    pub fn production_id(&self) -> ProductionId {
        match self {
            Subtree::Inline(_) => 0,
            Subtree::Heap(d) => d.production_id,
        }
    }

    pub fn node_count(&self) -> u32 {
        match self {
            Subtree::Inline(_) => 1,
            Subtree::Heap(d) => d.node_count,
        }
    }

    pub fn visible_child_count(&self) -> u32 {
        match self {
            Subtree::Inline(_) => 0,
            Subtree::Heap(d) => d.visible_child_count,
        }
    }

    pub fn named_child_count(&self) -> u32 {
        match self {
            Subtree::Inline(_) => 0,
            Subtree::Heap(d) => d.named_child_count,
        }
    }

    pub fn first_leaf_symbol(&self) -> Symbol {
        match self {
            Subtree::Inline(t) => t.symbol,
            Subtree::Heap(d) => {
                if d.children.is_empty() {
                    d.symbol
                } else {
                    d.first_leaf_symbol
                }
            }
        }
    }

    pub fn first_leaf_parse_state(&self) -> StateId {
        match self {
            Subtree::Inline(t) => t.parse_state,
            Subtree::Heap(d) => {
                if d.children.is_empty() {
                    d.parse_state
                } else {
                    d.first_leaf_parse_state
                }
            }
        }
    }

    pub fn fragile_left(&self) -> bool {
        match self {
            Subtree::Inline(_) => false,
            Subtree::Heap(d) => d.fragile_left,
        }
    }

    pub fn fragile_right(&self) -> bool {
        match self {
            Subtree::Inline(_) => false,
            Subtree::Heap(d) => d.fragile_right,
        }
    }

    pub fn has_changes(&self) -> bool {
        match self {
            Subtree::Inline(t) => t.has_changes,
            Subtree::Heap(d) => d.has_changes,
        }
    }

    pub fn has_external_tokens(&self) -> bool {
        match self {
            Subtree::Inline(_) => false,
            Subtree::Heap(d) => d.has_external_tokens,
        }
    }

    pub fn has_external_scanner_state_change(&self) -> bool {
        match self {
            Subtree::Inline(_) => false,
            Subtree::Heap(d) => d.has_external_scanner_state_change,
        }
    }

    pub fn external_state(&self) -> Option<&ExternalState> {
        match self {
            Subtree::Inline(_) => None,
            Subtree::Heap(d) => d.external_state.as_ref(),
        }
    }

    /// Identity comparison: same heap allocation, or bit-identical inline.
    pub fn same_identity(&self, other: &Subtree) -> bool {
        match (self, other) {
            (Subtree::Heap(a), Subtree::Heap(b)) => Arc::ptr_eq(a, b),
            (Subtree::Inline(a), Subtree::Inline(b)) => {
                a.symbol == b.symbol
                    && a.padding == b.padding
                    && a.size == b.size
                    && a.parse_state == b.parse_state
            }
            _ => false,
        }
    }

    /// Mark an extra token as such after the fact (recovery wraps skipped
    /// tokens into extra error nodes).
    pub fn set_extra(&mut self) {
        match self {
            Subtree::Inline(t) => t.extra = true,
            Subtree::Heap(d) => Arc::make_mut(d).extra = true,
        }
    }

    // --- editing -----------------------------------------------------------

    /// Shift byte/point offsets for a text replacement. Nodes strictly after
    /// the edit (beyond their recorded lookahead) are untouched: their
    /// offsets are relative, so the resize of earlier siblings is their
    /// shift. Nodes overlapping the edit are resized and flagged
    /// `has_changes`, which excludes them from reuse in the next parse.
    pub fn edit(&mut self, edit: &InputEdit) {
        let rel = RelEdit {
            start: Length::new(edit.start_byte, edit.start_point),
            old_end: Length::new(edit.old_end_byte, edit.old_end_point),
            new_end: Length::new(edit.new_end_byte, edit.new_end_point),
        };
        edit_subtree(self, rel);
    }
}

#[derive(Clone, Copy, Debug)]
struct RelEdit {
    start: Length,
    old_end: Length,
    new_end: Length,
}

fn clamp_sub(a: Length, b: Length) -> Length {
    if a.bytes <= b.bytes { Length::ZERO } else { a - b }
}

fn edit_subtree(subtree: &mut Subtree, edit: RelEdit) {
    // A fully clamped-away edit: nothing replaced, nothing inserted.
    if edit.start.bytes == edit.old_end.bytes && edit.start.bytes == edit.new_end.bytes {
        return;
    }

    let padding = subtree.padding();
    let size = subtree.size();
    let total = padding + size;

    // Entirely after this subtree, beyond its lookahead: untouched.
    if edit.start.bytes > total.bytes + subtree.lookahead_bytes() {
        return;
    }

    let (new_padding, new_size) = if edit.old_end.bytes <= padding.bytes
        && edit.start.bytes < padding.bytes
    {
        // Edit confined to the padding.
        (edit.new_end + (padding - edit.old_end), size)
    } else if edit.start.bytes < padding.bytes {
        // Edit starts in padding and runs into content.
        (edit.new_end, clamp_sub(total, edit.old_end))
    } else if edit.start.bytes <= total.bytes {
        // Edit starts in content (or exactly at the end: pure growth).
        let before = edit.start - padding;
        let after = clamp_sub(total, edit.old_end);
        let inserted = edit.new_end - edit.start;
        (padding, before + inserted + after)
    } else {
        // Only the lookahead overlaps: dimensions stand, but the token saw
        // bytes that changed, so it cannot be reused.
        (padding, size)
    };

    match subtree {
        Subtree::Inline(token) => {
            token.padding = new_padding;
            token.size = new_size;
            token.has_changes = true;
            token.parse_state = STATE_NONE;
        }
        Subtree::Heap(arc) => {
            // Old child offsets, before any child is resized.
            let old_offsets: Vec<Length> = {
                let mut acc = Length::ZERO;
                arc.children
                    .iter()
                    .map(|child| {
                        let at = acc;
                        acc += child.total_size();
                        at
                    })
                    .collect()
            };
            let old_totals: Vec<Length> =
                arc.children.iter().map(Subtree::total_size).collect();

            let data = Arc::make_mut(arc);
            data.padding = new_padding;
            data.size = new_size;
            data.has_changes = true;

            // The insertion belongs to the earliest child whose old span
            // contains the edit start; an insertion at the very end goes to
            // the last child.
            let mut owner = None;
            for (i, at) in old_offsets.iter().enumerate() {
                let end = *at + old_totals[i];
                if edit.start.bytes >= at.bytes && edit.start.bytes < end.bytes {
                    owner = Some(i);
                    break;
                }
            }
            if owner.is_none() && !data.children.is_empty() && edit.start.bytes <= total.bytes {
                owner = Some(data.children.len() - 1);
            }

            for (i, child) in data.children.iter_mut().enumerate() {
                let at = old_offsets[i];
                if Some(i) < owner || owner.is_none() {
                    // Before the edit: only a lookahead overlap can matter.
                    let child_end = at + old_totals[i];
                    if edit.start.bytes <= child_end.bytes + child.lookahead_bytes() {
                        edit_subtree(
                            child,
                            RelEdit {
                                start: clamp_sub(edit.start, at),
                                old_end: clamp_sub(edit.old_end, at),
                                new_end: clamp_sub(edit.new_end, at),
                            },
                        );
                    }
                    continue;
                }
                if Some(i) == owner {
                    edit_subtree(
                        child,
                        RelEdit {
                            start: clamp_sub(edit.start, at),
                            old_end: clamp_sub(edit.old_end, at),
                            new_end: clamp_sub(edit.new_end, at),
                        },
                    );
                    continue;
                }
                // After the owner: pure deletion of any overlap.
                if at.bytes >= edit.old_end.bytes {
                    break;
                }
                edit_subtree(
                    child,
                    RelEdit {
                        start: Length::ZERO,
                        old_end: clamp_sub(edit.old_end, at),
                        new_end: Length::ZERO,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stolyar_core::Point;

    fn leaf(bytes: u32) -> Subtree {
        Subtree::Inline(InlineToken {
            symbol: 1,
            parse_state: 1,
            padding: Length::ZERO,
            size: Length::new(bytes, Point::new(0, bytes)),
            lookahead_bytes: 0,
            visible: true,
            named: true,
            extra: false,
            keyword: false,
            has_changes: false,
        })
    }

    fn edit_of(start: u32, old_end: u32, new_end: u32) -> InputEdit {
        InputEdit {
            start_byte: start,
            old_end_byte: old_end,
            new_end_byte: new_end,
            start_point: Point::new(0, start),
            old_end_point: Point::new(0, old_end),
            new_end_point: Point::new(0, new_end),
        }
    }

    #[test]
    fn leaf_edit_within_content_resizes() {
        let mut tree = leaf(10);
        tree.edit(&edit_of(2, 4, 7));
        assert_eq!(tree.size().bytes, 13);
        assert!(tree.has_changes());
    }

    #[test]
    fn leaf_after_edit_is_untouched() {
        // The edit targets bytes before this leaf in absolute terms; after
        // rebasing, the relative edit lies beyond the leaf and is ignored by
        // the parent. Here we simulate a leaf whose relative edit is past
        // its end.
        let mut tree = leaf(3);
        tree.edit(&edit_of(10, 12, 14));
        assert!(!tree.has_changes());
        assert_eq!(tree.size().bytes, 3);
    }

    #[test]
    fn insertion_at_leaf_end_grows_it() {
        let mut tree = leaf(5);
        tree.edit(&edit_of(5, 5, 8));
        assert_eq!(tree.size().bytes, 8);
        assert!(tree.has_changes());
    }

    #[test]
    fn identity_is_pointer_equality_for_heap_nodes() {
        let a = Subtree::new_error_leaf(Length::ZERO, Length::new(1, Point::new(0, 1)), 0);
        let b = a.clone();
        assert!(a.same_identity(&b));
        let c = Subtree::new_error_leaf(Length::ZERO, Length::new(1, Point::new(0, 1)), 0);
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn error_leaf_costs_scale_with_span() {
        let small = Subtree::new_error_leaf(Length::ZERO, Length::new(1, Point::new(0, 1)), 0);
        let large = Subtree::new_error_leaf(Length::ZERO, Length::new(9, Point::new(0, 9)), 0);
        assert!(small.error_cost() < large.error_cost());
    }
}
