//! Borrowed node views over a tree.
//!
//! A `Node` is a lightweight `Copy` value: a subtree reference plus the
//! absolute position where it starts (padding included) and the field it
//! occupies in its parent. Trees store no parent pointers and no absolute
//! offsets; both are reconstructed during traversal, which is what allows
//! subtrees to be shared freely across revisions.
//!
//! Child enumeration is *visible-node* based: invisible subtrees (hidden
//! rules, inlined repetitions) are expanded transparently, so their visible
//! descendants appear as direct children of the visible ancestor, carrying
//! the field of the slot they were reached through.

use stolyar_core::{FieldId, Language, Length, Point, Range, SYM_ERROR, Symbol};

use crate::subtree::Subtree;
use crate::tree::Tree;

#[derive(Clone, Copy)]
pub struct Node<'t> {
    subtree: &'t Subtree,
    /// Absolute start of the subtree, padding included.
    position: Length,
    field: Option<FieldId>,
    tree: &'t Tree,
}

impl<'t> Node<'t> {
    pub(crate) fn new(
        tree: &'t Tree,
        subtree: &'t Subtree,
        position: Length,
        field: Option<FieldId>,
    ) -> Self {
        Self {
            subtree,
            position,
            field,
            tree,
        }
    }

    fn language(&self) -> &'t Language {
        self.tree.language()
    }

    pub fn symbol(&self) -> Symbol {
        self.subtree.symbol()
    }

    /// The symbol's name in the grammar.
    pub fn kind(&self) -> &'t str {
        self.language().symbol_name(self.subtree.symbol())
    }

    pub fn is_named(&self) -> bool {
        self.subtree.named()
    }

    pub fn is_extra(&self) -> bool {
        self.subtree.extra()
    }

    pub fn is_error(&self) -> bool {
        self.subtree.symbol() == SYM_ERROR
    }

    /// Whether this subtree contains any error or missing node.
    pub fn has_error(&self) -> bool {
        self.subtree.has_error()
    }

    pub fn is_missing(&self) -> bool {
        self.subtree.is_missing()
    }

    /// Whether this token was lexed as a keyword through the word token.
    pub fn is_keyword(&self) -> bool {
        self.subtree.is_keyword()
    }

    pub fn start_byte(&self) -> usize {
        (self.position + self.subtree.padding()).bytes as usize
    }

    pub fn end_byte(&self) -> usize {
        (self.position + self.subtree.total_size()).bytes as usize
    }

    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start_byte()..self.end_byte()
    }

    pub fn start_position(&self) -> Point {
        (self.position + self.subtree.padding()).extent
    }

    pub fn end_position(&self) -> Point {
        (self.position + self.subtree.total_size()).extent
    }

    pub fn range(&self) -> Range {
        Range {
            start_byte: self.start_byte() as u32,
            end_byte: self.end_byte() as u32,
            start_point: self.start_position(),
            end_point: self.end_position(),
        }
    }

    /// The field this node occupies in its parent, if any.
    pub fn field_id(&self) -> Option<FieldId> {
        self.field
    }

    pub fn field_name(&self) -> Option<&'t str> {
        self.field.and_then(|field| self.language().field_name(field))
    }

    /// Visible children, hidden subtrees expanded in place.
    pub fn children(&self) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        collect_visible(self.tree, self.subtree, self.position, None, &mut out);
        out
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub fn child(&self, index: usize) -> Option<Node<'t>> {
        self.children().into_iter().nth(index)
    }

    pub fn named_children(&self) -> Vec<Node<'t>> {
        self.children()
            .into_iter()
            .filter(Node::is_named)
            .collect()
    }

    pub fn named_child_count(&self) -> usize {
        self.named_children().len()
    }

    pub fn named_child(&self, index: usize) -> Option<Node<'t>> {
        self.named_children().into_iter().nth(index)
    }

    pub fn child_by_field_id(&self, field: FieldId) -> Option<Node<'t>> {
        self.children()
            .into_iter()
            .find(|child| child.field == Some(field))
    }

    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'t>> {
        let field = self.language().field_id(name)?;
        self.child_by_field_id(field)
    }

    /// The closest visible ancestor. Reconstructed by walking down from the
    /// root; O(depth · branching), no parent pointers by design.
    pub fn parent(&self) -> Option<Node<'t>> {
        let mut current = self.tree.root_node();
        if current == *self {
            return None;
        }
        let mut parent: Option<Node<'t>> = None;
        loop {
            if current == *self {
                return parent;
            }
            let next = current.children().into_iter().find(|child| {
                child.position.bytes <= self.position.bytes
                    && child.end_byte() >= self.end_byte()
            })?;
            parent = Some(current);
            current = next;
        }
    }

    /// Slice of the source this node spans.
    pub fn utf8_text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.byte_range()]
    }

    /// S-expression rendering of this node and its named descendants, with
    /// field prefixes: `(call_expression function: (identifier) ...)`.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        if self.is_missing() {
            out.push_str("(MISSING ");
            out.push_str(self.kind());
            out.push(')');
            return;
        }
        out.push('(');
        out.push_str(self.kind());
        for child in self.children() {
            if !child.is_named() && !child.is_missing() {
                continue;
            }
            out.push(' ');
            if let Some(field) = child.field_name() {
                out.push_str(field);
                out.push_str(": ");
            }
            child.write_sexp(out);
        }
        out.push(')');
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.position.bytes == other.position.bytes
            && self.subtree.same_identity(other.subtree)
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_byte(),
            self.end_byte()
        )
    }
}

/// Gather the visible children of `subtree`, expanding invisible subtrees
/// in place. Children reached through an invisible slot inherit that slot's
/// field unless they carry one of their own.
pub(crate) fn collect_visible<'t>(
    tree: &'t Tree,
    subtree: &'t Subtree,
    position: Length,
    inherited: Option<FieldId>,
    out: &mut Vec<Node<'t>>,
) {
    let language = tree.language();
    let production = (subtree.child_count() > 0 && !subtree.is_error())
        .then(|| language.production(subtree.production_id()));
    let mut at = position;
    let mut slot = 0usize;
    for child in subtree.children() {
        let own_field = if !child.extra() {
            let field = production.as_ref().and_then(|p| p.field_for_slot(slot));
            slot += 1;
            field
        } else {
            None
        };
        let field = own_field.or(inherited);
        if child.visible() || child.is_missing() {
            out.push(Node::new(tree, child, at, field));
        } else if child.child_count() > 0 {
            collect_visible(tree, child, at, field, out);
        }
        at += child.total_size();
    }
}
