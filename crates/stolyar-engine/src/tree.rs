//! The immutable syntax tree handle.
//!
//! A `Tree` owns one root subtree reference plus its language and total
//! source length. Cloning a tree is a refcount bump; two clones share every
//! subtree. `edit` shifts offsets and flags the touched path — it does not
//! re-parse; pass the edited tree as `old_tree` to `Parser::parse` to
//! complete the incremental cycle.

use stolyar_core::{InputEdit, Language, Length, Range};

use crate::cursor::{Preorder, TreeCursor};
use crate::node::Node;
use crate::ranges;
use crate::subtree::Subtree;

#[derive(Clone)]
pub struct Tree {
    root: Subtree,
    language: Language,
    total: Length,
}

impl Tree {
    pub(crate) fn new(root: Subtree, language: Language, total: Length) -> Self {
        Self {
            root,
            language,
            total,
        }
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Total source length this tree was parsed from.
    pub fn len(&self) -> usize {
        self.total.bytes as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total.bytes == 0
    }

    pub fn root_node(&self) -> Node<'_> {
        Node::new(self, &self.root, Length::ZERO, None)
    }

    pub(crate) fn root_subtree(&self) -> &Subtree {
        &self.root
    }

    /// Shift subtree offsets for a text replacement. The result is a
    /// *candidate* tree: consistent for diffing and for feeding back into
    /// `Parser::parse` as `old_tree`, but not a valid parse of the new text
    /// by itself.
    pub fn edit(&mut self, edit: &InputEdit) {
        let old_end = Length::new(edit.old_end_byte, edit.old_end_point);
        let new_end = Length::new(edit.new_end_byte, edit.new_end_point);
        if old_end.bytes <= self.total.bytes {
            self.total = new_end + (self.total - old_end);
        } else {
            self.total = new_end;
        }
        self.root.edit(edit);
    }

    /// Byte/point ranges whose syntax differs between two revisions of the
    /// same document (`self` edited and re-parsed into `other`). Sorted,
    /// non-overlapping, conservative.
    pub fn changed_ranges(&self, other: &Tree) -> Vec<Range> {
        ranges::changed_ranges(&self.root, &other.root)
    }

    /// A cursor positioned at the root.
    pub fn walk(&self) -> TreeCursor<'_> {
        TreeCursor::new(self)
    }

    /// Lazy pre-order traversal of all visible nodes.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder::new(self)
    }

    /// S-expression rendering of the whole tree (named nodes only).
    pub fn to_sexp(&self) -> String {
        self.root_node().to_sexp()
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("language", &self.language.name())
            .field("len", &self.total.bytes)
            .field("has_error", &self.root.has_error())
            .finish()
    }
}
