//! Walker over a previously-parsed tree, yielding candidate subtrees for
//! reuse during an incremental parse.
//!
//! The walker visits the old tree in pre-order with explicit positions. The
//! parser asks for the subtree starting exactly at its current position;
//! unusable candidates are broken down into their children (`descend`) or
//! stepped over (`advance`) until the walker runs out or passes the
//! position.

use stolyar_core::{Length, STATE_NONE};

use crate::subtree::Subtree;

pub(crate) struct ReusableNode<'t> {
    /// Pending nodes, top of the stack is the current candidate. Each entry
    /// carries the absolute position where the node (padding included)
    /// starts.
    stack: Vec<(&'t Subtree, Length)>,
}

impl<'t> ReusableNode<'t> {
    pub fn new(root: &'t Subtree) -> Self {
        Self {
            stack: vec![(root, Length::ZERO)],
        }
    }

    pub fn current(&self) -> Option<(&'t Subtree, Length)> {
        self.stack.last().copied()
    }

    /// Step past the current node without visiting its children.
    pub fn advance(&mut self) {
        self.stack.pop();
    }

    /// Replace the current node by its children.
    pub fn descend(&mut self) {
        let Some((node, position)) = self.stack.pop() else {
            return;
        };
        let mut at = position;
        let mut children: Vec<(&'t Subtree, Length)> = Vec::with_capacity(node.child_count());
        for child in node.children() {
            children.push((child, at));
            at += child.total_size();
        }
        // Reverse so the leftmost child is on top.
        for entry in children.into_iter().rev() {
            self.stack.push(entry);
        }
    }

    /// Find the reusable subtree starting exactly at `position`, breaking
    /// down or skipping nodes as needed. Returns a cloned handle (refcount
    /// bump, no copy).
    pub fn candidate(
        &mut self,
        position: Length,
        can_reuse: impl Fn(&Subtree) -> bool,
    ) -> Option<Subtree> {
        while let Some((node, at)) = self.current() {
            if at.bytes + node.total_bytes() <= position.bytes {
                self.advance();
                continue;
            }
            if at.bytes < position.bytes {
                // Straddles the position: only a child can start there.
                if node.is_leaf() {
                    return None;
                }
                self.descend();
                continue;
            }
            if at.bytes > position.bytes {
                return None;
            }
            if can_reuse(node) {
                let reused = node.clone();
                self.advance();
                return Some(reused);
            }
            if node.is_leaf() {
                return None;
            }
            self.descend();
        }
        None
    }
}

impl Subtree {
    /// Baseline reuse conditions, independent of the parse state: the
    /// subtree must be pristine (unedited, not born of error recovery) and
    /// its first token must have been lexed in a known state.
    pub(crate) fn is_reusable(&self) -> bool {
        !self.has_changes()
            && !self.is_error()
            && !self.is_missing()
            && !self.fragile_left()
            && !self.fragile_right()
            && !self.has_external_tokens()
            && self.total_bytes() > 0
            && self.first_leaf_parse_state() != STATE_NONE
    }
}
