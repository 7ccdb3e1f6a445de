//! The graph-structured stack (GSS).
//!
//! Every active parse branch is a *version*: a head pointing at a node in a
//! shared arena. Nodes hold a parse state, the absolute position reached,
//! and up to eight links to predecessor nodes; a node with several links is
//! a merge point where previously-split branches converged. Popping walks
//! links backwards and can therefore fork: one `pop` yields one slice per
//! distinct path through the merge points it crosses.
//!
//! Nodes are arena-allocated and live until the stack is dropped at the end
//! of the parse; subtree handles on the links keep the persistent tree
//! alive independently of the arena.

use stolyar_core::{Length, StateId};

use crate::external::ExternalState;
use crate::subtree::Subtree;

const MAX_LINK_COUNT: usize = 8;
const MAX_POP_PATHS: usize = 32;

pub(crate) type StackVersion = usize;

type NodeIdx = u32;

#[derive(Clone, Debug)]
struct StackLink {
    node: NodeIdx,
    subtree: Option<Subtree>,
}

#[derive(Clone, Debug)]
struct StackNode {
    state: StateId,
    position: Length,
    links: Vec<StackLink>,
    error_cost: u32,
    node_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HeadStatus {
    Active,
    Halted,
}

#[derive(Clone, Debug)]
struct StackHead {
    node: NodeIdx,
    status: HeadStatus,
    last_external_state: Option<ExternalState>,
    /// Byte offset of the most recent fabricated missing token, used to
    /// stop recovery from inserting twice at one spot.
    last_missing_byte: Option<u32>,
}

/// One path of subtrees popped off a version, oldest first.
#[derive(Debug)]
pub(crate) struct StackSlice {
    pub version: StackVersion,
    pub subtrees: Vec<Subtree>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SummaryEntry {
    pub depth: usize,
    pub state: StateId,
}

pub(crate) struct Stack {
    nodes: Vec<StackNode>,
    heads: Vec<StackHead>,
}

impl Stack {
    pub fn new(start_state: StateId) -> Self {
        let base = StackNode {
            state: start_state,
            position: Length::ZERO,
            links: Vec::new(),
            error_cost: 0,
            node_count: 1,
        };
        Self {
            nodes: vec![base],
            heads: vec![StackHead {
                node: 0,
                status: HeadStatus::Active,
                last_external_state: None,
                last_missing_byte: None,
            }],
        }
    }

    pub fn version_count(&self) -> usize {
        self.heads.len()
    }

    pub fn is_active(&self, version: StackVersion) -> bool {
        self.heads[version].status == HeadStatus::Active
    }

    pub fn active_versions(&self) -> impl Iterator<Item = StackVersion> + '_ {
        self.heads
            .iter()
            .enumerate()
            .filter(|(_, head)| head.status == HeadStatus::Active)
            .map(|(version, _)| version)
    }

    pub fn state(&self, version: StackVersion) -> StateId {
        self.nodes[self.heads[version].node as usize].state
    }

    pub fn position(&self, version: StackVersion) -> Length {
        self.nodes[self.heads[version].node as usize].position
    }

    pub fn error_cost(&self, version: StackVersion) -> u32 {
        self.nodes[self.heads[version].node as usize].error_cost
    }

    pub fn external_state(&self, version: StackVersion) -> Option<&ExternalState> {
        self.heads[version].last_external_state.as_ref()
    }

    pub fn set_external_state(&mut self, version: StackVersion, state: Option<ExternalState>) {
        self.heads[version].last_external_state = state;
    }

    pub fn last_missing_byte(&self, version: StackVersion) -> Option<u32> {
        self.heads[version].last_missing_byte
    }

    pub fn set_last_missing_byte(&mut self, version: StackVersion, byte: u32) {
        self.heads[version].last_missing_byte = Some(byte);
    }

    /// Append a frame to a version's head.
    pub fn push(&mut self, version: StackVersion, subtree: Option<Subtree>, state: StateId) {
        let head_node = self.heads[version].node;
        let pred = &self.nodes[head_node as usize];
        let position = match &subtree {
            Some(subtree) => pred.position + subtree.total_size(),
            None => pred.position,
        };
        let error_cost =
            pred.error_cost + subtree.as_ref().map(Subtree::error_cost).unwrap_or(0);
        let node_count = pred.node_count + 1;
        let node = StackNode {
            state,
            position,
            links: vec![StackLink {
                node: head_node,
                subtree,
            }],
            error_cost,
            node_count,
        };
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(node);
        self.heads[version].node = idx;
    }

    /// Pop frames until `count` non-extra subtrees have been gathered.
    /// Forks at merge points: one slice per distinct path. The first slice
    /// keeps `version`; the rest get fresh versions.
    pub fn pop_count(&mut self, version: StackVersion, count: usize) -> Vec<StackSlice> {
        self.pop_internal(version, Some(count))
    }

    /// Pop everything down to the stack base.
    pub fn pop_all(&mut self, version: StackVersion) -> Vec<StackSlice> {
        self.pop_internal(version, None)
    }

    fn pop_internal(&mut self, version: StackVersion, goal: Option<usize>) -> Vec<StackSlice> {
        struct Path {
            node: NodeIdx,
            subtrees: Vec<Subtree>,
            progress: usize,
        }

        let mut pending = vec![Path {
            node: self.heads[version].node,
            subtrees: Vec::new(),
            progress: 0,
        }];
        let mut done: Vec<(NodeIdx, Vec<Subtree>)> = Vec::new();

        while let Some(path) = pending.pop() {
            if goal == Some(path.progress) {
                done.push((path.node, path.subtrees));
                continue;
            }
            let links = &self.nodes[path.node as usize].links;
            if links.is_empty() {
                // Base reached: with a goal this is a short pop (malformed
                // stack use); without one it is the expected stopping point.
                done.push((path.node, path.subtrees));
                continue;
            }
            let links = links.clone();
            for link in links {
                if pending.len() + done.len() >= MAX_POP_PATHS {
                    break;
                }
                let mut subtrees = path.subtrees.clone();
                let mut progress = path.progress;
                if let Some(subtree) = &link.subtree {
                    if !subtree.extra() {
                        progress += 1;
                    }
                    subtrees.push(subtree.clone());
                }
                pending.push(Path {
                    node: link.node,
                    subtrees,
                    progress,
                });
            }
        }

        let mut slices = Vec::with_capacity(done.len());
        for (i, (node, mut subtrees)) in done.into_iter().enumerate() {
            subtrees.reverse();
            let slice_version = if i == 0 {
                self.heads[version].node = node;
                version
            } else {
                let head = StackHead {
                    node,
                    ..self.heads[version].clone()
                };
                self.heads.push(head);
                self.heads.len() - 1
            };
            slices.push(StackSlice {
                version: slice_version,
                subtrees,
            });
        }
        slices
    }

    /// Duplicate a head for simultaneous shift/reduce exploration.
    pub fn split(&mut self, version: StackVersion) -> StackVersion {
        let head = self.heads[version].clone();
        self.heads.push(head);
        self.heads.len() - 1
    }

    pub fn halt(&mut self, version: StackVersion) {
        self.heads[version].status = HeadStatus::Halted;
    }

    /// Merge version `b` into `a` when both heads sit at the same state and
    /// position with compatible external scanner state. `b` is halted; its
    /// predecessor links become alternative histories of `a`.
    pub fn merge(&mut self, a: StackVersion, b: StackVersion) -> bool {
        let (node_a, node_b) = (self.heads[a].node, self.heads[b].node);
        if self.heads[a].status != HeadStatus::Active || self.heads[b].status != HeadStatus::Active
        {
            return false;
        }
        let (sa, sb) = (&self.nodes[node_a as usize], &self.nodes[node_b as usize]);
        if sa.state != sb.state || sa.position.bytes != sb.position.bytes {
            return false;
        }
        if self.heads[a].last_external_state != self.heads[b].last_external_state {
            return false;
        }
        if node_a != node_b {
            let incoming = self.nodes[node_b as usize].links.clone();
            let cost_b = self.nodes[node_b as usize].error_cost;
            let target = &mut self.nodes[node_a as usize];
            for link in incoming {
                if target.links.len() >= MAX_LINK_COUNT {
                    break;
                }
                let duplicate = target.links.iter().any(|existing| {
                    existing.node == link.node
                        && match (&existing.subtree, &link.subtree) {
                            (Some(x), Some(y)) => x.same_identity(y),
                            (None, None) => true,
                            _ => false,
                        }
                });
                if !duplicate {
                    target.links.push(link);
                }
            }
            target.error_cost = target.error_cost.min(cost_b);
        }
        self.halt(b);
        true
    }

    /// Bounded-depth inventory of the states reachable by popping, used to
    /// pick an error-recovery synchronization point. Follows first links
    /// only, matching what `pop_frames` will actually do.
    pub fn summarize(&self, version: StackVersion, max_depth: usize) -> Vec<SummaryEntry> {
        let mut entries = Vec::new();
        let mut node = self.heads[version].node;
        for depth in 0..=max_depth {
            entries.push(SummaryEntry {
                depth,
                state: self.nodes[node as usize].state,
            });
            match self.nodes[node as usize].links.first() {
                Some(link) => node = link.node,
                None => break,
            }
        }
        entries
    }

    /// Pop exactly `frames` link steps (extras included), single path only.
    /// Used by recovery, where the frame count comes from a summary.
    pub fn pop_frames(&mut self, version: StackVersion, frames: usize) -> Vec<Subtree> {
        let mut subtrees = Vec::new();
        let mut node = self.heads[version].node;
        for _ in 0..frames {
            let Some(link) = self.nodes[node as usize].links.first().cloned() else {
                break;
            };
            if let Some(subtree) = link.subtree {
                subtrees.push(subtree);
            }
            node = link.node;
        }
        self.heads[version].node = node;
        subtrees.reverse();
        subtrees
    }
}
