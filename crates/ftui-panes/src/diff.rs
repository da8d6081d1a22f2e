#![forbid(unsafe_code)]

//! Reconciliation diffs between two layout trees.
//!
//! The differ indexes each tree once (`NodeId` to local properties, parent
//! and ordered child ids, `PaneId` to its leaf) and reports:
//!
//! | Set | Contents |
//! |-----|----------|
//! | `added_nodes` / `removed_nodes` | node ids present on one side only |
//! | `modified_nodes` | shared node ids whose local properties or ordered child list differ |
//! | `added_panes` / `removed_panes` | pane ids present on one side only |
//! | `moved_panes` | shared pane ids whose root-to-leaf path differs |
//!
//! A renderer keeps resources keyed by the ids that survive, rebuilds the
//! modified ones, and reparents the moved panes.
//!
//! Results are `BTreeSet`s so output order is deterministic. Ratios compare
//! bit for bit, so `diff(t, t)` is empty even for a tree holding NaN.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::id::{NodeId, PaneId};
use crate::node::Node;

/// Immutable view of a tree at one point in time.
///
/// Holds the root behind an [`Arc`], so it stays valid and cheap while the
/// live model moves on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeSnapshot {
    root: Option<Arc<Node>>,
}

impl TreeSnapshot {
    #[must_use]
    pub const fn new(root: Option<Arc<Node>>) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Changes that turn `self` into `newer`.
    #[must_use]
    pub fn diff(&self, newer: &Self) -> DiffResult {
        diff(self.root(), newer.root())
    }
}

/// Id-level changes between two trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub added_nodes: BTreeSet<NodeId>,
    pub removed_nodes: BTreeSet<NodeId>,
    pub modified_nodes: BTreeSet<NodeId>,
    pub added_panes: BTreeSet<PaneId>,
    pub removed_panes: BTreeSet<PaneId>,
    pub moved_panes: BTreeSet<PaneId>,
}

impl DiffResult {
    /// No change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.modified_nodes.is_empty()
            && self.added_panes.is_empty()
            && self.removed_panes.is_empty()
            && self.moved_panes.is_empty()
    }

    /// Pane membership is unchanged; only layout or content moved.
    #[must_use]
    pub fn same_panes(&self) -> bool {
        self.added_panes.is_empty() && self.removed_panes.is_empty()
    }
}

struct IndexedNode<'a> {
    node: &'a Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Node ids in pre-order, parents before children, plus a parent link per
/// node. Paths are compared through the parent links, never materialized.
#[derive(Default)]
struct TreeIndex<'a> {
    nodes: FxHashMap<NodeId, IndexedNode<'a>>,
    order: Vec<NodeId>,
    pane_leaves: FxHashMap<PaneId, NodeId>,
}

impl<'a> TreeIndex<'a> {
    fn build(root: Option<&'a Node>) -> Self {
        let mut index = Self::default();
        let Some(root) = root else {
            return index;
        };
        let mut stack: Vec<(&'a Node, Option<NodeId>)> = vec![(root, None)];
        while let Some((node, parent)) = stack.pop() {
            let id = node.node_id();
            // First occurrence wins; duplicate ids are a validation concern.
            if index.nodes.contains_key(&id) {
                continue;
            }
            let children = match node {
                Node::Leaf(leaf) => {
                    index.pane_leaves.entry(leaf.pane_id).or_insert(id);
                    Vec::new()
                }
                Node::Split(split) => {
                    for child in split.children().iter().rev() {
                        stack.push((child.as_ref(), Some(id)));
                    }
                    split.children().iter().map(|child| child.node_id()).collect()
                }
            };
            index.order.push(id);
            index.nodes.insert(
                id,
                IndexedNode {
                    node,
                    parent,
                    children,
                },
            );
        }
        index
    }

    fn parent(&self, id: NodeId) -> Option<Option<NodeId>> {
        self.nodes.get(&id).map(|entry| entry.parent)
    }
}

/// Shared node ids whose whole root-to-node id path is the same in both
/// trees. One pass over `after` in pre-order, so each node only looks at
/// its parent's answer.
fn unchanged_paths(before: &TreeIndex<'_>, after: &TreeIndex<'_>) -> FxHashMap<NodeId, bool> {
    let mut unchanged = FxHashMap::default();
    for &id in &after.order {
        let Some(old_parent) = before.parent(id) else {
            continue;
        };
        let new_parent = after.parent(id).flatten();
        let same = old_parent == new_parent
            && new_parent.is_none_or(|parent| unchanged.get(&parent).copied().unwrap_or(false));
        unchanged.insert(id, same);
    }
    unchanged
}

fn same_local_props(old: &Node, new: &Node) -> bool {
    match (old, new) {
        (Node::Leaf(a), Node::Leaf(b)) => {
            a.pane_id == b.pane_id
                && a.content_ref == b.content_ref
                && a.size_constraints == b.size_constraints
        }
        (Node::Split(a), Node::Split(b)) => {
            a.orientation() == b.orientation()
                && a.ratios().len() == b.ratios().len()
                && a.ratios()
                    .iter()
                    .zip(b.ratios())
                    .all(|(x, y)| x.to_bits() == y.to_bits())
        }
        _ => false,
    }
}

/// Changes that turn `old` into `new`.
#[must_use]
pub fn diff(old: Option<&Node>, new: Option<&Node>) -> DiffResult {
    let before = TreeIndex::build(old);
    let after = TreeIndex::build(new);
    let mut result = DiffResult::default();

    for (id, old_node) in &before.nodes {
        match after.nodes.get(id) {
            None => {
                result.removed_nodes.insert(*id);
            }
            Some(new_node) => {
                if old_node.children != new_node.children
                    || !same_local_props(old_node.node, new_node.node)
                {
                    result.modified_nodes.insert(*id);
                }
            }
        }
    }
    result.added_nodes.extend(
        after
            .nodes
            .keys()
            .filter(|id| !before.nodes.contains_key(id))
            .copied(),
    );

    let unchanged = unchanged_paths(&before, &after);
    for (pane, old_leaf) in &before.pane_leaves {
        match after.pane_leaves.get(pane) {
            None => {
                result.removed_panes.insert(*pane);
            }
            Some(new_leaf) => {
                let same_path =
                    new_leaf == old_leaf && unchanged.get(new_leaf).copied().unwrap_or(false);
                if !same_path {
                    result.moved_panes.insert(*pane);
                }
            }
        }
    }
    result.added_panes.extend(
        after
            .pane_leaves
            .keys()
            .filter(|pane| !before.pane_leaves.contains_key(pane))
            .copied(),
    );

    result
}
