#![forbid(unsafe_code)]

//! The layout tree model.
//!
//! [`TreeModel`] owns the root node, the id generators, focus/selection/lock
//! state, and two derived registries:
//!
//! - `pane_registry`: pane id to the node id of its leaf.
//! - `node_registry`: node id to its [`NodeEntry`] (parent, child index,
//!   kind, pane id).
//!
//! The registries are rebuilt by a full traversal after every structural
//! edit, so there are no live parent pointers to keep in sync. Mutation
//! outside this crate goes through [`Command`](crate::Command)
//! implementations calling the checked methods below.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelConfig;
use crate::diff::TreeSnapshot;
use crate::error::{ModelError, StructuralError};
use crate::id::{IdAllocator, NodeId, PaneId};
use crate::node::{LeafNode, Node, NodeKind, RatioMode, SplitNode};
use crate::validate::{self, Violation};

/// Derived position of a node inside the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEntry {
    /// Parent split, `None` for the root.
    pub parent: Option<NodeId>,
    /// Index among the parent's children (0 for the root).
    pub index: usize,
    pub kind: NodeKind,
    /// Pane id for leaves.
    pub pane_id: Option<PaneId>,
}

/// Cheap copy of the mutable model state.
///
/// Holds the root behind an [`Arc`], so capturing is O(1) and untouched
/// subtrees stay shared with the live model. Id counters are not part of
/// the state.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    root: Option<Arc<Node>>,
    focused_pane_id: Option<PaneId>,
    selected_pane_ids: BTreeSet<PaneId>,
    locked_pane_ids: BTreeSet<PaneId>,
}

impl ModelState {
    #[must_use]
    pub fn root(&self) -> Option<&Arc<Node>> {
        self.root.as_ref()
    }
}

/// Recursive split-pane layout tree.
#[derive(Debug, Clone)]
pub struct TreeModel {
    root: Option<Arc<Node>>,
    pane_registry: FxHashMap<PaneId, NodeId>,
    node_registry: FxHashMap<NodeId, NodeEntry>,
    focused_pane_id: Option<PaneId>,
    selected_pane_ids: BTreeSet<PaneId>,
    locked_pane_ids: BTreeSet<PaneId>,
    ids: IdAllocator,
    config: ModelConfig,
}

impl Default for TreeModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl TreeModel {
    /// Empty model.
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        Self {
            root: None,
            pane_registry: FxHashMap::default(),
            node_registry: FxHashMap::default(),
            focused_pane_id: None,
            selected_pane_ids: BTreeSet::new(),
            locked_pane_ids: BTreeSet::new(),
            ids: IdAllocator::default(),
            config,
        }
    }

    /// Model holding a single focused pane.
    pub fn with_root_pane(
        config: ModelConfig,
        content_ref: impl Into<crate::node::ContentRef>,
    ) -> Result<Self, ModelError> {
        let mut model = Self::new(config);
        let node_id = model.generate_node_id()?;
        let pane_id = model.generate_pane_id()?;
        model.set_root(Some(Arc::new(Node::Leaf(LeafNode::new(
            node_id,
            pane_id,
            content_ref,
        )))));
        model.focused_pane_id = Some(pane_id);
        Ok(model)
    }

    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    #[must_use]
    pub const fn ratio_mode(&self) -> RatioMode {
        self.config.ratio_mode
    }

    #[must_use]
    pub fn root(&self) -> Option<&Arc<Node>> {
        self.root.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[must_use]
    pub const fn focused_pane_id(&self) -> Option<PaneId> {
        self.focused_pane_id
    }

    #[must_use]
    pub const fn selected_pane_ids(&self) -> &BTreeSet<PaneId> {
        &self.selected_pane_ids
    }

    #[must_use]
    pub const fn locked_pane_ids(&self) -> &BTreeSet<PaneId> {
        &self.locked_pane_ids
    }

    #[must_use]
    pub fn is_locked(&self, pane: PaneId) -> bool {
        self.locked_pane_ids.contains(&pane)
    }

    #[must_use]
    pub fn pane_registry(&self) -> &FxHashMap<PaneId, NodeId> {
        &self.pane_registry
    }

    #[must_use]
    pub fn node_registry(&self) -> &FxHashMap<NodeId, NodeEntry> {
        &self.node_registry
    }

    #[must_use]
    pub fn pane_count(&self) -> usize {
        self.pane_registry.len()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_registry.len()
    }

    #[must_use]
    pub fn contains_pane(&self, pane: PaneId) -> bool {
        self.pane_registry.contains_key(&pane)
    }

    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.node_registry.contains_key(&node)
    }

    #[must_use]
    pub fn entry(&self, node: NodeId) -> Option<&NodeEntry> {
        self.node_registry.get(&node)
    }

    #[must_use]
    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.node_registry.get(&node).and_then(|entry| entry.parent)
    }

    /// Node ids from the root down to `node`, inclusive.
    #[must_use]
    pub fn path_to(&self, node: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![node];
        let mut current = self.node_registry.get(&node)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.node_registry.get(&parent)?;
        }
        path.reverse();
        Some(path)
    }

    /// Nodes on the path from the root to `node`, both included.
    #[must_use]
    pub fn depth_of(&self, node: NodeId) -> Option<usize> {
        let mut depth = 1;
        let mut current = self.node_registry.get(&node)?;
        while let Some(parent) = current.parent {
            depth += 1;
            current = self.node_registry.get(&parent)?;
        }
        Some(depth)
    }

    /// Pane ids in depth-first, left-to-right order.
    #[must_use]
    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.root
            .as_deref()
            .map(Node::pane_ids)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        let path = self.index_path(id)?;
        let mut node: &Node = self.root.as_deref()?;
        for index in path {
            node = node.as_split()?.children().get(index).map(Arc::as_ref)?;
        }
        (node.node_id() == id).then_some(node)
    }

    /// Shared handle to the subtree rooted at `id`.
    #[must_use]
    pub fn node_arc(&self, id: NodeId) -> Option<Arc<Node>> {
        let entry = self.node_registry.get(&id)?;
        let node = match entry.parent {
            None => self.root.clone()?,
            Some(parent) => self.split(parent)?.children().get(entry.index)?.clone(),
        };
        (node.node_id() == id).then_some(node)
    }

    #[must_use]
    pub fn split(&self, id: NodeId) -> Option<&SplitNode> {
        self.node(id).and_then(Node::as_split)
    }

    #[must_use]
    pub fn leaf(&self, pane: PaneId) -> Option<&LeafNode> {
        let node_id = *self.pane_registry.get(&pane)?;
        self.node(node_id).and_then(Node::as_leaf)
    }

    /// Node id of the leaf holding `pane`.
    pub fn leaf_node_id(&self, pane: PaneId) -> Result<NodeId, ModelError> {
        self.pane_registry
            .get(&pane)
            .copied()
            .ok_or(ModelError::PaneNotFound(pane))
    }

    // ---------------------------------------------------------------------
    // Id generation
    // ---------------------------------------------------------------------

    pub fn generate_pane_id(&mut self) -> Result<PaneId, ModelError> {
        self.ids.allocate_pane()
    }

    pub fn generate_node_id(&mut self) -> Result<NodeId, ModelError> {
        self.ids.allocate_node()
    }

    /// Bump the pane counter past an explicitly supplied id.
    pub fn reserve_pane_id(&mut self, id: PaneId) -> Result<(), ModelError> {
        self.ids.reserve_pane(id)
    }

    /// Bump the node counter past an explicitly supplied id.
    pub fn reserve_node_id(&mut self, id: NodeId) -> Result<(), ModelError> {
        self.ids.reserve_node(id)
    }

    #[must_use]
    pub const fn ids(&self) -> IdAllocator {
        self.ids
    }

    pub(crate) fn merge_ids(&mut self, other: IdAllocator) {
        self.ids = self.ids.max(other);
    }

    // ---------------------------------------------------------------------
    // Structural edits
    // ---------------------------------------------------------------------

    /// Replace the whole tree. Returns the previous root.
    pub fn set_root(&mut self, root: Option<Arc<Node>>) -> Option<Arc<Node>> {
        let previous = std::mem::replace(&mut self.root, root);
        self.rebuild_registries();
        previous
    }

    /// Substitute the subtree rooted at `old` with `new`, keeping its
    /// position among its siblings. Returns the detached subtree.
    pub fn replace_node(
        &mut self,
        old: NodeId,
        new: impl Into<Arc<Node>>,
    ) -> Result<Arc<Node>, ModelError> {
        let entry = *self
            .node_registry
            .get(&old)
            .ok_or(ModelError::NodeNotFound(old))?;
        let new = new.into();
        let detached = match entry.parent {
            None => self
                .root
                .replace(new)
                .ok_or(ModelError::NodeNotFound(old))?,
            Some(parent) => self
                .split_mut(parent)?
                .replace_child(entry.index, new)?,
        };
        self.rebuild_registries();
        Ok(detached)
    }

    /// Run a checked edit against one split and re-derive the registries.
    pub fn edit_split<R>(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut SplitNode, RatioMode) -> Result<R, StructuralError>,
    ) -> Result<R, ModelError> {
        let mode = self.config.ratio_mode;
        let result = edit(self.split_mut(id)?, mode)?;
        self.rebuild_registries();
        Ok(result)
    }

    /// Edit the leaf holding `pane` in place.
    pub fn edit_leaf<R>(
        &mut self,
        pane: PaneId,
        edit: impl FnOnce(&mut LeafNode) -> R,
    ) -> Result<R, ModelError> {
        let node_id = self.leaf_node_id(pane)?;
        let path = self
            .index_path(node_id)
            .ok_or(ModelError::NodeNotFound(node_id))?;
        let leaf = self
            .node_mut_at(&path)
            .and_then(Node::as_leaf_mut)
            .ok_or(ModelError::PaneNotFound(pane))?;
        let result = edit(leaf);
        self.rebuild_registries();
        Ok(result)
    }

    fn split_mut(&mut self, id: NodeId) -> Result<&mut SplitNode, ModelError> {
        let path = self.index_path(id).ok_or(ModelError::NodeNotFound(id))?;
        let node = self
            .node_mut_at(&path)
            .ok_or(ModelError::NodeNotFound(id))?;
        node.as_split_mut().ok_or(ModelError::NotASplit(id))
    }

    /// Child indices from the root down to `id`.
    fn index_path(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        loop {
            let entry = self.node_registry.get(&current)?;
            match entry.parent {
                Some(parent) => {
                    path.push(entry.index);
                    current = parent;
                }
                None => break,
            }
        }
        path.reverse();
        Some(path)
    }

    /// Copy-on-write walk to the node at `path`.
    fn node_mut_at(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = Arc::make_mut(self.root.as_mut()?);
        for &index in path {
            node = Arc::make_mut(node.as_split_mut()?.child_mut(index)?);
        }
        Some(node)
    }

    pub(crate) fn rebuild_registries(&mut self) {
        let (panes, nodes) = index_tree(self.root.as_deref());
        self.pane_registry = panes;
        self.node_registry = nodes;
    }

    // ---------------------------------------------------------------------
    // Focus, selection, locks
    // ---------------------------------------------------------------------

    /// Set focus, returning the previous value.
    pub fn set_focus(&mut self, pane: Option<PaneId>) -> Result<Option<PaneId>, ModelError> {
        if let Some(pane) = pane
            && !self.contains_pane(pane)
        {
            return Err(ModelError::PaneNotFound(pane));
        }
        Ok(std::mem::replace(&mut self.focused_pane_id, pane))
    }

    /// Replace the selection, returning the previous one.
    pub fn set_selection(
        &mut self,
        panes: BTreeSet<PaneId>,
    ) -> Result<BTreeSet<PaneId>, ModelError> {
        if let Some(missing) = panes.iter().find(|pane| !self.contains_pane(**pane)) {
            return Err(ModelError::PaneNotFound(*missing));
        }
        Ok(std::mem::replace(&mut self.selected_pane_ids, panes))
    }

    /// Lock or unlock a pane, returning whether it was locked before.
    pub fn set_locked(&mut self, pane: PaneId, locked: bool) -> Result<bool, ModelError> {
        if !self.contains_pane(pane) {
            return Err(ModelError::PaneNotFound(pane));
        }
        let was_locked = self.locked_pane_ids.contains(&pane);
        if locked {
            self.locked_pane_ids.insert(pane);
        } else {
            self.locked_pane_ids.remove(&pane);
        }
        Ok(was_locked)
    }

    /// Drop focus/selection/lock references to panes that are not live.
    ///
    /// Returns the ids that were dropped, in (focus, selection, locks) order.
    pub(crate) fn retain_live_references(
        &mut self,
    ) -> (Option<PaneId>, Vec<PaneId>, Vec<PaneId>) {
        let registry = &self.pane_registry;
        let dropped_focus = self
            .focused_pane_id
            .filter(|pane| !registry.contains_key(pane));
        if dropped_focus.is_some() {
            self.focused_pane_id = None;
        }
        let dropped_selection: Vec<PaneId> = self
            .selected_pane_ids
            .iter()
            .copied()
            .filter(|pane| !registry.contains_key(pane))
            .collect();
        self.selected_pane_ids
            .retain(|pane| registry.contains_key(pane));
        let dropped_locks: Vec<PaneId> = self
            .locked_pane_ids
            .iter()
            .copied()
            .filter(|pane| !registry.contains_key(pane))
            .collect();
        self.locked_pane_ids.retain(|pane| registry.contains_key(pane));
        (dropped_focus, dropped_selection, dropped_locks)
    }

    // ---------------------------------------------------------------------
    // State capture
    // ---------------------------------------------------------------------

    /// O(1) copy of the current state.
    #[must_use]
    pub fn capture_state(&self) -> ModelState {
        ModelState {
            root: self.root.clone(),
            focused_pane_id: self.focused_pane_id,
            selected_pane_ids: self.selected_pane_ids.clone(),
            locked_pane_ids: self.locked_pane_ids.clone(),
        }
    }

    /// Return to a captured state. Id counters keep moving forward.
    pub fn restore_state(&mut self, state: ModelState) {
        self.root = state.root;
        self.focused_pane_id = state.focused_pane_id;
        self.selected_pane_ids = state.selected_pane_ids;
        self.locked_pane_ids = state.locked_pane_ids;
        self.rebuild_registries();
    }

    /// Read-only snapshot for diffing.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot::new(self.root.clone())
    }

    /// Empty the tree. Id counters are kept.
    pub fn reset(&mut self) {
        self.root = None;
        self.focused_pane_id = None;
        self.selected_pane_ids.clear();
        self.locked_pane_ids.clear();
        self.pane_registry.clear();
        self.node_registry.clear();
    }

    #[cfg(test)]
    pub(crate) fn registries_mut(
        &mut self,
    ) -> (
        &mut FxHashMap<PaneId, NodeId>,
        &mut FxHashMap<NodeId, NodeEntry>,
    ) {
        (&mut self.pane_registry, &mut self.node_registry)
    }

    pub(crate) fn set_references_unchecked(
        &mut self,
        focused: Option<PaneId>,
        selected: BTreeSet<PaneId>,
        locked: BTreeSet<PaneId>,
    ) {
        self.focused_pane_id = focused;
        self.selected_pane_ids = selected;
        self.locked_pane_ids = locked;
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Shape invariants of the tree, all violations accumulated.
    #[must_use]
    pub fn validate_tree(&self) -> Vec<Violation> {
        validate::validate_tree(self)
    }

    /// Registry bijection check against a fresh traversal.
    #[must_use]
    pub fn validate_registries(&self) -> Vec<Violation> {
        validate::validate_registries(self)
    }

    /// Full validation: tree shape, registries, and references.
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = self.validate_tree();
        violations.extend(self.validate_registries());
        violations
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Deterministic structural hash for logs and replay diagnostics.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0001_0000_01b3;

        fn mix_bytes(hash: &mut u64, bytes: &[u8]) {
            for byte in bytes {
                *hash ^= u64::from(*byte);
                *hash = hash.wrapping_mul(PRIME);
            }
        }

        fn mix_u64(hash: &mut u64, value: u64) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_opt_u16(hash: &mut u64, value: Option<u16>) {
            match value {
                Some(value) => {
                    mix_bytes(hash, &[1]);
                    mix_bytes(hash, &value.to_le_bytes());
                }
                None => mix_bytes(hash, &[0]),
            }
        }

        fn mix_node(hash: &mut u64, node: &Node) {
            match node {
                Node::Leaf(leaf) => {
                    mix_bytes(hash, &[0]);
                    mix_u64(hash, leaf.node_id.get());
                    mix_u64(hash, leaf.pane_id.get());
                    let content = leaf.content_ref.as_str();
                    mix_u64(hash, content.len() as u64);
                    mix_bytes(hash, content.as_bytes());
                    let constraints = leaf.size_constraints;
                    mix_bytes(hash, &constraints.min_width.to_le_bytes());
                    mix_bytes(hash, &constraints.min_height.to_le_bytes());
                    mix_opt_u16(hash, constraints.max_width);
                    mix_opt_u16(hash, constraints.max_height);
                }
                Node::Split(split) => {
                    mix_bytes(hash, &[1]);
                    mix_u64(hash, split.node_id().get());
                    mix_bytes(hash, &[split.orientation() as u8]);
                    mix_u64(hash, split.len() as u64);
                    for ratio in split.ratios() {
                        mix_u64(hash, ratio.to_bits());
                    }
                    for child in split.children() {
                        mix_node(hash, child);
                    }
                }
            }
        }

        let mut hash = OFFSET_BASIS;
        match &self.root {
            Some(root) => mix_node(&mut hash, root),
            None => mix_bytes(&mut hash, &[0xff]),
        }
        mix_u64(&mut hash, self.focused_pane_id.map_or(0, PaneId::get));
        mix_u64(&mut hash, self.selected_pane_ids.len() as u64);
        for pane in &self.selected_pane_ids {
            mix_u64(&mut hash, pane.get());
        }
        mix_u64(&mut hash, self.locked_pane_ids.len() as u64);
        for pane in &self.locked_pane_ids {
            mix_u64(&mut hash, pane.get());
        }
        hash
    }
}

/// Fresh registries for the tree under `root`.
pub(crate) fn index_tree(
    root: Option<&Node>,
) -> (FxHashMap<PaneId, NodeId>, FxHashMap<NodeId, NodeEntry>) {
    let mut panes = FxHashMap::default();
    let mut nodes = FxHashMap::default();
    let mut stack: Vec<(&Node, Option<NodeId>, usize)> =
        root.map(|root| (root, None, 0)).into_iter().collect();
    while let Some((node, parent, index)) = stack.pop() {
        let node_id = node.node_id();
        if nodes.contains_key(&node_id) {
            // Duplicate id: keep the first occurrence and let validation report it.
            continue;
        }
        nodes.insert(
            node_id,
            NodeEntry {
                parent,
                index,
                kind: node.kind(),
                pane_id: node.pane_id(),
            },
        );
        match node {
            Node::Leaf(leaf) => {
                panes.entry(leaf.pane_id).or_insert(node_id);
            }
            Node::Split(split) => {
                for (child_index, child) in split.children().iter().enumerate().rev() {
                    stack.push((child.as_ref(), Some(node_id), child_index));
                }
            }
        }
    }
    (panes, nodes)
}
