#![forbid(unsafe_code)]

//! Layout tree nodes.
//!
//! A tree is a closed enum of leaves and N-ary splits. Split children are
//! held behind [`Arc`] so snapshots share structure with the live model;
//! edits go through copy-on-write along the edited path.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StructuralError;
use crate::id::{NodeId, PaneId};

/// Allowed deviation of a split's ratio sum from `1.0`.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-3;

/// Axis along which a split lays out its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Children are placed left to right.
    Horizontal,
    /// Children are placed top to bottom.
    Vertical,
}

/// How strictly ratios are bounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioMode {
    /// Every ratio strictly inside `(0, 1)`.
    #[default]
    Strict,
    /// Ratios may touch `0` or `1` (collapsed children).
    Lenient,
}

impl RatioMode {
    /// Whether a single ratio value is acceptable in this mode.
    #[must_use]
    pub fn accepts(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::Strict => value > 0.0 && value < 1.0,
            Self::Lenient => (0.0..=1.0).contains(&value),
        }
    }
}

/// Per-pane size bounds in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeConstraints {
    pub min_width: u16,
    pub min_height: u16,
    #[serde(default)]
    pub max_width: Option<u16>,
    #[serde(default)]
    pub max_height: Option<u16>,
}

impl SizeConstraints {
    /// Axis whose maximum is below its minimum, if any.
    #[must_use]
    pub fn inverted_axis(self) -> Option<(&'static str, u16, u16)> {
        if let Some(max) = self.max_width
            && max < self.min_width
        {
            return Some(("width", self.min_width, max));
        }
        if let Some(max) = self.max_height
            && max < self.min_height
        {
            return Some(("height", self.min_height, max));
        }
        None
    }
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self {
            min_width: 1,
            min_height: 1,
            max_width: None,
            max_height: None,
        }
    }
}

/// Opaque handle to whatever a pane displays. Stored and forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContentRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal node holding one pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
    pub node_id: NodeId,
    pub pane_id: PaneId,
    pub content_ref: ContentRef,
    pub size_constraints: SizeConstraints,
}

impl LeafNode {
    #[must_use]
    pub fn new(node_id: NodeId, pane_id: PaneId, content_ref: impl Into<ContentRef>) -> Self {
        Self {
            node_id,
            pane_id,
            content_ref: content_ref.into(),
            size_constraints: SizeConstraints::default(),
        }
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: SizeConstraints) -> Self {
        self.size_constraints = constraints;
        self
    }
}

/// Interior node dividing its area among two or more children.
///
/// Checked constructors and mutators keep the local invariants: at least two
/// children, one ratio per child, every ratio valid for the [`RatioMode`],
/// and a ratio sum within [`RATIO_SUM_TOLERANCE`] of `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    node_id: NodeId,
    orientation: Orientation,
    children: Vec<Arc<Node>>,
    ratios: Vec<f64>,
}

impl SplitNode {
    /// Build a split, failing fast if the layout is invalid.
    pub fn new(
        node_id: NodeId,
        orientation: Orientation,
        children: Vec<Arc<Node>>,
        ratios: Vec<f64>,
        mode: RatioMode,
    ) -> Result<Self, StructuralError> {
        check_layout(node_id, children.len(), &ratios, mode)?;
        Ok(Self::new_unchecked(node_id, orientation, children, ratios))
    }

    /// Build a split without any checks.
    ///
    /// Restore and repair pipelines use this and validate the whole tree
    /// afterwards.
    #[must_use]
    pub fn new_unchecked(
        node_id: NodeId,
        orientation: Orientation,
        children: Vec<Arc<Node>>,
        ratios: Vec<f64>,
    ) -> Self {
        Self {
            node_id,
            orientation,
            children,
            ratios,
        }
    }

    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[must_use]
    pub const fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Node>] {
        &self.children
    }

    #[must_use]
    pub fn ratios(&self) -> &[f64] {
        &self.ratios
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of the direct child with `node_id`.
    #[must_use]
    pub fn position_of(&self, node_id: NodeId) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.node_id() == node_id)
    }

    /// Replace all ratios, returning the previous ones.
    pub fn set_ratios(
        &mut self,
        ratios: Vec<f64>,
        mode: RatioMode,
    ) -> Result<Vec<f64>, StructuralError> {
        check_layout(self.node_id, self.children.len(), &ratios, mode)?;
        Ok(std::mem::replace(&mut self.ratios, ratios))
    }

    /// Insert a child at `index` together with the full new ratio vector.
    pub fn insert_child(
        &mut self,
        index: usize,
        child: Arc<Node>,
        ratios: Vec<f64>,
        mode: RatioMode,
    ) -> Result<(), StructuralError> {
        if index > self.children.len() {
            return Err(StructuralError::ChildOutOfBounds {
                node: self.node_id,
                index,
                len: self.children.len(),
            });
        }
        check_layout(self.node_id, self.children.len() + 1, &ratios, mode)?;
        self.children.insert(index, child);
        self.ratios = ratios;
        Ok(())
    }

    /// Remove the child at `index` together with the full new ratio vector.
    ///
    /// A split never drops below two children this way; collapsing a split
    /// is the model's job.
    pub fn remove_child(
        &mut self,
        index: usize,
        ratios: Vec<f64>,
        mode: RatioMode,
    ) -> Result<Arc<Node>, StructuralError> {
        if index >= self.children.len() {
            return Err(StructuralError::ChildOutOfBounds {
                node: self.node_id,
                index,
                len: self.children.len(),
            });
        }
        check_layout(self.node_id, self.children.len() - 1, &ratios, mode)?;
        self.ratios = ratios;
        Ok(self.children.remove(index))
    }

    /// Substitute the child at `index`, keeping sibling order and ratios.
    pub fn replace_child(
        &mut self,
        index: usize,
        child: Arc<Node>,
    ) -> Result<Arc<Node>, StructuralError> {
        match self.children.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, child)),
            None => Err(StructuralError::ChildOutOfBounds {
                node: self.node_id,
                index,
                len: self.children.len(),
            }),
        }
    }

    pub(crate) fn child_mut(&mut self, index: usize) -> Option<&mut Arc<Node>> {
        self.children.get_mut(index)
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Vec<Arc<Node>>, &mut Vec<f64>) {
        (&mut self.children, &mut self.ratios)
    }

    pub(crate) fn into_children(self) -> Vec<Arc<Node>> {
        self.children
    }
}

/// Check the local split invariants.
pub fn check_layout(
    node: NodeId,
    children: usize,
    ratios: &[f64],
    mode: RatioMode,
) -> Result<(), StructuralError> {
    if children < 2 {
        return Err(StructuralError::TooFewChildren {
            node,
            count: children,
        });
    }
    if ratios.len() != children {
        return Err(StructuralError::RatioCountMismatch {
            node,
            ratios: ratios.len(),
            children,
        });
    }
    for (index, &value) in ratios.iter().enumerate() {
        if !mode.accepts(value) {
            return Err(StructuralError::RatioOutOfRange { node, index, value });
        }
    }
    let sum: f64 = ratios.iter().sum();
    if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
        return Err(StructuralError::RatioSum { node, sum });
    }
    Ok(())
}

/// `count` equal shares summing to one.
#[must_use]
pub fn equal_ratios(count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let share = 1.0 / count as f64;
    vec![share; count]
}

/// Scale non-negative finite ratios so they sum to one.
///
/// Falls back to equal shares when nothing usable remains.
#[must_use]
pub fn normalize_ratios(ratios: &[f64]) -> Vec<f64> {
    let cleaned: Vec<f64> = ratios
        .iter()
        .map(|&r| if r.is_finite() && r > 0.0 { r } else { 0.0 })
        .collect();
    let sum: f64 = cleaned.iter().sum();
    if sum <= f64::EPSILON {
        return equal_ratios(ratios.len());
    }
    cleaned.into_iter().map(|r| r / sum).collect()
}

/// Discriminant of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Split,
}

/// A layout tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Split(SplitNode),
}

impl Node {
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        match self {
            Self::Leaf(leaf) => leaf.node_id,
            Self::Split(split) => split.node_id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Leaf(_) => NodeKind::Leaf,
            Self::Split(_) => NodeKind::Split,
        }
    }

    #[must_use]
    pub const fn pane_id(&self) -> Option<PaneId> {
        match self {
            Self::Leaf(leaf) => Some(leaf.pane_id),
            Self::Split(_) => None,
        }
    }

    #[must_use]
    pub const fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Split(_) => None,
        }
    }

    #[must_use]
    pub const fn as_split(&self) -> Option<&SplitNode> {
        match self {
            Self::Split(split) => Some(split),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_split_mut(&mut self) -> Option<&mut SplitNode> {
        match self {
            Self::Split(split) => Some(split),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Split(_) => None,
        }
    }

    /// Pane ids in depth-first, left-to-right order.
    #[must_use]
    pub fn pane_ids(&self) -> Vec<PaneId> {
        let mut out = Vec::new();
        self.for_each(&mut |node| {
            if let Some(pane) = node.pane_id() {
                out.push(pane);
            }
        });
        out
    }

    /// Number of nodes in this subtree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.for_each(&mut |_| count += 1);
        count
    }

    /// Pre-order visit of this subtree.
    pub fn for_each(&self, f: &mut impl FnMut(&Node)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            if let Self::Split(split) = node {
                stack.extend(split.children.iter().rev().map(|child| child.as_ref()));
            }
        }
    }
}

impl From<LeafNode> for Node {
    fn from(leaf: LeafNode) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<SplitNode> for Node {
    fn from(split: SplitNode) -> Self {
        Self::Split(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test node id must be non-zero")
    }

    fn pid(raw: u64) -> PaneId {
        PaneId::new(raw).expect("test pane id must be non-zero")
    }

    fn leaf(node: u64, pane: u64) -> Arc<Node> {
        Arc::new(Node::Leaf(LeafNode::new(nid(node), pid(pane), "content")))
    }

    #[test]
    fn split_rejects_single_child() {
        let err = SplitNode::new(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1)],
            vec![1.0],
            RatioMode::Strict,
        )
        .expect_err("one child is not a split");
        assert!(matches!(err, StructuralError::TooFewChildren { count: 1, .. }));
    }

    #[test]
    fn split_rejects_ratio_count_mismatch() {
        let err = SplitNode::new(
            nid(1),
            Orientation::Vertical,
            vec![leaf(2, 1), leaf(3, 2)],
            vec![1.0],
            RatioMode::Strict,
        )
        .expect_err("mismatch");
        assert!(matches!(err, StructuralError::RatioCountMismatch { .. }));
    }

    #[test]
    fn strict_mode_rejects_zero_but_lenient_accepts() {
        let children = vec![leaf(2, 1), leaf(3, 2)];
        assert!(
            SplitNode::new(
                nid(1),
                Orientation::Horizontal,
                children.clone(),
                vec![0.0, 1.0],
                RatioMode::Strict,
            )
            .is_err()
        );
        assert!(
            SplitNode::new(
                nid(1),
                Orientation::Horizontal,
                children,
                vec![0.0, 1.0],
                RatioMode::Lenient,
            )
            .is_ok()
        );
    }

    #[test]
    fn sum_tolerance_is_applied() {
        let children = vec![leaf(2, 1), leaf(3, 2)];
        assert!(
            SplitNode::new(
                nid(1),
                Orientation::Horizontal,
                children.clone(),
                vec![0.3, 0.7005],
                RatioMode::Strict,
            )
            .is_ok()
        );
        let err = SplitNode::new(
            nid(1),
            Orientation::Horizontal,
            children,
            vec![0.3, 0.6],
            RatioMode::Strict,
        )
        .expect_err("off-sum");
        assert!(matches!(err, StructuralError::RatioSum { .. }));
    }

    #[test]
    fn non_finite_ratio_is_rejected() {
        let err = SplitNode::new(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 2)],
            vec![f64::NAN, 0.5],
            RatioMode::Lenient,
        )
        .expect_err("NaN");
        assert!(matches!(err, StructuralError::RatioOutOfRange { index: 0, .. }));
    }

    #[test]
    fn insert_and_remove_keep_layout_checked() {
        let mut split = SplitNode::new(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 2)],
            vec![0.5, 0.5],
            RatioMode::Strict,
        )
        .expect("valid split");

        split
            .insert_child(1, leaf(4, 3), vec![0.25, 0.25, 0.5], RatioMode::Strict)
            .expect("insert");
        assert_eq!(split.len(), 3);
        assert_eq!(split.children()[1].node_id(), nid(4));

        let removed = split
            .remove_child(1, vec![0.5, 0.5], RatioMode::Strict)
            .expect("remove");
        assert_eq!(removed.node_id(), nid(4));

        // Dropping below two children is refused.
        assert!(split.remove_child(0, vec![1.0], RatioMode::Strict).is_err());
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn normalize_handles_garbage() {
        let ratios = normalize_ratios(&[f64::NAN, -1.0, 3.0, 1.0]);
        assert_eq!(ratios, vec![0.0, 0.0, 0.75, 0.25]);
        assert_eq!(normalize_ratios(&[0.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn constraints_report_inverted_axis() {
        let bad = SizeConstraints {
            min_width: 10,
            min_height: 1,
            max_width: Some(5),
            max_height: None,
        };
        assert_eq!(bad.inverted_axis(), Some(("width", 10, 5)));
        assert_eq!(SizeConstraints::default().inverted_axis(), None);
    }

    #[test]
    fn pane_ids_are_depth_first() {
        let inner = SplitNode::new(
            nid(10),
            Orientation::Vertical,
            vec![leaf(3, 2), leaf(4, 3)],
            vec![0.5, 0.5],
            RatioMode::Strict,
        )
        .expect("inner");
        let root = Node::Split(
            SplitNode::new(
                nid(1),
                Orientation::Horizontal,
                vec![leaf(2, 1), Arc::new(Node::Split(inner))],
                vec![0.5, 0.5],
                RatioMode::Strict,
            )
            .expect("root"),
        );
        assert_eq!(root.pane_ids(), vec![pid(1), pid(2), pid(3)]);
        assert_eq!(root.node_count(), 5);
    }
}
