#![forbid(unsafe_code)]

//! Whole-model invariant checks.
//!
//! Both entry points are read-only and accumulate every violation they find
//! instead of stopping at the first one. Shape checks and registry checks are
//! independent, so a tree whose registries drifted is still reported
//! precisely.

use std::fmt;

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::id::{NodeId, PaneId};
use crate::model::{TreeModel, index_tree};
use crate::node::{Node, RATIO_SUM_TOLERANCE};

/// Stable machine-readable violation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    TooFewChildren,
    RatioCountMismatch,
    RatioOutOfRange,
    RatioSum,
    DuplicatePaneId,
    DuplicateNodeId,
    InvalidConstraints,
    PaneLimitExceeded,
    DepthLimitExceeded,
    DanglingFocus,
    DanglingSelection,
    DanglingLock,
    RegistryMissingPane,
    RegistryStalePane,
    RegistryMissingNode,
    RegistryStaleNode,
    RegistryEntryMismatch,
}

impl ViolationCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooFewChildren => "too_few_children",
            Self::RatioCountMismatch => "ratio_count_mismatch",
            Self::RatioOutOfRange => "ratio_out_of_range",
            Self::RatioSum => "ratio_sum",
            Self::DuplicatePaneId => "duplicate_pane_id",
            Self::DuplicateNodeId => "duplicate_node_id",
            Self::InvalidConstraints => "invalid_constraints",
            Self::PaneLimitExceeded => "pane_limit_exceeded",
            Self::DepthLimitExceeded => "depth_limit_exceeded",
            Self::DanglingFocus => "dangling_focus",
            Self::DanglingSelection => "dangling_selection",
            Self::DanglingLock => "dangling_lock",
            Self::RegistryMissingPane => "registry_missing_pane",
            Self::RegistryStalePane => "registry_stale_pane",
            Self::RegistryMissingNode => "registry_missing_node",
            Self::RegistryStaleNode => "registry_stale_node",
            Self::RegistryEntryMismatch => "registry_entry_mismatch",
        }
    }
}

/// One invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub node_id: Option<NodeId>,
    pub pane_id: Option<PaneId>,
    pub message: String,
    /// Whether [`repair`](crate::repair::repair) can fix it.
    pub repairable: bool,
}

impl Violation {
    fn node(code: ViolationCode, node_id: NodeId, message: String) -> Self {
        Self {
            code,
            node_id: Some(node_id),
            pane_id: None,
            message,
            repairable: true,
        }
    }

    fn pane(code: ViolationCode, pane_id: PaneId, message: String) -> Self {
        Self {
            code,
            node_id: None,
            pane_id: Some(pane_id),
            message,
            repairable: true,
        }
    }

    fn unrepairable(mut self) -> Self {
        self.repairable = false;
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// Shape, uniqueness, and reference invariants.
#[must_use]
pub fn validate_tree(model: &TreeModel) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mode = model.ratio_mode();
    let mut seen_nodes = FxHashSet::default();
    let mut seen_panes = FxHashSet::default();
    let mut max_depth = 0;

    let mut stack: Vec<(&Node, usize)> =
        model.root().map(|root| (root.as_ref(), 1)).into_iter().collect();
    while let Some((node, depth)) = stack.pop() {
        let node_id = node.node_id();
        max_depth = max_depth.max(depth);
        if !seen_nodes.insert(node_id) {
            violations.push(
                Violation::node(
                    ViolationCode::DuplicateNodeId,
                    node_id,
                    format!("node {node_id} is reachable through more than one path"),
                )
                .unrepairable(),
            );
            // Its subtree was already walked.
            continue;
        }
        match node {
            Node::Leaf(leaf) => {
                if !seen_panes.insert(leaf.pane_id) {
                    violations.push(Violation {
                        code: ViolationCode::DuplicatePaneId,
                        node_id: Some(node_id),
                        pane_id: Some(leaf.pane_id),
                        message: format!("pane {} appears more than once", leaf.pane_id),
                        repairable: false,
                    });
                }
                if let Some((axis, min, max)) = leaf.size_constraints.inverted_axis() {
                    violations.push(Violation {
                        code: ViolationCode::InvalidConstraints,
                        node_id: Some(node_id),
                        pane_id: Some(leaf.pane_id),
                        message: format!(
                            "pane {} has max {axis} {max} below min {min}",
                            leaf.pane_id
                        ),
                        repairable: false,
                    });
                }
            }
            Node::Split(split) => {
                let children = split.len();
                let ratios = split.ratios();
                if children < 2 {
                    violations.push(Violation::node(
                        ViolationCode::TooFewChildren,
                        node_id,
                        format!("split {node_id} has {children} children"),
                    ));
                }
                if ratios.len() != children {
                    violations.push(Violation::node(
                        ViolationCode::RatioCountMismatch,
                        node_id,
                        format!(
                            "split {node_id} has {} ratios for {children} children",
                            ratios.len()
                        ),
                    ));
                }
                for (index, &value) in ratios.iter().enumerate() {
                    if !mode.accepts(value) {
                        violations.push(Violation::node(
                            ViolationCode::RatioOutOfRange,
                            node_id,
                            format!("split {node_id} ratio {index} is {value}"),
                        ));
                    }
                }
                if !ratios.is_empty() {
                    let sum: f64 = ratios.iter().sum();
                    if !sum.is_finite() || (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
                        violations.push(Violation::node(
                            ViolationCode::RatioSum,
                            node_id,
                            format!("split {node_id} ratios sum to {sum}"),
                        ));
                    }
                }
                // Reverse so children are visited left to right.
                stack.extend(
                    split
                        .children()
                        .iter()
                        .rev()
                        .map(|child| (child.as_ref(), depth + 1)),
                );
            }
        }
    }

    if let Some(limit) = model.config().max_panes
        && seen_panes.len() > limit
    {
        violations.push(Violation {
            code: ViolationCode::PaneLimitExceeded,
            node_id: None,
            pane_id: None,
            message: format!("{} panes exceed the limit of {limit}", seen_panes.len()),
            repairable: false,
        });
    }

    if let Some(limit) = model.config().max_depth
        && max_depth > limit
    {
        violations.push(Violation {
            code: ViolationCode::DepthLimitExceeded,
            node_id: None,
            pane_id: None,
            message: format!("tree is {max_depth} levels deep, limit is {limit}"),
            repairable: false,
        });
    }

    if let Some(focused) = model.focused_pane_id()
        && !seen_panes.contains(&focused)
    {
        violations.push(Violation::pane(
            ViolationCode::DanglingFocus,
            focused,
            format!("focused pane {focused} is not in the tree"),
        ));
    }
    for &pane in model.selected_pane_ids() {
        if !seen_panes.contains(&pane) {
            violations.push(Violation::pane(
                ViolationCode::DanglingSelection,
                pane,
                format!("selected pane {pane} is not in the tree"),
            ));
        }
    }
    for &pane in model.locked_pane_ids() {
        if !seen_panes.contains(&pane) {
            violations.push(Violation::pane(
                ViolationCode::DanglingLock,
                pane,
                format!("locked pane {pane} is not in the tree"),
            ));
        }
    }

    violations
}

/// Check that both registries are exact bijections with the live tree.
#[must_use]
pub fn validate_registries(model: &TreeModel) -> Vec<Violation> {
    let mut violations = Vec::new();
    let (panes, nodes) = index_tree(model.root().map(|root| root.as_ref()));
    let pane_registry = model.pane_registry();
    let node_registry = model.node_registry();

    for (&pane, &node) in &panes {
        match pane_registry.get(&pane) {
            None => violations.push(Violation::pane(
                ViolationCode::RegistryMissingPane,
                pane,
                format!("pane {pane} is live but not registered"),
            )),
            Some(&registered) if registered != node => violations.push(Violation {
                code: ViolationCode::RegistryEntryMismatch,
                node_id: Some(node),
                pane_id: Some(pane),
                message: format!("pane {pane} registered at {registered}, lives at {node}"),
                repairable: true,
            }),
            Some(_) => {}
        }
    }
    for &pane in pane_registry.keys() {
        if !panes.contains_key(&pane) {
            violations.push(Violation::pane(
                ViolationCode::RegistryStalePane,
                pane,
                format!("pane {pane} is registered but not live"),
            ));
        }
    }

    for (&node, entry) in &nodes {
        match node_registry.get(&node) {
            None => violations.push(Violation::node(
                ViolationCode::RegistryMissingNode,
                node,
                format!("node {node} is live but not registered"),
            )),
            Some(registered) if registered != entry => violations.push(Violation::node(
                ViolationCode::RegistryEntryMismatch,
                node,
                format!("node {node} entry {registered:?} differs from {entry:?}"),
            )),
            Some(_) => {}
        }
    }
    for &node in node_registry.keys() {
        if !nodes.contains_key(&node) {
            violations.push(Violation::node(
                ViolationCode::RegistryStaleNode,
                node,
                format!("node {node} is registered but not live"),
            ));
        }
    }

    // Map iteration order is unspecified; keep reports deterministic.
    violations.sort_by(|a, b| {
        (a.code, a.node_id, a.pane_id).cmp(&(b.code, b.node_id, b.pane_id))
    });
    violations
}
