#![forbid(unsafe_code)]

//! Structural repair.
//!
//! [`repair`] rewrites the tree bottom-up, fixing every violation marked
//! repairable and recording each change as a [`RepairAction`]. Duplicate ids
//! and inverted size constraints are left in place and show up again in
//! [`RepairOutcome::violations_after`].

use std::sync::Arc;

use serde::Serialize;

use crate::id::{NodeId, PaneId};
use crate::model::TreeModel;
use crate::node::{Node, RATIO_SUM_TOLERANCE, RatioMode, SplitNode, equal_ratios};
use crate::validate::Violation;

/// One change made by [`repair`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    DropEmptySplit {
        split: NodeId,
    },
    CollapseSplit {
        split: NodeId,
        into: NodeId,
    },
    EqualizeRatios {
        split: NodeId,
        children: usize,
    },
    NormalizeRatios {
        split: NodeId,
        before: Vec<f64>,
        after: Vec<f64>,
    },
    DropFocus {
        pane: PaneId,
    },
    DropSelection {
        pane: PaneId,
    },
    DropLock {
        pane: PaneId,
    },
    RebuildRegistries,
}

/// Result of one repair pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub before_hash: u64,
    pub after_hash: u64,
    pub violations_before: Vec<Violation>,
    pub violations_after: Vec<Violation>,
    pub actions: Vec<RepairAction>,
}

impl RepairOutcome {
    /// The model validates after the pass.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations_after.is_empty()
    }
}

/// Fix every repairable violation in place.
pub fn repair(model: &mut TreeModel) -> RepairOutcome {
    let before_hash = model.state_hash();
    let violations_before = model.validate();
    let registries_drifted = !model.validate_registries().is_empty();
    let mode = model.ratio_mode();
    let mut actions = Vec::new();

    if let Some(root) = model.root().cloned() {
        let repaired = repair_node(&root, mode, &mut actions);
        let changed = match &repaired {
            Some(node) => !Arc::ptr_eq(node, &root),
            None => true,
        };
        if changed {
            model.set_root(repaired);
        }
    }

    if registries_drifted {
        model.rebuild_registries();
        actions.push(RepairAction::RebuildRegistries);
    }

    let (focus, selection, locks) = model.retain_live_references();
    if let Some(pane) = focus {
        actions.push(RepairAction::DropFocus { pane });
    }
    actions.extend(
        selection
            .into_iter()
            .map(|pane| RepairAction::DropSelection { pane }),
    );
    actions.extend(locks.into_iter().map(|pane| RepairAction::DropLock { pane }));

    let violations_after = model.validate();
    let after_hash = model.state_hash();
    tracing::debug!(
        target: "ftui.panes",
        before_hash,
        after_hash,
        actions = actions.len(),
        remaining = violations_after.len(),
        "repair pass"
    );
    RepairOutcome {
        before_hash,
        after_hash,
        violations_before,
        violations_after,
        actions,
    }
}

/// Repaired copy of `node`, the same `Arc` when nothing changed, or `None`
/// when the subtree vanishes.
fn repair_node(
    node: &Arc<Node>,
    mode: RatioMode,
    actions: &mut Vec<RepairAction>,
) -> Option<Arc<Node>> {
    let Node::Split(split) = node.as_ref() else {
        return Some(Arc::clone(node));
    };
    let split_id = split.node_id();
    let ratios_aligned = split.ratios().len() == split.len();

    let mut changed = false;
    let mut children = Vec::with_capacity(split.len());
    let mut kept_ratios = Vec::with_capacity(split.len());
    for (index, child) in split.children().iter().enumerate() {
        match repair_node(child, mode, actions) {
            Some(repaired) => {
                changed |= !Arc::ptr_eq(&repaired, child);
                children.push(repaired);
                if ratios_aligned {
                    kept_ratios.push(split.ratios()[index]);
                }
            }
            None => changed = true,
        }
    }

    match children.len() {
        0 => {
            actions.push(RepairAction::DropEmptySplit { split: split_id });
            return None;
        }
        1 => {
            let only = children.pop()?;
            actions.push(RepairAction::CollapseSplit {
                split: split_id,
                into: only.node_id(),
            });
            return Some(only);
        }
        _ => {}
    }

    let ratios = if ratios_aligned {
        let repaired = repair_ratios(&kept_ratios, mode);
        if repaired != kept_ratios || kept_ratios.len() != split.len() {
            changed = true;
            actions.push(RepairAction::NormalizeRatios {
                split: split_id,
                before: split.ratios().to_vec(),
                after: repaired.clone(),
            });
        }
        repaired
    } else {
        changed = true;
        actions.push(RepairAction::EqualizeRatios {
            split: split_id,
            children: children.len(),
        });
        equal_ratios(children.len())
    };

    if !changed {
        return Some(Arc::clone(node));
    }
    Some(Arc::new(Node::Split(SplitNode::new_unchecked(
        split_id,
        split.orientation(),
        children,
        ratios,
    ))))
}

/// Valid ratios as close to `ratios` as possible. Returned unchanged when
/// already valid.
fn repair_ratios(ratios: &[f64], mode: RatioMode) -> Vec<f64> {
    let sum: f64 = ratios.iter().sum();
    let all_valid = ratios.iter().all(|&r| mode.accepts(r));
    if all_valid && (sum - 1.0).abs() <= RATIO_SUM_TOLERANCE {
        return ratios.to_vec();
    }

    // Invalid entries take the mean of the valid ones so they stay visible.
    let valid: Vec<f64> = ratios
        .iter()
        .copied()
        .filter(|&r| mode.accepts(r) && r > 0.0)
        .collect();
    if valid.is_empty() {
        return equal_ratios(ratios.len());
    }
    let fill = valid.iter().sum::<f64>() / valid.len() as f64;
    let filled: Vec<f64> = ratios
        .iter()
        .map(|&r| {
            if mode.accepts(r) && (r > 0.0 || mode == RatioMode::Lenient) {
                r
            } else {
                fill
            }
        })
        .collect();
    let total: f64 = filled.iter().sum();
    if total <= f64::EPSILON {
        return equal_ratios(ratios.len());
    }
    filled.into_iter().map(|r| r / total).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::node::{LeafNode, Orientation};
    use crate::validate::ViolationCode;

    fn nid(raw: u64) -> NodeId {
        NodeId::new(raw).expect("test node id must be non-zero")
    }

    fn pid(raw: u64) -> PaneId {
        PaneId::new(raw).expect("test pane id must be non-zero")
    }

    fn leaf(node: u64, pane: u64) -> Arc<Node> {
        Arc::new(Node::Leaf(LeafNode::new(nid(node), pid(pane), "c")))
    }

    fn model_with(root: Node) -> TreeModel {
        let mut model = TreeModel::default();
        model.set_root(Some(Arc::new(root)));
        model
    }

    #[test]
    fn valid_model_is_untouched() {
        let root = SplitNode::new(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 2)],
            vec![0.4, 0.6],
            RatioMode::Strict,
        )
        .expect("split");
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(outcome.actions.is_empty());
        assert!(outcome.is_clean());
        assert_eq!(outcome.before_hash, outcome.after_hash);
    }

    #[test]
    fn single_child_split_collapses() {
        let inner = SplitNode::new_unchecked(nid(5), Orientation::Vertical, vec![leaf(6, 3)], vec![1.0]);
        let root = SplitNode::new_unchecked(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), Arc::new(Node::Split(inner))],
            vec![0.5, 0.5],
        );
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(outcome.actions.contains(&RepairAction::CollapseSplit {
            split: nid(5),
            into: nid(6),
        }));
        assert!(outcome.is_clean(), "{:?}", outcome.violations_after);
        assert_eq!(model.parent_of(nid(6)), Some(nid(1)));
    }

    #[test]
    fn empty_split_is_dropped_and_parent_rebalanced() {
        let empty = SplitNode::new_unchecked(nid(5), Orientation::Vertical, Vec::new(), Vec::new());
        let root = SplitNode::new_unchecked(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 2), Arc::new(Node::Split(empty))],
            vec![0.25, 0.25, 0.5],
        );
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(outcome.actions.contains(&RepairAction::DropEmptySplit { split: nid(5) }));
        assert!(outcome.is_clean(), "{:?}", outcome.violations_after);
        assert_eq!(model.split(nid(1)).expect("root").ratios(), &[0.5, 0.5]);
    }

    #[test]
    fn bad_ratios_are_renormalized() {
        let root = SplitNode::new_unchecked(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 2), leaf(4, 3)],
            vec![f64::NAN, 0.2, 0.2],
        );
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(outcome.is_clean(), "{:?}", outcome.violations_after);
        let ratios = model.split(nid(1)).expect("root").ratios().to_vec();
        for ratio in &ratios {
            assert!((ratio - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn mismatched_ratio_count_is_equalized() {
        let root = SplitNode::new_unchecked(
            nid(1),
            Orientation::Vertical,
            vec![leaf(2, 1), leaf(3, 2)],
            vec![1.0],
        );
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(outcome.actions.contains(&RepairAction::EqualizeRatios {
            split: nid(1),
            children: 2,
        }));
        assert!(outcome.is_clean());
    }

    #[test]
    fn dangling_references_are_dropped() {
        let mut model = model_with(Node::Leaf(LeafNode::new(nid(1), pid(1), "c")));
        model.set_references_unchecked(Some(pid(4)), BTreeSet::from([pid(1), pid(5)]), BTreeSet::new());
        let outcome = repair(&mut model);
        assert_eq!(
            outcome.actions,
            vec![
                RepairAction::DropFocus { pane: pid(4) },
                RepairAction::DropSelection { pane: pid(5) },
            ]
        );
        assert_eq!(model.selected_pane_ids(), &BTreeSet::from([pid(1)]));
    }

    #[test]
    fn duplicate_ids_survive_repair() {
        let root = SplitNode::new_unchecked(
            nid(1),
            Orientation::Horizontal,
            vec![leaf(2, 1), leaf(3, 1)],
            vec![0.5, 0.5],
        );
        let mut model = model_with(Node::Split(root));
        let outcome = repair(&mut model);
        assert!(!outcome.is_clean());
        assert!(
            outcome
                .violations_after
                .iter()
                .any(|v| v.code == ViolationCode::DuplicatePaneId && !v.repairable)
        );
    }
}
