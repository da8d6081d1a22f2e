#![forbid(unsafe_code)]

//! End-to-end pane editing scenarios through the public engine API.
//!
//! Run:
//!   cargo test -p ftui-panes --test scenarios

use std::collections::BTreeSet;

use ftui_panes::{
    ClosePane, Command, CommandEngine, CommandRegistry, EngineConfig, EngineError, FocusPane,
    ModelConfig, MovePane, Node, Orientation, PaneId, Recovery, ResizeDivider, SetPaneLock,
    SplitDirection, SplitPane, SwapPanes, TransactionError, TreeDocument, TreeModel, diff,
};

// ============================================================================
// Helpers
// ============================================================================

fn single_pane_engine(config: EngineConfig) -> (CommandEngine, PaneId) {
    let model = TreeModel::with_root_pane(ModelConfig::default(), "editor").unwrap();
    let root_pane = model.focused_pane_id().unwrap();
    (CommandEngine::new(model, config), root_pane)
}

fn split(target: PaneId, direction: SplitDirection, ratio: f64) -> Box<dyn Command> {
    Box::new(SplitPane::new(target, direction, ratio, "terminal"))
}

fn root_ratios(engine: &CommandEngine) -> Vec<f64> {
    engine
        .model()
        .root()
        .and_then(|root| root.as_split())
        .map(|split| split.ratios().to_vec())
        .unwrap()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
    }
}

// ============================================================================
// Split, undo, redo
// ============================================================================

#[test]
fn split_right_then_undo_restores_single_leaf() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    let before = engine.snapshot();

    engine.execute(split(a, SplitDirection::Right, 0.3)).unwrap();

    let root = engine.model().root().unwrap().clone();
    let split_node = root.as_split().unwrap();
    assert_eq!(split_node.orientation(), Orientation::Horizontal);
    assert_eq!(split_node.len(), 2);
    assert_eq!(split_node.children()[0].as_leaf().unwrap().pane_id, a);
    assert_close(split_node.ratios(), &[0.7, 0.3]);

    engine.undo().unwrap();
    let after_undo = engine.snapshot();
    assert!(before.diff(&after_undo).is_empty());
    assert!(matches!(
        engine.model().root().map(|root| root.as_ref()),
        Some(Node::Leaf(leaf)) if leaf.pane_id == a
    ));
}

#[test]
fn redo_brings_back_the_same_pane_id() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Down, 0.5)).unwrap();
    let panes_after_split: BTreeSet<PaneId> = engine.model().pane_ids().into_iter().collect();

    engine.undo().unwrap();
    engine.redo().unwrap();
    let panes_after_redo: BTreeSet<PaneId> = engine.model().pane_ids().into_iter().collect();
    assert_eq!(panes_after_split, panes_after_redo);

    // A fresh split never reuses anything handed out before.
    engine.execute(split(a, SplitDirection::Down, 0.5)).unwrap();
    let newest = engine
        .model()
        .pane_ids()
        .into_iter()
        .find(|pane| !panes_after_redo.contains(pane))
        .unwrap();
    assert!(panes_after_redo.iter().all(|pane| *pane < newest));
}

// ============================================================================
// Resize merging
// ============================================================================

#[test]
fn rapid_resizes_collapse_into_one_undo_entry() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    let split_id = engine.model().root().unwrap().node_id();
    let depth_after_split = engine.undo_depth();

    engine
        .execute(Box::new(ResizeDivider::new(split_id, 0, 0.6).with_timestamp(50_000)))
        .unwrap();
    engine
        .execute(Box::new(ResizeDivider::new(split_id, 0, 0.65).with_timestamp(50_040)))
        .unwrap();
    assert_eq!(engine.undo_depth(), depth_after_split + 1);
    assert_close(&root_ratios(&engine), &[0.65, 0.35]);

    engine.undo().unwrap();
    assert_close(&root_ratios(&engine), &[0.5, 0.5]);
}

#[test]
fn resizes_outside_window_stay_separate() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    let split_id = engine.model().root().unwrap().node_id();

    engine
        .execute(Box::new(ResizeDivider::new(split_id, 0, 0.6).with_timestamp(1_000)))
        .unwrap();
    engine
        .execute(Box::new(ResizeDivider::new(split_id, 0, 0.65).with_timestamp(5_000)))
        .unwrap();
    engine.undo().unwrap();
    assert_close(&root_ratios(&engine), &[0.6, 0.4]);
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn grid_transaction_with_bad_ratio_reverts_everything() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    let before = engine.snapshot();
    let before_state = engine.model().capture_state();

    let right = SplitPane::new(a, SplitDirection::Right, 0.5, "right");
    let right_pane = PaneId::new(100).unwrap();
    engine.begin_transaction("2x2 grid").unwrap();
    engine
        .add_to_transaction(Box::new(right.with_pane_id(right_pane)))
        .unwrap();
    engine.add_to_transaction(split(a, SplitDirection::Down, 0.5)).unwrap();
    engine
        .add_to_transaction(split(right_pane, SplitDirection::Down, 1.5))
        .unwrap();

    let failure = engine.commit_transaction().unwrap_err();
    assert!(matches!(
        failure.error,
        EngineError::Transaction(TransactionError::Preflight { index: 2, .. })
    ));
    assert_eq!(failure.recovery, Recovery::NotNeeded);
    assert!(!engine.in_transaction());
    assert!(before.diff(&engine.snapshot()).is_empty());
    assert_eq!(engine.model().capture_state(), before_state);
    assert_eq!(engine.undo_depth(), 0);
}

#[test]
fn grid_transaction_commits_as_one_entry() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    let right_pane = PaneId::new(100).unwrap();
    engine.begin_transaction("2x2 grid").unwrap();
    engine
        .add_to_transaction(Box::new(
            SplitPane::new(a, SplitDirection::Right, 0.5, "right").with_pane_id(right_pane),
        ))
        .unwrap();
    engine.add_to_transaction(split(a, SplitDirection::Down, 0.5)).unwrap();
    engine
        .add_to_transaction(split(right_pane, SplitDirection::Down, 0.5))
        .unwrap();
    let result = engine.commit_transaction().unwrap();
    assert!(result.structure_changed);
    assert_eq!(engine.model().pane_count(), 4);
    assert_eq!(engine.undo_depth(), 1);
    assert_eq!(engine.undo_descriptions(1), vec!["2x2 grid"]);

    engine.undo().unwrap();
    assert_eq!(engine.model().pane_count(), 1);
    engine.redo().unwrap();
    assert_eq!(engine.model().pane_count(), 4);
    assert!(engine.model().is_valid());
}

#[test]
fn rollback_restores_begin_state() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    let before = engine.model().capture_state();

    engine.begin_transaction("abandoned").unwrap();
    engine.add_to_transaction(Box::new(ClosePane::new(a))).unwrap();
    assert_eq!(engine.rollback_transaction(), Ok(1));
    assert_eq!(engine.model().capture_state(), before);
    assert_eq!(engine.undo_depth(), 1);
}

// ============================================================================
// Diffing
// ============================================================================

#[test]
fn swapping_two_siblings_only_modifies_their_split() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    let b = engine
        .model()
        .pane_ids()
        .into_iter()
        .find(|pane| *pane != a)
        .unwrap();
    let split_id = engine.model().root().unwrap().node_id();

    let before = engine.snapshot();
    engine.execute(Box::new(SwapPanes::new(a, b))).unwrap();
    let changes = before.diff(&engine.snapshot());

    assert_eq!(changes.modified_nodes, BTreeSet::from([split_id]));
    assert!(changes.added_nodes.is_empty());
    assert!(changes.removed_nodes.is_empty());
    assert!(changes.added_panes.is_empty());
    assert!(changes.removed_panes.is_empty());
}

#[test]
fn moving_a_pane_reports_it_as_moved() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    let b = PaneId::new(50).unwrap();
    let c = PaneId::new(51).unwrap();
    engine
        .execute(Box::new(
            SplitPane::new(a, SplitDirection::Right, 0.5, "b").with_pane_id(b),
        ))
        .unwrap();
    engine
        .execute(Box::new(
            SplitPane::new(b, SplitDirection::Down, 0.5, "c").with_pane_id(c),
        ))
        .unwrap();

    let before = engine.snapshot();
    engine
        .execute(Box::new(MovePane::new(c, a, SplitDirection::Down, 0.5)))
        .unwrap();
    let changes = before.diff(&engine.snapshot());
    assert!(changes.moved_panes.contains(&c));
    assert!(changes.same_panes());
    assert!(engine.model().is_valid());

    engine.undo().unwrap();
    assert!(before.diff(&engine.snapshot()).is_empty());
}

#[test]
fn close_moves_focus_to_a_neighbour_and_undo_restores_it() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    engine.execute(Box::new(FocusPane::new(Some(a)))).unwrap();

    engine.execute(Box::new(ClosePane::new(a))).unwrap();
    let remaining = engine.model().pane_ids();
    assert_eq!(remaining.len(), 1);
    assert_eq!(engine.model().focused_pane_id(), Some(remaining[0]));
    // The split collapsed into its surviving child.
    assert!(engine.model().root().unwrap().as_leaf().is_some());

    engine.undo().unwrap();
    assert_eq!(engine.model().focused_pane_id(), Some(a));
    assert_eq!(engine.model().pane_count(), 2);
}

#[test]
fn locked_panes_refuse_structural_edits() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    engine.execute(Box::new(SetPaneLock::new(a, true))).unwrap();

    let failure = engine.execute(Box::new(ClosePane::new(a))).unwrap_err();
    assert!(matches!(failure.error, EngineError::Validation { .. }));
    assert_eq!(engine.model().pane_count(), 2);

    engine.execute(Box::new(SetPaneLock::new(a, false))).unwrap();
    engine.execute(Box::new(ClosePane::new(a))).unwrap();
    assert_eq!(engine.model().pane_count(), 1);
}

// ============================================================================
// Persistence and replay
// ============================================================================

#[test]
fn saved_document_restores_into_another_engine() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.4)).unwrap();
    engine.execute(split(a, SplitDirection::Down, 0.25)).unwrap();

    let json = engine
        .save()
        .with_metadata("session", "scenario")
        .to_json_pretty()
        .unwrap();
    let document = TreeDocument::from_json(&json).unwrap();

    let mut other = CommandEngine::default();
    other.restore(&document).unwrap();
    let saved_root = engine.model().root().map(|root| root.as_ref());
    let restored_root = other.model().root().map(|root| root.as_ref());
    assert!(diff(saved_root, restored_root).is_empty());
    assert_eq!(other.model().state_hash(), engine.model().state_hash());
    assert!(!other.can_undo());

    // New ids on the restored side do not collide with saved ones.
    other.execute(split(a, SplitDirection::Left, 0.5)).unwrap();
    assert_eq!(other.model().pane_count(), 4);
    assert!(other.model().is_valid());
}

#[test]
fn failed_restore_leaves_engine_untouched() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    let before = engine.model().capture_state();

    let mut document = engine.save();
    document.version = 9;
    assert!(engine.restore(&document).is_err());
    assert_eq!(engine.model().capture_state(), before);
    assert!(engine.can_undo());
}

#[test]
fn history_records_replay_to_the_same_tree() {
    let (mut engine, a) = single_pane_engine(EngineConfig::default());
    engine.execute(split(a, SplitDirection::Right, 0.5)).unwrap();
    engine.execute(split(a, SplitDirection::Down, 0.3)).unwrap();
    let split_id = engine.model().root().unwrap().node_id();
    engine
        .execute(Box::new(ResizeDivider::new(split_id, 0, 0.4)))
        .unwrap();

    let json = serde_json::to_string(&engine.history_records()).unwrap();
    let records: Vec<ftui_panes::CommandRecord> = serde_json::from_str(&json).unwrap();
    let commands = CommandRegistry::with_builtins().decode_all(&records).unwrap();

    let (mut replay, _) = single_pane_engine(EngineConfig::default());
    for command in commands {
        replay.execute(command).unwrap();
    }
    assert_eq!(replay.model().state_hash(), engine.model().state_hash());
}
