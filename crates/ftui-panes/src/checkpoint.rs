#![forbid(unsafe_code)]

//! Periodic model snapshots for error recovery.
//!
//! Capturing a [`ModelState`] clones one `Arc` and the small reference sets,
//! so checkpoints share every untouched subtree with the live model.
//!
//! ```text
//! history:      [c1 c2 c3 c4 c5 c6 c7]
//! checkpoints:        ^cp(seq 3)   ^cp(seq 6)
//!
//! restore cp(seq 6)  -> history [c1 .. c6], redo cleared
//! ```

use std::collections::VecDeque;

use crate::model::{ModelState, TreeModel};

/// One captured model state.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub id: u64,
    pub state: ModelState,
    /// Sequence number of the newest undo entry the state includes; 0 when
    /// the history was empty.
    pub history_seq: u64,
    pub state_hash: u64,
    pub created_ms: u64,
}

/// Bounded checkpoint list, oldest first.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    checkpoints: VecDeque<Checkpoint>,
    max: usize,
    next_id: u64,
}

impl CheckpointStore {
    /// Store keeping at most `max` checkpoints (at least one).
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            checkpoints: VecDeque::new(),
            max: max.max(1),
            next_id: 1,
        }
    }

    /// Capture `model` as the newest checkpoint, evicting the oldest past
    /// the bound.
    pub fn capture(&mut self, model: &TreeModel, history_seq: u64) -> &Checkpoint {
        let checkpoint = Checkpoint {
            id: self.next_id,
            state: model.capture_state(),
            history_seq,
            state_hash: model.state_hash(),
            created_ms: crate::command::now_ms(),
        };
        self.next_id += 1;
        self.checkpoints.push_back(checkpoint);
        while self.checkpoints.len() > self.max {
            self.checkpoints.pop_front();
        }
        &self.checkpoints[self.checkpoints.len() - 1]
    }

    /// Remove and return the newest checkpoint.
    pub fn pop_newest(&mut self) -> Option<Checkpoint> {
        self.checkpoints.pop_back()
    }

    #[must_use]
    pub fn newest(&self) -> Option<&Checkpoint> {
        self.checkpoints.back()
    }

    /// Drop checkpoints that include history newer than `history_seq`.
    /// Returns how many were dropped.
    pub fn discard_after(&mut self, history_seq: u64) -> usize {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|cp| cp.history_seq <= history_seq);
        before - self.checkpoints.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_CHECKPOINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn model() -> TreeModel {
        TreeModel::with_root_pane(ModelConfig::default(), "a").expect("model")
    }

    #[test]
    fn capture_is_bounded() {
        let model = model();
        let mut store = CheckpointStore::new(2);
        store.capture(&model, 1);
        store.capture(&model, 2);
        let newest_id = store.capture(&model, 3).id;
        assert_eq!(store.len(), 2);
        assert_eq!(newest_id, 3);
        let seqs: Vec<u64> = store.iter().map(|cp| cp.history_seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn captured_state_matches_model() {
        let model = model();
        let mut store = CheckpointStore::default();
        let checkpoint = store.capture(&model, 0).clone();
        assert_eq!(checkpoint.state, model.capture_state());
        assert_eq!(checkpoint.state_hash, model.state_hash());
    }

    #[test]
    fn discard_after_drops_newer_history() {
        let model = model();
        let mut store = CheckpointStore::new(4);
        for seq in [2, 4, 6] {
            store.capture(&model, seq);
        }
        assert_eq!(store.discard_after(4), 1);
        assert_eq!(store.newest().map(|cp| cp.history_seq), Some(4));
        assert_eq!(store.pop_newest().map(|cp| cp.history_seq), Some(4));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_bound_still_keeps_one() {
        let mut store = CheckpointStore::new(0);
        store.capture(&model(), 0);
        assert_eq!(store.len(), 1);
    }
}
