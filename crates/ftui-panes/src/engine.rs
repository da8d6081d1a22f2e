#![forbid(unsafe_code)]

//! The command engine: the only writer of a [`TreeModel`].
//!
//! # Execution
//!
//! ```text
//! execute(cmd)
//!   validate ──✗──> Err(Validation), model untouched
//!   merge check (only against the entry the engine itself just applied)
//!   execute ──✗──> Err(Execution), partial changes reverted
//!   validate tree + registries ──✗──> recovery ladder, Err(Corruption)
//!   push (or replace top when merged), clear redo, maybe checkpoint
//! ```
//!
//! # Recovery ladder
//!
//! 1. Revert the failing command (undo it, or re-apply it after a bad undo).
//! 2. [`repair`] the tree in place.
//! 3. Restore the newest checkpoint that validates. Invalid checkpoints are
//!    discarded; undo history is truncated to what the checkpoint includes
//!    and redo is cleared.
//! 4. Reset to an empty model with empty history. This cannot fail.
//!
//! Whatever happens, the model is valid when an engine call returns. The
//! [`Recovery`] in an [`EngineFailure`] says which step got it there.
//!
//! # Invariants
//!
//! 1. `undo_depth() <= max_undo_depth` when the bound is set.
//! 2. A new execute clears redo; redo itself does not.
//! 3. Ids freed by undo, rollback, or recovery are never generated again.
//! 4. `execute`, `undo`, and `redo` are rejected while a transaction is open.

use std::collections::VecDeque;
use std::fmt;

use web_time::Instant;

use crate::checkpoint::CheckpointStore;
use crate::command::{Command, CommandKind, CommandRecord, ExecutionResult};
use crate::config::{EngineConfig, PanesConfig};
use crate::diff::TreeSnapshot;
use crate::document::TreeDocument;
use crate::error::{EngineError, EngineFailure, Recovery, RestoreError, TransactionError};
use crate::merge::CommandMerger;
use crate::model::{ModelState, TreeModel};
use crate::observer::{MutationEvent, MutationKind, MutationObserver};
use crate::repair::repair;
use crate::transaction::{Committed, TransactionManager};

#[derive(Debug)]
struct HistoryEntry {
    /// Position in apply order. Kept when a command is merged into the entry.
    seq: u64,
    command: Box<dyn Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastAction {
    None,
    Applied,
    Undone,
}

/// Owns a [`TreeModel`] and its undo/redo history.
///
/// Each engine has its own stacks, so several engines (one per window, say)
/// coexist without sharing state.
pub struct CommandEngine {
    model: TreeModel,
    config: EngineConfig,
    merger: CommandMerger,
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<Box<dyn Command>>,
    next_seq: u64,
    applied_since_checkpoint: usize,
    checkpoints: CheckpointStore,
    transactions: TransactionManager,
    observers: Vec<Box<dyn MutationObserver>>,
    last_action: LastAction,
}

impl fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEngine")
            .field("panes", &self.model.pane_count())
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("checkpoints", &self.checkpoints.len())
            .field("in_transaction", &self.transactions.is_active())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(TreeModel::default(), EngineConfig::default())
    }
}

impl CommandEngine {
    #[must_use]
    pub fn new(model: TreeModel, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            merger: CommandMerger::new(config.merge),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            next_seq: 1,
            applied_since_checkpoint: 0,
            checkpoints: CheckpointStore::new(config.max_checkpoints),
            transactions: TransactionManager::new(),
            observers: Vec::new(),
            last_action: LastAction::None,
        }
    }

    /// Engine over an empty model built from `config`.
    #[must_use]
    pub fn from_config(config: &PanesConfig) -> Self {
        Self::new(TreeModel::new(config.model.clone()), config.engine)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub const fn model(&self) -> &TreeModel {
        &self.model
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only snapshot of the current tree for diffing.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        self.model.snapshot()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Descriptions of undoable commands, most recent first.
    #[must_use]
    pub fn undo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|entry| entry.command.description())
            .collect()
    }

    /// Descriptions of redoable commands, next redo first.
    #[must_use]
    pub fn redo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.redo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|command| command.description())
            .collect()
    }

    #[must_use]
    pub const fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    /// Undo history as serializable records, oldest first.
    #[must_use]
    pub fn history_records(&self) -> Vec<CommandRecord> {
        self.undo_stack
            .iter()
            .map(|entry| entry.command.to_record())
            .collect()
    }

    pub fn add_observer(&mut self, observer: Box<dyn MutationObserver>) {
        self.observers.push(observer);
    }

    // ---------------------------------------------------------------------
    // Execute / undo / redo
    // ---------------------------------------------------------------------

    /// Validate, run, and record `command`.
    pub fn execute(&mut self, command: Box<dyn Command>) -> Result<ExecutionResult, EngineFailure> {
        if self.transactions.is_active() {
            return Err(EngineFailure::rejected(EngineError::TransactionOpen));
        }
        self.apply(command, MutationKind::Execute)
    }

    /// Revert the most recent entry.
    pub fn undo(&mut self) -> Result<ExecutionResult, EngineFailure> {
        if self.transactions.is_active() {
            return Err(EngineFailure::rejected(EngineError::TransactionOpen));
        }
        let Some(entry) = self.undo_stack.pop_back() else {
            return Err(EngineFailure::rejected(EngineError::NothingToUndo));
        };
        let event = MutationEvent {
            kind: MutationKind::Undo,
            command: entry.command.kind(),
            description: entry.command.description().to_string(),
        };
        self.observed(event, |engine| engine.undo_entry(entry))
    }

    /// Re-apply the most recently undone command through the normal execute
    /// path. The rest of the redo stack is kept.
    pub fn redo(&mut self) -> Result<ExecutionResult, EngineFailure> {
        if self.transactions.is_active() {
            return Err(EngineFailure::rejected(EngineError::TransactionOpen));
        }
        let Some(command) = self.redo_stack.pop() else {
            return Err(EngineFailure::rejected(EngineError::NothingToRedo));
        };
        self.apply(command, MutationKind::Redo)
    }

    fn apply(
        &mut self,
        command: Box<dyn Command>,
        kind: MutationKind,
    ) -> Result<ExecutionResult, EngineFailure> {
        let event = MutationEvent {
            kind,
            command: command.kind(),
            description: command.description().to_string(),
        };
        self.observed(event, |engine| {
            engine.apply_command(command, kind == MutationKind::Redo)
        })
    }

    /// Run `body` inside a timed span between the observer callbacks.
    fn observed(
        &mut self,
        event: MutationEvent,
        body: impl FnOnce(&mut Self) -> Result<ExecutionResult, EngineFailure>,
    ) -> Result<ExecutionResult, EngineFailure> {
        let span = tracing::debug_span!(
            target: "ftui.panes",
            "panes.mutation",
            mutation = ?event.kind,
            command = %event.description,
            kind = %event.command,
            duration_us = tracing::field::Empty,
        );
        let _guard = span.enter();
        let start = Instant::now();

        for observer in &mut self.observers {
            observer.before_mutation(&event);
        }
        let outcome = body(self);
        let duration_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        span.record("duration_us", duration_us);
        for observer in &mut self.observers {
            observer.after_mutation(&event, outcome.as_ref());
        }
        outcome
    }

    fn apply_command(
        &mut self,
        command: Box<dyn Command>,
        from_redo: bool,
    ) -> Result<ExecutionResult, EngineFailure> {
        let description = command.description().to_string();

        let validation = command.validate(&self.model);
        if !validation.is_valid() {
            tracing::debug!(
                target: "ftui.panes",
                command = %description,
                errors = validation.errors().len(),
                "command rejected"
            );
            if from_redo {
                self.redo_stack.push(command);
            }
            return Err(EngineFailure::rejected(EngineError::Validation {
                command: description,
                errors: validation.into_errors(),
            }));
        }

        let merged = if self.last_action == LastAction::Applied {
            self.undo_stack
                .back()
                .and_then(|top| self.merger.merge(top.command.as_ref(), command.as_ref()))
        } else {
            None
        };
        let merging = merged.is_some();
        let (mut runnable, original) = match merged {
            Some(merged) => (merged, Some(command)),
            None => (command, None),
        };

        let before = self.model.capture_state();
        let result = runnable.execute(&mut self.model);
        if let Err(source) = result.clone().into_result() {
            let error = EngineError::Execution {
                command: description,
                source,
            };
            let failure = self.revert_to(before, error);
            let reverted = matches!(
                failure.recovery,
                Recovery::NotNeeded | Recovery::CommandUndone
            );
            if from_redo && reverted {
                self.redo_stack.push(original.unwrap_or(runnable));
            }
            return Err(failure);
        }

        let violations = self.model.validate();
        if !violations.is_empty() {
            tracing::warn!(
                target: "ftui.panes",
                command = %description,
                violations = violations.len(),
                "command corrupted the tree"
            );
            let error = EngineError::Corruption {
                command: description,
                violations,
            };
            let reverted = runnable.undo(&mut self.model);
            if reverted.success && self.model.is_valid() {
                // A merged command reverts the entry it was folded into too.
                if merging {
                    self.undo_stack.pop_back();
                }
                tracing::warn!(target: "ftui.panes", "recovered by undoing the command");
                return Err(EngineFailure::new(error, Recovery::CommandUndone));
            }
            return Err(self.escalate(error));
        }

        self.record_applied(runnable, merging, from_redo);
        Ok(result)
    }

    fn undo_entry(&mut self, mut entry: HistoryEntry) -> Result<ExecutionResult, EngineFailure> {
        let description = entry.command.description().to_string();
        let before = self.model.capture_state();
        let result = entry.command.undo(&mut self.model);
        if let Err(source) = result.clone().into_result() {
            self.undo_stack.push_back(entry);
            let error = EngineError::UndoFailed {
                command: description,
                source,
            };
            return Err(self.revert_to(before, error));
        }

        let violations = self.model.validate();
        if !violations.is_empty() {
            tracing::warn!(
                target: "ftui.panes",
                command = %description,
                violations = violations.len(),
                "undo corrupted the tree"
            );
            let error = EngineError::Corruption {
                command: description,
                violations,
            };
            let reapplied = entry.command.execute(&mut self.model);
            if reapplied.success && self.model.is_valid() {
                self.undo_stack.push_back(entry);
                tracing::warn!(target: "ftui.panes", "recovered by re-applying the command");
                return Err(EngineFailure::new(error, Recovery::CommandUndone));
            }
            return Err(self.escalate(error));
        }

        let newest = self.undo_stack.back().map_or(0, |entry| entry.seq);
        let stale = self.checkpoints.discard_after(newest);
        tracing::debug!(
            target: "ftui.panes",
            command = %description,
            stale_checkpoints = stale,
            "command undone"
        );
        self.redo_stack.push(entry.command);
        self.last_action = LastAction::Undone;
        Ok(result)
    }

    fn record_applied(&mut self, command: Box<dyn Command>, merged: bool, from_redo: bool) {
        if merged && let Some(top) = self.undo_stack.back_mut() {
            tracing::debug!(
                target: "ftui.panes",
                command = %command.description(),
                seq = top.seq,
                "merged into previous entry"
            );
            top.command = command;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            tracing::debug!(
                target: "ftui.panes",
                command = %command.description(),
                seq,
                "pushed history entry"
            );
            self.undo_stack.push_back(HistoryEntry { seq, command });
        }
        if !from_redo {
            self.redo_stack.clear();
        }
        if self.config.max_undo_depth > 0 {
            while self.undo_stack.len() > self.config.max_undo_depth {
                self.undo_stack.pop_front();
            }
        }
        self.last_action = LastAction::Applied;

        self.applied_since_checkpoint += 1;
        if self.config.checkpoint_interval > 0
            && self.applied_since_checkpoint >= self.config.checkpoint_interval
        {
            self.checkpoint();
        }
    }

    /// Capture a checkpoint of the current model now.
    pub fn checkpoint(&mut self) {
        let history_seq = self.undo_stack.back().map_or(0, |entry| entry.seq);
        let checkpoint = self.checkpoints.capture(&self.model, history_seq);
        tracing::debug!(
            target: "ftui.panes",
            checkpoint = checkpoint.id,
            history_seq,
            state_hash = checkpoint.state_hash,
            "checkpoint captured"
        );
        self.applied_since_checkpoint = 0;
    }

    /// Put back the state a failed execute or undo started from. Anything the
    /// command changed before failing is discarded.
    fn revert_to(&mut self, before: ModelState, error: EngineError) -> EngineFailure {
        if self.model.capture_state() == before {
            return EngineFailure::rejected(error);
        }
        tracing::warn!(
            target: "ftui.panes",
            %error,
            "failed command left partial changes, reverting"
        );
        self.model.restore_state(before);
        if !self.model.is_valid() {
            return self.escalate(error);
        }
        EngineFailure::new(error, Recovery::CommandUndone)
    }

    /// Steps 2 to 4 of the recovery ladder.
    fn escalate(&mut self, error: EngineError) -> EngineFailure {
        let outcome = repair(&mut self.model);
        if outcome.is_clean() {
            tracing::warn!(
                target: "ftui.panes",
                actions = outcome.actions.len(),
                after_hash = outcome.after_hash,
                "recovered by structural repair"
            );
            return EngineFailure::new(error, Recovery::Repaired);
        }
        tracing::warn!(
            target: "ftui.panes",
            remaining = outcome.violations_after.len(),
            "structural repair incomplete, trying checkpoints"
        );

        let mut tried = 0;
        while let Some(checkpoint) = self.checkpoints.newest().cloned() {
            tried += 1;
            self.model.restore_state(checkpoint.state);
            if self.model.is_valid() {
                self.undo_stack
                    .retain(|entry| entry.seq <= checkpoint.history_seq);
                self.redo_stack.clear();
                self.last_action = LastAction::None;
                tracing::warn!(
                    target: "ftui.panes",
                    checkpoint = checkpoint.id,
                    history_seq = checkpoint.history_seq,
                    "recovered from checkpoint"
                );
                return EngineFailure::new(error, Recovery::CheckpointRestored);
            }
            tracing::warn!(
                target: "ftui.panes",
                checkpoint = checkpoint.id,
                "discarding invalid checkpoint"
            );
            self.checkpoints.pop_newest();
        }

        tracing::error!(
            target: "ftui.panes",
            %error,
            checkpoints_tried = tried,
            "recovery exhausted, resetting to an empty tree"
        );
        self.clear();
        EngineFailure::new(
            EngineError::RecoveryExhausted {
                original: Box::new(error),
                checkpoints_tried: tried,
            },
            Recovery::Reset,
        )
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    pub fn begin_transaction(&mut self, description: impl Into<String>) -> Result<(), EngineError> {
        self.transactions.begin(&self.model, description)?;
        Ok(())
    }

    pub fn add_to_transaction(&mut self, command: Box<dyn Command>) -> Result<(), EngineError> {
        self.transactions.add(command)?;
        Ok(())
    }

    /// Run the open transaction as one undo entry. An empty transaction
    /// succeeds without touching history.
    pub fn commit_transaction(&mut self) -> Result<ExecutionResult, EngineFailure> {
        let Some(description) = self.transactions.description().map(str::to_string) else {
            return Err(EngineFailure::rejected(EngineError::NoTransaction));
        };
        let event = MutationEvent {
            kind: MutationKind::Commit,
            command: CommandKind::Compound,
            description,
        };
        self.observed(event, |engine| match engine.transactions.commit(&mut engine.model) {
            Ok(Committed { command, result }) => {
                if !command.is_empty() {
                    engine.record_applied(Box::new(command), false, false);
                }
                Ok(result)
            }
            Err(err) => {
                let recovery = match err {
                    TransactionError::Corruption { .. } => Recovery::CommandUndone,
                    TransactionError::Execution { index, .. } if index > 0 => {
                        Recovery::CommandUndone
                    }
                    _ => Recovery::NotNeeded,
                };
                Err(EngineFailure::new(err.into(), recovery))
            }
        })
    }

    /// Abandon the open transaction, restoring the model to its begin
    /// snapshot. Returns how many pending commands were dropped.
    pub fn rollback_transaction(&mut self) -> Result<usize, EngineError> {
        Ok(self.transactions.rollback(&mut self.model)?)
    }

    // ---------------------------------------------------------------------
    // Persistence and reset
    // ---------------------------------------------------------------------

    /// Serializable document of the current model.
    #[must_use]
    pub fn save(&self) -> TreeDocument {
        TreeDocument::from_model(&self.model)
    }

    /// Replace the model with `document`. On error nothing changes; on
    /// success history, checkpoints, and any open transaction are dropped.
    pub fn restore(&mut self, document: &TreeDocument) -> Result<(), RestoreError> {
        let mut model = document.restore(self.model.config().clone())?;
        model.merge_ids(self.model.ids());
        if self.transactions.is_active() {
            tracing::warn!(target: "ftui.panes", "restore discards the open transaction");
        }
        self.clear_history();
        self.model = model;
        tracing::info!(
            target: "ftui.panes",
            panes = self.model.pane_count(),
            state_hash = self.model.state_hash(),
            "model restored"
        );
        Ok(())
    }

    /// Empty the model and drop all history. Id counters keep moving
    /// forward.
    pub fn reset(&mut self) {
        tracing::info!(target: "ftui.panes", "engine reset");
        self.clear();
    }

    fn clear(&mut self) {
        self.model.reset();
        self.clear_history();
    }

    fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.checkpoints.clear();
        self.transactions = TransactionManager::new();
        self.applied_since_checkpoint = 0;
        self.last_action = LastAction::None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::command::{
        ClosePane, CreateRootPane, FocusPane, ResizeDivider, SplitDirection, SplitPane,
    };
    use crate::config::{MergeConfig, ModelConfig};
    use crate::id::PaneId;

    fn engine() -> (CommandEngine, PaneId) {
        let model = TreeModel::with_root_pane(ModelConfig::default(), "a").expect("model");
        let pane = model.pane_ids()[0];
        (CommandEngine::new(model, EngineConfig::default()), pane)
    }

    fn split(target: PaneId, ratio: f64) -> Box<dyn Command> {
        Box::new(SplitPane::new(target, SplitDirection::Right, ratio, "x"))
    }

    #[test]
    fn engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandEngine>();
    }

    #[test]
    fn execute_undo_redo() {
        let (mut engine, a) = engine();
        let before = engine.model().capture_state();
        engine.execute(split(a, 0.5)).expect("split");
        let after = engine.model().capture_state();
        assert_eq!(engine.undo_depth(), 1);

        engine.undo().expect("undo");
        assert_eq!(engine.model().capture_state(), before);
        assert_eq!(engine.redo_depth(), 1);

        engine.redo().expect("redo");
        assert_eq!(engine.model().capture_state(), after);
        assert_eq!(engine.redo_depth(), 0);
    }

    #[test]
    fn rejected_command_leaves_everything_alone() {
        let (mut engine, a) = engine();
        let before = engine.model().capture_state();
        let failure = engine.execute(split(a, 1.5)).expect_err("bad ratio");
        assert!(matches!(failure.error, EngineError::Validation { .. }));
        assert_eq!(failure.recovery, Recovery::NotNeeded);
        assert_eq!(engine.model().capture_state(), before);
        assert_eq!(engine.undo_depth(), 0);
    }

    #[test]
    fn empty_stacks_report_nothing_to_do() {
        let mut engine = CommandEngine::default();
        assert_eq!(
            engine.undo().expect_err("empty").error,
            EngineError::NothingToUndo
        );
        assert_eq!(
            engine.redo().expect_err("empty").error,
            EngineError::NothingToRedo
        );
        engine
            .execute(Box::new(CreateRootPane::new("root")))
            .expect("root");
        assert_eq!(engine.model().pane_count(), 1);
    }

    #[test]
    fn new_execute_clears_redo_but_redo_does_not() {
        let (mut engine, a) = engine();
        engine.execute(split(a, 0.5)).expect("first");
        engine.execute(split(a, 0.5)).expect("second");
        engine.undo().expect("undo");
        engine.undo().expect("undo");
        assert_eq!(engine.redo_depth(), 2);
        engine.redo().expect("redo");
        assert_eq!(engine.redo_depth(), 1);
        engine.execute(Box::new(FocusPane::new(Some(a)))).expect("focus");
        assert_eq!(engine.redo_depth(), 0);
    }

    #[test]
    fn depth_bound_evicts_oldest() {
        let model = TreeModel::with_root_pane(ModelConfig::default(), "a").expect("model");
        let a = model.pane_ids()[0];
        let mut engine = CommandEngine::new(model, EngineConfig::default().with_max_undo_depth(2));
        for _ in 0..4 {
            engine.execute(split(a, 0.5)).expect("split");
        }
        assert_eq!(engine.undo_depth(), 2);
        engine.undo().expect("undo");
        engine.undo().expect("undo");
        assert!(engine.undo().is_err());
        assert_eq!(engine.model().pane_count(), 3);
    }

    #[test]
    fn resizes_within_window_merge() {
        let (mut engine, a) = engine();
        engine.execute(split(a, 0.5)).expect("split");
        let root = engine.model().root().expect("root").node_id();
        let ratios = |engine: &CommandEngine| {
            engine
                .model()
                .split(root)
                .expect("split")
                .ratios()
                .to_vec()
        };

        engine
            .execute(Box::new(ResizeDivider::new(root, 0, 0.6).with_timestamp(10_000)))
            .expect("resize");
        engine
            .execute(Box::new(ResizeDivider::new(root, 0, 0.65).with_timestamp(10_050)))
            .expect("resize");
        assert_eq!(engine.undo_depth(), 2);
        assert!((ratios(&engine)[0] - 0.65).abs() < 1e-9);

        engine.undo().expect("undo");
        assert_eq!(ratios(&engine), vec![0.5, 0.5]);
    }

    #[test]
    fn no_merge_after_undo_or_when_disabled() {
        let model = TreeModel::with_root_pane(ModelConfig::default(), "a").expect("model");
        let a = model.pane_ids()[0];
        let config = EngineConfig::default().with_merge(MergeConfig::disabled());
        let mut engine = CommandEngine::new(model, config);
        engine.execute(split(a, 0.5)).expect("split");
        let root = engine.model().root().expect("root").node_id();
        engine
            .execute(Box::new(ResizeDivider::new(root, 0, 0.6).with_timestamp(0)))
            .expect("resize");
        engine
            .execute(Box::new(ResizeDivider::new(root, 0, 0.7).with_timestamp(1)))
            .expect("resize");
        assert_eq!(engine.undo_depth(), 3);
    }

    #[test]
    fn transaction_is_one_undo_entry() {
        let (mut engine, a) = engine();
        let before = engine.model().capture_state();
        engine.begin_transaction("two splits").expect("begin");
        engine.add_to_transaction(split(a, 0.5)).expect("add");
        engine.add_to_transaction(split(a, 0.5)).expect("add");
        assert_eq!(
            engine.execute(split(a, 0.5)).expect_err("open").error,
            EngineError::TransactionOpen
        );
        engine.commit_transaction().expect("commit");
        assert_eq!(engine.undo_depth(), 1);
        assert_eq!(engine.model().pane_count(), 3);
        engine.undo().expect("undo");
        assert_eq!(engine.model().capture_state(), before);
    }

    #[test]
    fn empty_transaction_pushes_nothing() {
        let (mut engine, _) = engine();
        engine.begin_transaction("nothing").expect("begin");
        engine.commit_transaction().expect("commit");
        assert_eq!(engine.undo_depth(), 0);
        assert_eq!(
            engine.commit_transaction().expect_err("closed").error,
            EngineError::NoTransaction
        );
        assert_eq!(engine.rollback_transaction(), Err(EngineError::NoTransaction));
    }

    #[test]
    fn checkpoints_follow_interval() {
        let model = TreeModel::with_root_pane(ModelConfig::default(), "a").expect("model");
        let a = model.pane_ids()[0];
        let config = EngineConfig::default().with_checkpoint_interval(2);
        let mut engine = CommandEngine::new(model, config);
        for _ in 0..5 {
            engine.execute(split(a, 0.5)).expect("split");
        }
        assert_eq!(engine.checkpoints().len(), 2);
        let seqs: Vec<u64> = engine.checkpoints().iter().map(|cp| cp.history_seq).collect();
        assert_eq!(seqs, vec![2, 4]);

        // Undoing past a checkpoint makes it stale.
        engine.undo().expect("undo");
        engine.undo().expect("undo");
        assert_eq!(engine.checkpoints().len(), 1);
    }

    #[test]
    fn observers_see_paired_events() {
        #[derive(Clone, Default)]
        struct Log(Arc<Mutex<Vec<String>>>);

        impl MutationObserver for Log {
            fn before_mutation(&mut self, event: &MutationEvent) {
                if let Ok(mut log) = self.0.lock() {
                    log.push(format!("before {:?}", event.kind));
                }
            }

            fn after_mutation(
                &mut self,
                event: &MutationEvent,
                outcome: Result<&ExecutionResult, &EngineFailure>,
            ) {
                if let Ok(mut log) = self.0.lock() {
                    log.push(format!("after {:?} ok={}", event.kind, outcome.is_ok()));
                }
            }
        }

        let (mut engine, a) = engine();
        let log = Log::default();
        engine.add_observer(Box::new(log.clone()));
        engine.execute(split(a, 0.5)).expect("split");
        let _ = engine.execute(split(a, 2.0));
        engine.undo().expect("undo");

        let entries = log.0.lock().expect("log").clone();
        assert_eq!(
            entries,
            vec![
                "before Execute",
                "after Execute ok=true",
                "before Execute",
                "after Execute ok=false",
                "before Undo",
                "after Undo ok=true",
            ]
        );
    }

    #[test]
    fn history_records_oldest_first() {
        let (mut engine, a) = engine();
        engine.execute(split(a, 0.5)).expect("split");
        engine.execute(Box::new(ClosePane::new(a))).expect("close");
        let kinds: Vec<String> = engine
            .history_records()
            .into_iter()
            .map(|record| record.kind)
            .collect();
        assert_eq!(kinds, vec!["split_pane", "close_pane"]);
    }

    #[test]
    fn reset_clears_model_and_history() {
        let (mut engine, a) = engine();
        engine.execute(split(a, 0.5)).expect("split");
        let next = engine.model().ids().peek_pane();
        engine.reset();
        assert!(engine.model().is_empty());
        assert!(!engine.can_undo());
        // Counters survive the reset.
        assert_eq!(engine.model().ids().peek_pane(), next);
    }
}
