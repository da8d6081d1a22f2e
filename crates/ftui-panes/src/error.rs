#![forbid(unsafe_code)]

//! Error taxonomy for the pane model, commands, transactions, and engine.
//!
//! | Type | Meaning | Model afterwards |
//! |------|---------|------------------|
//! | [`ValidationError`] | precondition unmet, command rejected | untouched |
//! | [`StructuralError`] | split invariant violated at construction | untouched |
//! | [`CommandError`] | a command's own execute/undo failed | rolled back |
//! | [`EngineError::Corruption`] | post-execute validation failed | recovered |
//! | [`EngineError::RecoveryExhausted`] | checkpoints exhausted | reset to empty |

use std::fmt::Display;

use thiserror::Error;

use crate::command::CommandKind;
use crate::id::{NodeId, PaneId};
use crate::validate::Violation;

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Invariant violated while building or reshaping a split node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("split {node} has {count} children, needs at least 2")]
    TooFewChildren { node: NodeId, count: usize },
    #[error("split {node} has {ratios} ratios for {children} children")]
    RatioCountMismatch {
        node: NodeId,
        ratios: usize,
        children: usize,
    },
    #[error("split {node} ratios sum to {sum}, expected 1.0")]
    RatioSum { node: NodeId, sum: f64 },
    #[error("split {node} ratio {value} at index {index} is out of range")]
    RatioOutOfRange {
        node: NodeId,
        index: usize,
        value: f64,
    },
    #[error("child index {index} out of bounds for split {node} with {len} children")]
    ChildOutOfBounds {
        node: NodeId,
        index: usize,
        len: usize,
    },
}

/// Lookup and allocation failures against a [`TreeModel`](crate::TreeModel).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{kind} id 0 is invalid")]
    ZeroId { kind: &'static str },
    #[error("{kind} id space exhausted")]
    IdOverflow { kind: &'static str },
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("pane {0} not found")]
    PaneNotFound(PaneId),
    #[error("node {0} is not a split")]
    NotASplit(NodeId),
    #[error("tree is empty")]
    EmptyTree,
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// A command precondition that does not hold against the current model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("pane {0} not found")]
    PaneNotFound(PaneId),
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} is not a split")]
    NotASplit(NodeId),
    #[error("tree is empty")]
    EmptyTree,
    #[error("tree already has a root")]
    TreeNotEmpty,
    #[error("pane {0} is locked")]
    PaneLocked(PaneId),
    #[error("operation needs two distinct panes, got {0} twice")]
    SamePane(PaneId),
    #[error("pane limit of {limit} reached")]
    PaneLimitReached { limit: usize },
    #[error("splitting {pane} would nest deeper than {limit} levels")]
    DepthLimitReached { pane: PaneId, limit: usize },
    #[error("pane id {0} is already in use")]
    PaneIdInUse(PaneId),
    #[error("node id {0} is already in use")]
    NodeIdInUse(NodeId),
    #[error("ratio {value} is invalid: {reason}")]
    InvalidRatio { value: f64, reason: &'static str },
    #[error("divider {divider} out of range for split {split} with {dividers} dividers")]
    DividerOutOfRange {
        split: NodeId,
        divider: usize,
        dividers: usize,
    },
    #[error("divider {divider} of split {split} cannot move to {position} (allowed {min}..{max})")]
    PositionOutOfRange {
        split: NodeId,
        divider: usize,
        position: f64,
        min: f64,
        max: f64,
    },
    #[error("dry run failed: {0}")]
    DryRunFailed(String),
    #[error("step {index}: {source}")]
    Step {
        index: usize,
        source: Box<ValidationError>,
    },
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failure reported by a command's own `execute` or `undo`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{0:?} has not been executed")]
    NotExecuted(CommandKind),
    #[error("precondition failed: {0}")]
    Precondition(#[from] ValidationError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("state drift: {0}")]
    StateDrift(String),
    #[error("step {index}: {source}")]
    Step {
        index: usize,
        source: Box<CommandError>,
    },
    #[error("{0}")]
    Other(String),
}

impl From<StructuralError> for CommandError {
    fn from(err: StructuralError) -> Self {
        Self::Model(ModelError::Structural(err))
    }
}

/// Transaction lifecycle and commit failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("a transaction is already in progress")]
    InProgress,
    #[error("no transaction is in progress")]
    NotStarted,
    #[error("pre-flight rejected step {index} ({command}): {}", join(.errors))]
    Preflight {
        index: usize,
        command: String,
        errors: Vec<ValidationError>,
    },
    #[error("step {index} ({command}) failed: {source}")]
    Execution {
        index: usize,
        command: String,
        source: CommandError,
    },
    #[error("committed tree is invalid: {}", join(.violations))]
    Corruption { violations: Vec<Violation> },
}

/// Errors surfaced by [`CommandEngine`](crate::CommandEngine).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{command} rejected: {}", join(.errors))]
    Validation {
        command: String,
        errors: Vec<ValidationError>,
    },
    #[error("{command} failed: {source}")]
    Execution {
        command: String,
        source: CommandError,
    },
    #[error("{command} left the tree invalid: {}", join(.violations))]
    Corruption {
        command: String,
        violations: Vec<Violation>,
    },
    #[error("recovery exhausted after {checkpoints_tried} checkpoint(s): {original}")]
    RecoveryExhausted {
        original: Box<EngineError>,
        checkpoints_tried: usize,
    },
    #[error("undo of {command} failed: {source}")]
    UndoFailed {
        command: String,
        source: CommandError,
    },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("a transaction is open")]
    TransactionOpen,
    #[error("no transaction is open")]
    NoTransaction,
    #[error(transparent)]
    Transaction(TransactionError),
}

impl From<TransactionError> for EngineError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InProgress => Self::TransactionOpen,
            TransactionError::NotStarted => Self::NoTransaction,
            other => Self::Transaction(other),
        }
    }
}

/// How far the engine had to go to get back to a valid model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recovery {
    /// The failing operation changed nothing.
    NotNeeded,
    /// The failing operation was reverted to the state it started from.
    CommandUndone,
    /// [`repair`](crate::repair::repair) fixed the tree in place.
    Repaired,
    /// The newest valid checkpoint was restored; later history is gone.
    CheckpointRestored,
    /// Every other step failed; the model and its history were cleared.
    Reset,
}

impl Recovery {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotNeeded => "not_needed",
            Self::CommandUndone => "command_undone",
            Self::Repaired => "repaired",
            Self::CheckpointRestored => "checkpoint_restored",
            Self::Reset => "reset",
        }
    }
}

/// Failed engine operation together with the recovery that followed.
///
/// The model is valid whatever the recovery; [`Recovery::Reset`] means it
/// is also empty.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error} (recovery: {})", .recovery.as_str())]
pub struct EngineFailure {
    pub error: EngineError,
    pub recovery: Recovery,
}

impl EngineFailure {
    #[must_use]
    pub const fn new(error: EngineError, recovery: Recovery) -> Self {
        Self { error, recovery }
    }

    /// Failure that never touched the model.
    #[must_use]
    pub const fn rejected(error: EngineError) -> Self {
        Self::new(error, Recovery::NotNeeded)
    }
}

impl From<EngineError> for EngineFailure {
    fn from(error: EngineError) -> Self {
        Self::rejected(error)
    }
}

/// Failures while restoring a serialized tree document.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("unsupported document version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("no migration path from document version {from} to {to}")]
    NoMigrationPath { from: u32, to: u32 },
    #[error("restored tree is invalid: {}", join(.violations))]
    Invalid { violations: Vec<Violation> },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while turning a [`CommandRecord`](crate::CommandRecord) back into
/// a command.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown command type {0:?}")]
    UnknownKind(String),
    #[error("invalid parameters for {kind}: {source}")]
    Parameters {
        kind: String,
        source: serde_json::Error,
    },
    #[error("invalid command id: {0}")]
    Model(#[from] ModelError),
}

/// Failures while loading [`PanesConfig`](crate::PanesConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "toml-config")]
    #[error("config TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_issue() {
        let err = EngineError::Validation {
            command: "split_pane".to_string(),
            errors: vec![
                ValidationError::PaneNotFound(PaneId::MIN),
                ValidationError::InvalidRatio {
                    value: 1.5,
                    reason: "must be inside (0, 1)",
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("pane#1 not found"), "{text}");
        assert!(text.contains("ratio 1.5 is invalid"), "{text}");
    }

    #[test]
    fn structural_error_converts_into_command_error() {
        let err: CommandError = StructuralError::TooFewChildren {
            node: NodeId::MIN,
            count: 1,
        }
        .into();
        assert!(matches!(
            err,
            CommandError::Model(ModelError::Structural(_))
        ));
    }
}
