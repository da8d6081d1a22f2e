#![forbid(unsafe_code)]

//! Reversible, validated commands over a [`TreeModel`].
//!
//! # Invariants
//!
//! - `validate()` never mutates the model.
//! - `execute()` followed by `undo()` restores the pre-execute state exactly,
//!   including every pane and node id.
//! - `undo()` only runs against the state `execute()` produced; the engine's
//!   stack discipline guarantees this.
//! - A failed `execute()` leaves the model as it found it.
//! - Ids a command allocates are recorded on first execute and reused on
//!   redo, so the same entity comes back. The model's generator never hands
//!   them out again.

pub mod builtin;
pub mod registry;

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, ValidationError};
use crate::id::{NodeId, PaneId};
use crate::model::TreeModel;

pub use builtin::{
    ClosePane, CreateRootPane, EqualizeSplit, FocusPane, MovePane, ResizeDivider, SetContent,
    SetPaneLock, SetSelection, SplitDirection, SplitPane, SwapPanes,
};
pub use registry::{CommandRegistry, DecodeFn};

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Next id from the process-wide counter.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Id taken from a stored record.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Closed set of command kinds plus an escape hatch for host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateRootPane,
    SplitPane,
    ClosePane,
    ResizeDivider,
    EqualizeSplit,
    SwapPanes,
    MovePane,
    FocusPane,
    SetSelection,
    SetPaneLock,
    SetContent,
    Compound,
    /// Host-defined command with its own record tag.
    Custom(&'static str),
}

impl CommandKind {
    /// Record `type` tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateRootPane => "create_root_pane",
            Self::SplitPane => "split_pane",
            Self::ClosePane => "close_pane",
            Self::ResizeDivider => "resize_divider",
            Self::EqualizeSplit => "equalize_split",
            Self::SwapPanes => "swap_panes",
            Self::MovePane => "move_pane",
            Self::FocusPane => "focus_pane",
            Self::SetSelection => "set_selection",
            Self::SetPaneLock => "set_pane_lock",
            Self::SetContent => "set_content",
            Self::Compound => "compound",
            Self::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, creation time, and label carried by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMeta {
    pub id: CommandId,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub description: String,
}

impl CommandMeta {
    /// Fresh metadata stamped with the current wall-clock time.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: CommandId::next(),
            timestamp_ms: now_ms(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: CommandId) -> Self {
        self.id = id;
        self
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Outcome of [`Command::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn invalid(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    pub fn into_result(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

impl From<Vec<ValidationError>> for ValidationResult {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

/// Outcome of [`Command::execute`] and [`Command::undo`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub changed_pane_ids: BTreeSet<PaneId>,
    pub changed_node_ids: BTreeSet<NodeId>,
    pub structure_changed: bool,
    pub error: Option<CommandError>,
}

impl ExecutionResult {
    /// Success with nothing reported changed yet.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<CommandError>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_panes(mut self, panes: impl IntoIterator<Item = PaneId>) -> Self {
        self.changed_pane_ids.extend(panes);
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.changed_node_ids.extend(nodes);
        self
    }

    #[must_use]
    pub fn structural(mut self) -> Self {
        self.structure_changed = true;
        self
    }

    /// Fold another successful result into this one.
    pub fn absorb(&mut self, other: Self) {
        self.changed_pane_ids.extend(other.changed_pane_ids);
        self.changed_node_ids.extend(other.changed_node_ids);
        self.structure_changed |= other.structure_changed;
    }

    /// `Err` with the carried error when the operation failed.
    pub fn into_result(self) -> Result<Self, CommandError> {
        if self.success {
            Ok(self)
        } else {
            Err(self
                .error
                .clone()
                .unwrap_or_else(|| CommandError::Other("unspecified failure".into())))
        }
    }
}

impl From<Result<ExecutionResult, CommandError>> for ExecutionResult {
    fn from(result: Result<ExecutionResult, CommandError>) -> Self {
        result.unwrap_or_else(Self::failed)
    }
}

/// Target a command edits, used to decide whether two commands may merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeKey {
    Divider { split: NodeId, divider: usize },
    Pane(PaneId),
    Node(NodeId),
}

/// Serialized form of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub command_id: CommandId,
    pub timestamp: u64,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// A reversible, validated mutation of a [`TreeModel`].
pub trait Command: Send {
    fn kind(&self) -> CommandKind;

    fn meta(&self) -> &CommandMeta;

    fn id(&self) -> CommandId {
        self.meta().id
    }

    /// Creation time in milliseconds since the Unix epoch.
    fn timestamp(&self) -> u64 {
        self.meta().timestamp_ms
    }

    fn description(&self) -> &str {
        &self.meta().description
    }

    /// Check preconditions without touching the model.
    fn validate(&self, model: &TreeModel) -> ValidationResult;

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult;

    /// Restore the state `execute` started from.
    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult;

    /// Target used for merge matching. `None` never merges.
    fn merge_key(&self) -> Option<MergeKey> {
        None
    }

    /// Whether `next` can be folded into this (already executed) command.
    fn can_merge_with(&self, _next: &dyn Command) -> bool {
        false
    }

    /// Combined command carrying this command's pre-state and `next`'s
    /// target and timestamp.
    fn merge_with(&self, _next: &dyn Command) -> Option<Box<dyn Command>> {
        None
    }

    fn to_record(&self) -> CommandRecord;

    fn clone_box(&self) -> Box<dyn Command>;

    /// Downcasting hook for merge checks.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("description", &self.description())
            .finish()
    }
}

impl Clone for Box<dyn Command> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Build a record from typed parameters.
pub(crate) fn record_with<P: Serialize>(
    kind: CommandKind,
    meta: &CommandMeta,
    params: &P,
) -> CommandRecord {
    CommandRecord {
        kind: kind.as_str().to_string(),
        command_id: meta.id,
        timestamp: meta.timestamp_ms,
        // Parameter structs are plain data and always serialize.
        parameters: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
    }
}
