#![forbid(unsafe_code)]

//! FrankenTUI Panes
//!
//! A split-pane layout tree that is only ever changed through reversible,
//! validated commands, plus a differ that tells a renderer which of its
//! per-pane resources survive an edit.
//!
//! # Key Components
//!
//! - [`TreeModel`] - Recursive leaf/split tree with id registries, focus,
//!   selection, and locks
//! - [`Command`] - Validate / execute / undo unit of change, with the
//!   built-ins in [`command::builtin`]
//! - [`CommandEngine`] - Undo/redo history, merging, checkpoints,
//!   transactions, and the error-recovery ladder
//! - [`TransactionManager`] - All-or-nothing command groups
//! - [`diff()`] / [`TreeSnapshot`] - Id-level reconciliation between two trees
//! - [`TreeDocument`] - Versioned JSON save/restore
//!
//! # Example
//!
//! ```
//! use ftui_panes::{CommandEngine, EngineConfig, ModelConfig, SplitDirection, SplitPane, TreeModel};
//!
//! let model = TreeModel::with_root_pane(ModelConfig::default(), "editor").unwrap();
//! let first = model.focused_pane_id().unwrap();
//! let mut engine = CommandEngine::new(model, EngineConfig::default());
//!
//! let before = engine.snapshot();
//! engine
//!     .execute(Box::new(SplitPane::new(first, SplitDirection::Right, 0.5, "terminal")))
//!     .unwrap();
//! assert_eq!(engine.model().pane_count(), 2);
//!
//! let changes = before.diff(&engine.snapshot());
//! assert_eq!(changes.added_panes.len(), 1);
//!
//! engine.undo().unwrap();
//! assert_eq!(engine.model().pane_count(), 1);
//! ```
//!
//! # Role in FrankenTUI
//! `ftui-panes` owns pane structure only. Measuring and drawing happen
//! elsewhere: `ftui-layout` turns ratios into rectangles and widgets render
//! into them. Logging goes through `tracing` under the `ftui.panes` target.

pub mod checkpoint;
pub mod command;
pub mod config;
pub mod diff;
pub mod document;
pub mod engine;
pub mod error;
pub mod id;
pub mod merge;
pub mod model;
pub mod node;
pub mod observer;
pub mod repair;
pub mod transaction;
pub mod validate;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use command::{
    ClosePane, Command, CommandId, CommandKind, CommandMeta, CommandRecord, CommandRegistry,
    CreateRootPane, EqualizeSplit, ExecutionResult, FocusPane, MergeKey, MovePane, ResizeDivider,
    SetContent, SetPaneLock, SetSelection, SplitDirection, SplitPane, SwapPanes, ValidationResult,
};
pub use config::{EngineConfig, MergeConfig, ModelConfig, PanesConfig};
pub use diff::{DiffResult, TreeSnapshot, diff};
pub use document::{DOCUMENT_VERSION, NodeDescriptor, TreeDocument};
pub use engine::CommandEngine;
pub use error::{
    CommandError, ConfigError, DecodeError, EngineError, EngineFailure, ModelError, Recovery,
    RestoreError, StructuralError, TransactionError, ValidationError,
};
pub use id::{IdAllocator, NodeId, PaneId};
pub use merge::CommandMerger;
pub use model::{ModelState, NodeEntry, TreeModel};
pub use node::{
    ContentRef, LeafNode, Node, NodeKind, Orientation, RatioMode, SizeConstraints, SplitNode,
};
pub use observer::{MutationEvent, MutationKind, MutationObserver};
pub use repair::{RepairAction, RepairOutcome, repair};
pub use transaction::{CompoundCommand, TransactionManager};
pub use validate::{Violation, ViolationCode};
