#![forbid(unsafe_code)]

//! Hooks around every engine mutation.
//!
//! For each execute, undo, redo, and transaction commit the engine calls
//! [`MutationObserver::before_mutation`] and then exactly one
//! [`MutationObserver::after_mutation`] with the same event, in program
//! order. Pairs never interleave.

use crate::command::{CommandKind, ExecutionResult};
use crate::error::EngineFailure;

/// Which engine entry point caused the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Execute,
    Undo,
    Redo,
    Commit,
}

/// What is about to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub kind: MutationKind,
    pub command: CommandKind,
    pub description: String,
}

/// Receives mutation notifications from a
/// [`CommandEngine`](crate::CommandEngine).
pub trait MutationObserver: Send {
    fn before_mutation(&mut self, event: &MutationEvent);

    fn after_mutation(
        &mut self,
        event: &MutationEvent,
        outcome: Result<&ExecutionResult, &EngineFailure>,
    );
}
