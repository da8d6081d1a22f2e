#![forbid(unsafe_code)]

//! All-or-nothing command groups.
//!
//! A transaction collects commands without touching the model. On commit:
//!
//! 1. **Pre-flight**: every pending command is validated against a staged
//!    copy of the model with its predecessors already applied, so a command
//!    may target a pane created earlier in the same transaction. Any
//!    rejection aborts with the live model untouched.
//! 2. **Execution**: the commands run on the live model as one
//!    [`CompoundCommand`]. A mid-sequence failure undoes the executed prefix
//!    in reverse; if an undo fails too, the begin snapshot is restored.
//! 3. **Verification**: the resulting tree must validate, else the begin
//!    snapshot is restored.
//!
//! Id counters are never rolled back.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::command::{
    Command, CommandId, CommandKind, CommandMeta, CommandRecord, CommandRegistry, ExecutionResult,
    ValidationResult, record_with,
};
use crate::error::{CommandError, DecodeError, TransactionError, ValidationError};
use crate::model::{ModelState, TreeModel};

/// Ordered group of commands executed and undone as one unit.
///
/// Undo runs strictly in reverse. Compounds never merge.
#[derive(Debug, Clone)]
pub struct CompoundCommand {
    meta: CommandMeta,
    commands: Vec<Box<dyn Command>>,
    executed: bool,
}

#[derive(Serialize, Deserialize)]
struct CompoundParams {
    description: String,
    commands: Vec<CommandRecord>,
}

impl CompoundCommand {
    #[must_use]
    pub fn new(description: impl Into<String>, commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            meta: CommandMeta::new(description),
            commands,
            executed: false,
        }
    }

    #[must_use]
    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Rebuild from a record, decoding children through `registry`.
    pub fn decode(
        record: &CommandRecord,
        registry: &CommandRegistry,
    ) -> Result<Box<dyn Command>, DecodeError> {
        let params: CompoundParams = serde_json::from_value(record.parameters.clone())
            .map_err(|source| DecodeError::Parameters {
                kind: record.kind.clone(),
                source,
            })?;
        let commands = registry.decode_all(&params.commands)?;
        let meta = CommandMeta::new(params.description)
            .with_id(CommandId::from_raw(record.command_id.get()))
            .with_timestamp(record.timestamp);
        Ok(Box::new(Self {
            meta,
            commands,
            executed: false,
        }))
    }

    /// Undo `commands[..count]` in reverse. On failure, re-execute what was
    /// already undone so the model is back where it started.
    fn unwind(&mut self, model: &mut TreeModel, count: usize) -> Result<ExecutionResult, CommandError> {
        let mut total = ExecutionResult::ok();
        for index in (0..count).rev() {
            let result = self.commands[index].undo(model);
            if let Err(source) = result.into_result().map(|result| total.absorb(result)) {
                for redo in index + 1..count {
                    self.commands[redo].execute(model).into_result()?;
                }
                return Err(CommandError::Step {
                    index,
                    source: Box::new(source),
                });
            }
        }
        Ok(total)
    }
}

impl Command for CompoundCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Compound
    }

    fn meta(&self) -> &CommandMeta {
        &self.meta
    }

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        match validate_sequence(model, &self.commands) {
            Ok(()) => ValidationResult::ok(),
            Err((index, errors)) => errors
                .into_iter()
                .map(|source| ValidationError::Step {
                    index,
                    source: Box::new(source),
                })
                .collect::<Vec<_>>()
                .into(),
        }
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        let snapshot = model.capture_state();
        let mut total = ExecutionResult::ok();
        for index in 0..self.commands.len() {
            let result = self.commands[index].execute(model);
            match result.into_result() {
                Ok(result) => total.absorb(result),
                Err(source) => {
                    // The failed step may have left partial changes.
                    if self.unwind(model, index).is_err() || model.capture_state() != snapshot {
                        model.restore_state(snapshot);
                    }
                    return ExecutionResult::failed(CommandError::Step {
                        index,
                        source: Box::new(source),
                    });
                }
            }
        }
        self.executed = true;
        total
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        if !self.executed {
            return ExecutionResult::failed(CommandError::NotExecuted(CommandKind::Compound));
        }
        let result = self.unwind(model, self.commands.len());
        if result.is_ok() {
            self.executed = false;
        }
        result.into()
    }

    fn to_record(&self) -> CommandRecord {
        let params = CompoundParams {
            description: self.meta.description.clone(),
            commands: self.commands.iter().map(|cmd| cmd.to_record()).collect(),
        };
        record_with(CommandKind::Compound, &self.meta, &params)
    }

    fn clone_box(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Validate `commands` in order against a staged copy of `model`, applying
/// each one before validating the next. Returns the first failing index
/// with its errors. `model` is never touched.
pub fn validate_sequence(
    model: &TreeModel,
    commands: &[Box<dyn Command>],
) -> Result<(), (usize, Vec<ValidationError>)> {
    let mut staged = model.clone();
    for (index, command) in commands.iter().enumerate() {
        command.validate(&staged).into_result().map_err(|errors| (index, errors))?;
        let mut dry = command.clone_box();
        let result = dry.execute(&mut staged);
        if let Err(err) = result.into_result() {
            return Err((index, vec![ValidationError::DryRunFailed(err.to_string())]));
        }
    }
    Ok(())
}

#[derive(Debug)]
struct Transaction {
    description: String,
    snapshot: ModelState,
    pending: Vec<Box<dyn Command>>,
}

/// A committed transaction: the compound to push and its combined result.
#[derive(Debug)]
pub struct Committed {
    pub command: CompoundCommand,
    pub result: ExecutionResult,
}

/// Holds at most one open transaction.
#[derive(Debug, Default)]
pub struct TransactionManager {
    active: Option<Transaction>,
}

impl TransactionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction, snapshotting `model`. Transactions do not nest.
    pub fn begin(
        &mut self,
        model: &TreeModel,
        description: impl Into<String>,
    ) -> Result<(), TransactionError> {
        if self.active.is_some() {
            return Err(TransactionError::InProgress);
        }
        let description = description.into();
        tracing::debug!(target: "ftui.panes", %description, "transaction begin");
        self.active = Some(Transaction {
            description,
            snapshot: model.capture_state(),
            pending: Vec::new(),
        });
        Ok(())
    }

    /// Queue a command. Nothing runs until [`commit`](Self::commit).
    pub fn add(&mut self, command: Box<dyn Command>) -> Result<(), TransactionError> {
        let active = self.active.as_mut().ok_or(TransactionError::NotStarted)?;
        active.pending.push(command);
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Description of the open transaction.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.description.as_str())
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.pending.len())
    }

    /// Run the pending commands as one unit. The transaction is closed
    /// whatever the outcome; on error `model` equals the begin snapshot.
    pub fn commit(&mut self, model: &mut TreeModel) -> Result<Committed, TransactionError> {
        let Transaction {
            description,
            snapshot,
            pending,
        } = self.active.take().ok_or(TransactionError::NotStarted)?;

        if let Err((index, errors)) = validate_sequence(model, &pending) {
            let command = pending
                .get(index)
                .map(|cmd| cmd.description().to_string())
                .unwrap_or_default();
            tracing::info!(
                target: "ftui.panes",
                %description,
                index,
                %command,
                "transaction rejected in pre-flight"
            );
            return Err(TransactionError::Preflight {
                index,
                command,
                errors,
            });
        }

        let mut compound = CompoundCommand::new(description.clone(), pending);
        let result = compound.execute(model);
        if let Err(err) = result.clone().into_result() {
            model.restore_state(snapshot);
            let (index, source) = match err {
                CommandError::Step { index, source } => (index, *source),
                other => (0, other),
            };
            let command = compound
                .commands()
                .get(index)
                .map(|cmd| cmd.description().to_string())
                .unwrap_or_default();
            tracing::info!(
                target: "ftui.panes",
                %description,
                index,
                %command,
                "transaction execution failed, rolled back"
            );
            return Err(TransactionError::Execution {
                index,
                command,
                source,
            });
        }

        let violations = model.validate();
        if !violations.is_empty() {
            model.restore_state(snapshot);
            tracing::warn!(
                target: "ftui.panes",
                %description,
                violations = violations.len(),
                "transaction left the tree invalid, rolled back"
            );
            return Err(TransactionError::Corruption { violations });
        }

        tracing::info!(
            target: "ftui.panes",
            %description,
            commands = compound.len(),
            "transaction committed"
        );
        Ok(Committed {
            command: compound,
            result,
        })
    }

    /// Discard the pending commands and restore the begin snapshot.
    /// Returns how many commands were discarded.
    pub fn rollback(&mut self, model: &mut TreeModel) -> Result<usize, TransactionError> {
        let active = self.active.take().ok_or(TransactionError::NotStarted)?;
        model.restore_state(active.snapshot);
        tracing::info!(
            target: "ftui.panes",
            description = %active.description,
            discarded = active.pending.len(),
            "transaction rolled back"
        );
        Ok(active.pending.len())
    }
}
