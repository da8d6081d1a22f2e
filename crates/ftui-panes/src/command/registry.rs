#![forbid(unsafe_code)]

//! Decoding serialized commands.
//!
//! A [`CommandRegistry`] maps record `type` tags to decode functions. The
//! built-in set is registered by [`CommandRegistry::with_builtins`]; hosts
//! add their own kinds with [`CommandRegistry::register`].

use rustc_hash::FxHashMap;

use super::builtin::FromRecord;
use super::{
    ClosePane, Command, CommandKind, CommandRecord, CreateRootPane, EqualizeSplit, FocusPane,
    MovePane, ResizeDivider, SetContent, SetPaneLock, SetSelection, SplitPane, SwapPanes,
};
use crate::error::DecodeError;
use crate::transaction::CompoundCommand;

/// Turns a record into a live command. The registry is passed along so
/// composite commands can decode their children.
pub type DecodeFn =
    fn(&CommandRecord, &CommandRegistry) -> Result<Box<dyn Command>, DecodeError>;

fn decode_builtin<C>(record: &CommandRecord, _: &CommandRegistry) -> Result<Box<dyn Command>, DecodeError>
where
    C: Command + FromRecord + 'static,
{
    Ok(Box::new(C::from_record(record)?))
}

/// Lookup table from record tag to decoder.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    decoders: FxHashMap<String, DecodeFn>,
}

impl CommandRegistry {
    /// Registry with no kinds registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that understands every built-in command, compounds included.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CommandKind::CreateRootPane.as_str(), decode_builtin::<CreateRootPane>);
        registry.register(CommandKind::SplitPane.as_str(), decode_builtin::<SplitPane>);
        registry.register(CommandKind::ClosePane.as_str(), decode_builtin::<ClosePane>);
        registry.register(CommandKind::ResizeDivider.as_str(), decode_builtin::<ResizeDivider>);
        registry.register(CommandKind::EqualizeSplit.as_str(), decode_builtin::<EqualizeSplit>);
        registry.register(CommandKind::SwapPanes.as_str(), decode_builtin::<SwapPanes>);
        registry.register(CommandKind::MovePane.as_str(), decode_builtin::<MovePane>);
        registry.register(CommandKind::FocusPane.as_str(), decode_builtin::<FocusPane>);
        registry.register(CommandKind::SetSelection.as_str(), decode_builtin::<SetSelection>);
        registry.register(CommandKind::SetPaneLock.as_str(), decode_builtin::<SetPaneLock>);
        registry.register(CommandKind::SetContent.as_str(), decode_builtin::<SetContent>);
        registry.register(CommandKind::Compound.as_str(), CompoundCommand::decode);
        registry
    }

    /// Add or replace the decoder for `kind`. Returns the previous one.
    pub fn register(&mut self, kind: impl Into<String>, decode: DecodeFn) -> Option<DecodeFn> {
        self.decoders.insert(kind.into(), decode)
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn decode(&self, record: &CommandRecord) -> Result<Box<dyn Command>, DecodeError> {
        let decode = self
            .decoders
            .get(&record.kind)
            .ok_or_else(|| DecodeError::UnknownKind(record.kind.clone()))?;
        decode(record, self)
    }

    /// Decode a whole history in order, stopping at the first failure.
    pub fn decode_all<'a>(
        &self,
        records: impl IntoIterator<Item = &'a CommandRecord>,
    ) -> Result<Vec<Box<dyn Command>>, DecodeError> {
        records.into_iter().map(|record| self.decode(record)).collect()
    }
}
