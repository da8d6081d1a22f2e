#![forbid(unsafe_code)]

//! Folding rapid consecutive commands into one undo entry.
//!
//! Two commands merge only if all of these hold:
//!
//! - merging is enabled;
//! - both have the same [`CommandKind`];
//! - both report the same non-`None` [`MergeKey`];
//! - `next` was created no earlier than `prev` and within the window;
//! - `prev` accepts `next` through [`Command::can_merge_with`].
//!
//! The merged command keeps `prev`'s recorded pre-state and takes `next`'s
//! target and timestamp, so merging `a`, `b`, `c` in either grouping yields
//! the same command.

use crate::command::Command;
use crate::config::MergeConfig;

/// Decides whether and how consecutive commands merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandMerger {
    config: MergeConfig,
}

impl CommandMerger {
    #[must_use]
    pub const fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MergeConfig) {
        self.config = config;
    }

    /// Whether `next` may be folded into `prev`.
    #[must_use]
    pub fn can_merge(&self, prev: &dyn Command, next: &dyn Command) -> bool {
        if !self.config.enabled || prev.kind() != next.kind() {
            return false;
        }
        let Some(key) = prev.merge_key() else {
            return false;
        };
        if next.merge_key() != Some(key) {
            return false;
        }
        let Some(elapsed) = next.timestamp().checked_sub(prev.timestamp()) else {
            return false;
        };
        elapsed <= self.config.window_ms && prev.can_merge_with(next)
    }

    /// Merged command, or `None` when the pair does not qualify.
    #[must_use]
    pub fn merge(&self, prev: &dyn Command, next: &dyn Command) -> Option<Box<dyn Command>> {
        if !self.can_merge(prev, next) {
            return None;
        }
        prev.merge_with(next)
    }
}
