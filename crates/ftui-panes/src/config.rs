#![forbid(unsafe_code)]

//! Configuration for the pane model and command engine.
//!
//! Everything lives in one [`PanesConfig`] that can be loaded from JSON (or
//! TOML with the `toml-config` feature). Missing fields fall back to the
//! built-in defaults, so an empty document is a valid config.
//!
//! ```toml
//! [model]
//! max_panes = 32
//! max_depth = 24
//! ratio_mode = "strict"
//!
//! [engine]
//! max_undo_depth = 200
//! checkpoint_interval = 25
//!
//! [engine.merge]
//! window_ms = 150
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::RatioMode;

/// Default merge window for consecutive commands.
pub const DEFAULT_MERGE_WINDOW_MS: u64 = 100;
/// Default bound on the undo stack.
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 100;
/// Default number of successful commands between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;
/// Default number of retained checkpoints.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 8;
/// Default bound on nodes along any root-to-leaf path. Saved documents nest
/// two JSON levels per tree level, so this stays well under serde_json's
/// recursion limit.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Tree model limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Upper bound on live panes; `None` is unbounded.
    pub max_panes: Option<usize>,
    /// Upper bound on nodes along a root-to-leaf path (a lone leaf is 1);
    /// `None` is unbounded.
    pub max_depth: Option<usize>,
    pub ratio_mode: RatioMode,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_panes: None,
            max_depth: Some(DEFAULT_MAX_DEPTH),
            ratio_mode: RatioMode::default(),
        }
    }
}

impl ModelConfig {
    #[must_use]
    pub fn with_max_panes(mut self, max_panes: usize) -> Self {
        self.max_panes = Some(max_panes);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_ratio_mode(mut self, mode: RatioMode) -> Self {
        self.ratio_mode = mode;
        self
    }
}

/// Command merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub enabled: bool,
    /// Maximum gap between two mergeable commands.
    pub window_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: DEFAULT_MERGE_WINDOW_MS,
        }
    }
}

impl MergeConfig {
    /// Merging turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }
}

/// Undo history and recovery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo entries kept; the oldest is evicted first. 0 means unlimited.
    pub max_undo_depth: usize,
    /// Successful commands between checkpoints. 0 disables checkpoints.
    pub checkpoint_interval: usize,
    /// Checkpoints kept; the oldest is evicted first.
    pub max_checkpoints: usize,
    pub merge: MergeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            merge: MergeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// No depth limit on the undo stack.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_undo_depth: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_undo_depth(mut self, depth: usize) -> Self {
        self.max_undo_depth = depth;
        self
    }

    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    #[must_use]
    pub fn with_merge(mut self, merge: MergeConfig) -> Self {
        self.merge = merge;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PanesConfig {
    pub model: ModelConfig,
    pub engine: EngineConfig,
}

impl PanesConfig {
    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Load from a TOML string.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Json)
    }

    /// Check parameters are within acceptable ranges.
    ///
    /// An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.model.max_panes == Some(0) {
            errors.push("model.max_panes must be > 0 when set".into());
        }

        if self.model.max_depth == Some(0) {
            errors.push("model.max_depth must be > 0 when set".into());
        }

        if self.engine.checkpoint_interval > 0 && self.engine.max_checkpoints == 0 {
            errors.push(
                "engine.max_checkpoints must be > 0 when checkpoints are enabled".into(),
            );
        }

        if self.engine.merge.enabled && self.engine.merge.window_ms == 0 {
            errors.push("engine.merge.window_ms must be > 0 when merging is enabled".into());
        }

        errors
    }

    /// `self` if [`validate`](Self::validate) finds nothing.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
