#![forbid(unsafe_code)]

//! Versioned save/restore format for a [`TreeModel`].
//!
//! ```json
//! {
//!   "version": 1,
//!   "root": { "node_id": 3, "type": "split", "orientation": "horizontal",
//!             "ratios": [0.5, 0.5], "children": [ ... ] },
//!   "focused_pane_id": 2,
//!   "selected_pane_ids": [],
//!   "locked_pane_ids": [],
//!   "metadata": {},
//!   "next_pane_id": 3,
//!   "next_node_id": 4
//! }
//! ```
//!
//! Restoring builds the tree without per-node checks, rebuilds the
//! registries in one pass, then runs full validation. An invalid document is
//! rejected with every violation; a partially built model never escapes.
//! Validation includes the model's depth limit, so a restored tree is never
//! deeper than the config allows.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::RestoreError;
use crate::id::{IdAllocator, NodeId, PaneId};
use crate::model::TreeModel;
use crate::node::{ContentRef, LeafNode, Node, Orientation, SizeConstraints, SplitNode};

/// Version written by [`TreeDocument::from_model`].
pub const DOCUMENT_VERSION: u32 = 1;

/// Oldest version [`TreeDocument::restore`] can read.
pub const MIN_DOCUMENT_VERSION: u32 = 1;

/// Serialized form of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDescriptor {
    Leaf {
        node_id: NodeId,
        pane_id: PaneId,
        content_ref: ContentRef,
        #[serde(default)]
        size_constraints: SizeConstraints,
    },
    Split {
        node_id: NodeId,
        orientation: Orientation,
        ratios: Vec<f64>,
        children: Vec<NodeDescriptor>,
    },
}

impl NodeDescriptor {
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        match node {
            Node::Leaf(leaf) => Self::Leaf {
                node_id: leaf.node_id,
                pane_id: leaf.pane_id,
                content_ref: leaf.content_ref.clone(),
                size_constraints: leaf.size_constraints,
            },
            Node::Split(split) => Self::Split {
                node_id: split.node_id(),
                orientation: split.orientation(),
                ratios: split.ratios().to_vec(),
                children: split
                    .children()
                    .iter()
                    .map(|child| Self::from_node(child))
                    .collect(),
            },
        }
    }

    /// Build the node without structural checks. Validation runs on the
    /// whole model afterwards.
    #[must_use]
    pub fn to_node(&self) -> Arc<Node> {
        match self {
            Self::Leaf {
                node_id,
                pane_id,
                content_ref,
                size_constraints,
            } => Arc::new(Node::Leaf(
                LeafNode::new(*node_id, *pane_id, content_ref.clone())
                    .with_constraints(*size_constraints),
            )),
            Self::Split {
                node_id,
                orientation,
                ratios,
                children,
            } => Arc::new(Node::Split(SplitNode::new_unchecked(
                *node_id,
                *orientation,
                children.iter().map(Self::to_node).collect(),
                ratios.clone(),
            ))),
        }
    }

    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        match self {
            Self::Leaf { node_id, .. } | Self::Split { node_id, .. } => *node_id,
        }
    }
}

/// Complete saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub root: Option<NodeDescriptor>,
    #[serde(default)]
    pub focused_pane_id: Option<PaneId>,
    #[serde(default)]
    pub selected_pane_ids: BTreeSet<PaneId>,
    #[serde(default)]
    pub locked_pane_ids: BTreeSet<PaneId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_pane_id: Option<PaneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<NodeId>,
}

impl Default for TreeDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            root: None,
            focused_pane_id: None,
            selected_pane_ids: BTreeSet::new(),
            locked_pane_ids: BTreeSet::new(),
            metadata: BTreeMap::new(),
            next_pane_id: None,
            next_node_id: None,
        }
    }
}

impl TreeDocument {
    /// Capture the current state of `model`, including its id counters.
    #[must_use]
    pub fn from_model(model: &TreeModel) -> Self {
        let ids = model.ids();
        Self {
            version: DOCUMENT_VERSION,
            root: model.root().map(|root| NodeDescriptor::from_node(root)),
            focused_pane_id: model.focused_pane_id(),
            selected_pane_ids: model.selected_pane_ids().clone(),
            locked_pane_ids: model.locked_pane_ids().clone(),
            metadata: BTreeMap::new(),
            next_pane_id: Some(ids.peek_pane()),
            next_node_id: Some(ids.peek_node()),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build a fresh model from this document.
    ///
    /// Id counters start past every id in the tree and past the saved
    /// counters, whichever is higher.
    pub fn restore(&self, config: ModelConfig) -> Result<TreeModel, RestoreError> {
        check_version(self.version)?;

        let mut model = TreeModel::new(config);
        model.set_root(self.root.as_ref().map(NodeDescriptor::to_node));
        model.set_references_unchecked(
            self.focused_pane_id,
            self.selected_pane_ids.clone(),
            self.locked_pane_ids.clone(),
        );

        let violations = model.validate();
        if !violations.is_empty() {
            tracing::warn!(
                target: "ftui.panes",
                violations = violations.len(),
                "rejected invalid document"
            );
            return Err(RestoreError::Invalid { violations });
        }

        let mut ids = IdAllocator::with_next(
            self.next_pane_id.unwrap_or(PaneId::MIN),
            self.next_node_id.unwrap_or(NodeId::MIN),
        );
        for pane in model.pane_registry().keys() {
            ids.reserve_pane(*pane)?;
        }
        for node in model.node_registry().keys() {
            ids.reserve_node(*node)?;
        }
        model.merge_ids(ids);

        tracing::debug!(
            target: "ftui.panes",
            panes = model.pane_count(),
            nodes = model.node_count(),
            "document restored"
        );
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, RestoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, RestoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document. The version is checked before the body so a
    /// newer document reports `UnsupportedVersion` rather than a shape
    /// error.
    pub fn from_json(s: &str) -> Result<Self, RestoreError> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        if let Some(version) = value.get("version").and_then(serde_json::Value::as_u64) {
            check_version(u32::try_from(version).unwrap_or(u32::MAX))?;
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn check_version(version: u32) -> Result<(), RestoreError> {
    if version > DOCUMENT_VERSION {
        return Err(RestoreError::UnsupportedVersion {
            found: version,
            supported: DOCUMENT_VERSION,
        });
    }
    if version < MIN_DOCUMENT_VERSION {
        return Err(RestoreError::NoMigrationPath {
            from: version,
            to: DOCUMENT_VERSION,
        });
    }
    Ok(())
}
