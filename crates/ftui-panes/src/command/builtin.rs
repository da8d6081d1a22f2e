#![forbid(unsafe_code)]

//! Built-in pane commands.
//!
//! Structural commands share two primitives:
//!
//! - `attach` places a leaf next to a target pane, either as a new sibling
//!   inside a parent with the same orientation (N-ary split) or by wrapping
//!   the target in a fresh two-child split.
//! - `detach` removes a leaf, rebalancing the parent's remaining ratios or
//!   collapsing a two-child parent into the surviving sibling.
//!
//! Both return a plan describing exactly how to reverse them. [`SplitPane`]
//! is attach, [`ClosePane`] is detach, and [`MovePane`] is detach then
//! attach, undone in the opposite order.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    Command, CommandId, CommandKind, CommandMeta, CommandRecord, ExecutionResult, MergeKey,
    ValidationResult, record_with,
};
use crate::error::{CommandError, DecodeError, ModelError, ValidationError};
use crate::id::{NodeId, PaneId};
use crate::model::TreeModel;
use crate::node::{
    ContentRef, LeafNode, Node, Orientation, RatioMode, SplitNode, equal_ratios, normalize_ratios,
};

/// Where a new pane goes relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDirection {
    Left,
    Right,
    Up,
    Down,
}

impl SplitDirection {
    #[must_use]
    pub const fn orientation(self) -> Orientation {
        match self {
            Self::Left | Self::Right => Orientation::Horizontal,
            Self::Up | Self::Down => Orientation::Vertical,
        }
    }

    /// The new pane comes before the target.
    #[must_use]
    pub const fn new_first(self) -> bool {
        matches!(self, Self::Left | Self::Up)
    }
}

/// Commands that can be rebuilt from a [`CommandRecord`].
pub trait FromRecord: Sized {
    fn from_record(record: &CommandRecord) -> Result<Self, DecodeError>;
}

fn decode_params<P: DeserializeOwned>(record: &CommandRecord) -> Result<P, DecodeError> {
    serde_json::from_value(record.parameters.clone()).map_err(|source| DecodeError::Parameters {
        kind: record.kind.clone(),
        source,
    })
}

fn decoded_meta(record: &CommandRecord, description: String) -> CommandMeta {
    CommandMeta {
        id: CommandId::from_raw(record.command_id.get()),
        timestamp_ms: record.timestamp,
        description,
    }
}

/// Boilerplate shared by every built-in.
macro_rules! command_common {
    ($kind:expr) => {
        fn kind(&self) -> CommandKind {
            $kind
        }

        fn meta(&self) -> &CommandMeta {
            &self.meta
        }

        fn to_record(&self) -> CommandRecord {
            record_with($kind, &self.meta, &self.params)
        }

        fn clone_box(&self) -> Box<dyn Command> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

/// Shared builder methods and record decoding.
macro_rules! command_ctor {
    ($name:ident, $params:ident) => {
        impl $name {
            fn from_params(params: $params) -> Self {
                let description = params.describe();
                Self {
                    meta: CommandMeta::new(description),
                    params,
                    applied: None,
                }
            }

            /// Override the creation timestamp (milliseconds since epoch).
            #[must_use]
            pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
                self.meta.timestamp_ms = timestamp_ms;
                self
            }

            #[must_use]
            pub fn with_meta(mut self, meta: CommandMeta) -> Self {
                self.meta = meta;
                self
            }
        }

        impl FromRecord for $name {
            fn from_record(record: &CommandRecord) -> Result<Self, DecodeError> {
                let params: $params = decode_params(record)?;
                let description = params.describe();
                Ok(Self {
                    meta: decoded_meta(record, description),
                    params,
                    applied: None,
                })
            }
        }
    };
}

// -------------------------------------------------------------------------
// Validation helpers
// -------------------------------------------------------------------------

fn check_pane(model: &TreeModel, pane: PaneId, result: &mut ValidationResult) -> bool {
    if model.contains_pane(pane) {
        true
    } else {
        result.push(ValidationError::PaneNotFound(pane));
        false
    }
}

fn check_unlocked(model: &TreeModel, pane: PaneId, result: &mut ValidationResult) {
    if model.is_locked(pane) {
        result.push(ValidationError::PaneLocked(pane));
    }
}

fn check_new_share(ratio: f64, result: &mut ValidationResult) {
    if !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0) {
        result.push(ValidationError::InvalidRatio {
            value: ratio,
            reason: "the new pane's share must be inside (0, 1)",
        });
    }
}

fn check_room(model: &TreeModel, result: &mut ValidationResult) {
    if let Some(limit) = model.config().max_panes
        && model.pane_count() >= limit
    {
        result.push(ValidationError::PaneLimitReached { limit });
    }
}

/// Placing a pane next to `target` wraps the target in a new split unless
/// its parent already runs along `orientation`; the wrap adds one level.
fn check_depth(
    model: &TreeModel,
    target: PaneId,
    orientation: Orientation,
    result: &mut ValidationResult,
) {
    let Some(limit) = model.config().max_depth else {
        return;
    };
    let Ok(leaf) = model.leaf_node_id(target) else {
        return;
    };
    let joins_parent = model
        .parent_of(leaf)
        .and_then(|parent| model.split(parent))
        .is_some_and(|split| split.orientation() == orientation);
    if !joins_parent && model.depth_of(leaf).is_some_and(|depth| depth >= limit) {
        result.push(ValidationError::DepthLimitReached {
            pane: target,
            limit,
        });
    }
}

fn check_fresh_ids(
    model: &TreeModel,
    pane: Option<PaneId>,
    node: Option<NodeId>,
    result: &mut ValidationResult,
) {
    if let Some(pane) = pane
        && model.contains_pane(pane)
    {
        result.push(ValidationError::PaneIdInUse(pane));
    }
    if let Some(node) = node
        && model.contains_node(node)
    {
        result.push(ValidationError::NodeIdInUse(node));
    }
}

fn require_unlocked(model: &TreeModel, pane: PaneId) -> Result<(), CommandError> {
    if model.is_locked(pane) {
        return Err(ValidationError::PaneLocked(pane).into());
    }
    Ok(())
}

/// Recorded id, or a freshly generated one that is then recorded.
fn pane_id_slot(model: &mut TreeModel, slot: &mut Option<PaneId>) -> Result<PaneId, CommandError> {
    let id = match *slot {
        Some(id) => {
            model.reserve_pane_id(id)?;
            id
        }
        None => model.generate_pane_id()?,
    };
    if model.contains_pane(id) {
        return Err(ValidationError::PaneIdInUse(id).into());
    }
    *slot = Some(id);
    Ok(id)
}

fn node_id_slot(model: &mut TreeModel, slot: &mut Option<NodeId>) -> Result<NodeId, CommandError> {
    let id = match *slot {
        Some(id) => {
            model.reserve_node_id(id)?;
            id
        }
        None => model.generate_node_id()?,
    };
    if model.contains_node(id) {
        return Err(ValidationError::NodeIdInUse(id).into());
    }
    *slot = Some(id);
    Ok(id)
}

fn drift(message: String) -> CommandError {
    CommandError::StateDrift(message)
}

// -------------------------------------------------------------------------
// Attach / detach primitives
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Attachment {
    Inserted {
        parent: NodeId,
        leaf: NodeId,
        prior_ratios: Vec<f64>,
    },
    Wrapped {
        wrapper: NodeId,
        target: NodeId,
    },
}

impl Attachment {
    const fn touched_node(&self) -> NodeId {
        match self {
            Self::Inserted { parent, .. } => *parent,
            Self::Wrapped { wrapper, .. } => *wrapper,
        }
    }
}

fn attach(
    model: &mut TreeModel,
    target: PaneId,
    direction: SplitDirection,
    ratio: f64,
    leaf: Arc<Node>,
    wrapper_slot: &mut Option<NodeId>,
) -> Result<Attachment, CommandError> {
    let target_node = model.leaf_node_id(target)?;
    let entry = *model
        .entry(target_node)
        .ok_or(ModelError::NodeNotFound(target_node))?;
    let orientation = direction.orientation();
    let leaf_id = leaf.node_id();

    let same_axis_parent = entry.parent.filter(|parent| {
        model
            .split(*parent)
            .is_some_and(|split| split.orientation() == orientation)
    });
    if let Some(parent) = same_axis_parent {
        let prior_ratios = model
            .split(parent)
            .ok_or(ModelError::NotASplit(parent))?
            .ratios()
            .to_vec();
        let mut ratios = prior_ratios.clone();
        let Some(slot) = ratios.get_mut(entry.index) else {
            return Err(drift(format!("{parent} has no ratio for child {}", entry.index)));
        };
        let share = *slot;
        *slot = share * (1.0 - ratio);
        let insert_at = if direction.new_first() {
            entry.index
        } else {
            entry.index + 1
        };
        ratios.insert(insert_at, share * ratio);
        model.edit_split(parent, |split, mode| {
            split.insert_child(insert_at, leaf, ratios, mode)
        })?;
        return Ok(Attachment::Inserted {
            parent,
            leaf: leaf_id,
            prior_ratios,
        });
    }

    let wrapper = node_id_slot(model, wrapper_slot)?;
    let target_arc = model
        .node_arc(target_node)
        .ok_or(ModelError::NodeNotFound(target_node))?;
    let (children, ratios) = if direction.new_first() {
        (vec![leaf, target_arc], vec![ratio, 1.0 - ratio])
    } else {
        (vec![target_arc, leaf], vec![1.0 - ratio, ratio])
    };
    let split = SplitNode::new(wrapper, orientation, children, ratios, model.ratio_mode())?;
    model.replace_node(target_node, Node::Split(split))?;
    Ok(Attachment::Wrapped {
        wrapper,
        target: target_node,
    })
}

fn undo_attach(model: &mut TreeModel, attachment: &Attachment) -> Result<(), CommandError> {
    match attachment {
        Attachment::Inserted {
            parent,
            leaf,
            prior_ratios,
        } => {
            let index = model
                .split(*parent)
                .and_then(|split| split.position_of(*leaf))
                .ok_or_else(|| drift(format!("{leaf} is no longer a child of {parent}")))?;
            model.edit_split(*parent, |split, mode| {
                split.remove_child(index, prior_ratios.clone(), mode)
            })?;
        }
        Attachment::Wrapped { wrapper, target } => {
            let target_arc = model
                .split(*wrapper)
                .and_then(|split| {
                    split
                        .position_of(*target)
                        .and_then(|index| split.children().get(index).cloned())
                })
                .ok_or_else(|| drift(format!("{target} is no longer inside {wrapper}")))?;
            model.replace_node(*wrapper, target_arc)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Detachment {
    /// The leaf was the root; the tree is now empty.
    Root { leaf: Arc<Node> },
    /// Removed from a parent that kept two or more children.
    Removed {
        parent: NodeId,
        index: usize,
        leaf: Arc<Node>,
        prior_ratios: Vec<f64>,
    },
    /// The two-child parent was replaced by the surviving sibling.
    Collapsed { parent: Arc<Node>, survivor: NodeId },
}

impl Detachment {
    fn touched_node(&self) -> Option<NodeId> {
        match self {
            Self::Root { .. } => None,
            Self::Removed { parent, .. } => Some(*parent),
            Self::Collapsed { survivor, .. } => Some(*survivor),
        }
    }
}

fn detach(model: &mut TreeModel, pane: PaneId) -> Result<(Arc<Node>, Detachment), CommandError> {
    let node_id = model.leaf_node_id(pane)?;
    let entry = *model
        .entry(node_id)
        .ok_or(ModelError::NodeNotFound(node_id))?;

    let Some(parent) = entry.parent else {
        let leaf = model.set_root(None).ok_or(ModelError::EmptyTree)?;
        return Ok((Arc::clone(&leaf), Detachment::Root { leaf }));
    };

    let split = model.split(parent).ok_or(ModelError::NotASplit(parent))?;
    let leaf = split
        .children()
        .get(entry.index)
        .cloned()
        .ok_or(ModelError::NodeNotFound(node_id))?;

    if split.len() > 2 {
        let prior_ratios = split.ratios().to_vec();
        if entry.index >= prior_ratios.len() {
            return Err(drift(format!("{parent} has no ratio for child {}", entry.index)));
        }
        let mut remaining = prior_ratios.clone();
        remaining.remove(entry.index);
        let ratios = normalize_ratios(&remaining);
        model.edit_split(parent, |split, mode| {
            split.remove_child(entry.index, ratios, mode)
        })?;
        return Ok((
            Arc::clone(&leaf),
            Detachment::Removed {
                parent,
                index: entry.index,
                leaf,
                prior_ratios,
            },
        ));
    }

    let survivor_index = usize::from(entry.index == 0);
    let survivor = split
        .children()
        .get(survivor_index)
        .cloned()
        .ok_or_else(|| drift(format!("{parent} has no sibling for {node_id}")))?;
    let parent_image = model
        .node_arc(parent)
        .ok_or(ModelError::NodeNotFound(parent))?;
    let survivor_id = survivor.node_id();
    model.replace_node(parent, survivor)?;
    Ok((
        leaf,
        Detachment::Collapsed {
            parent: parent_image,
            survivor: survivor_id,
        },
    ))
}

fn undo_detach(model: &mut TreeModel, detachment: &Detachment) -> Result<(), CommandError> {
    match detachment {
        Detachment::Root { leaf } => {
            if !model.is_empty() {
                return Err(drift("tree gained a root while the last pane was closed".into()));
            }
            model.set_root(Some(Arc::clone(leaf)));
        }
        Detachment::Removed {
            parent,
            index,
            leaf,
            prior_ratios,
        } => {
            model.edit_split(*parent, |split, mode| {
                split.insert_child(*index, Arc::clone(leaf), prior_ratios.clone(), mode)
            })?;
        }
        Detachment::Collapsed { parent, survivor } => {
            model.replace_node(*survivor, Arc::clone(parent))?;
        }
    }
    Ok(())
}

/// Pane to focus once `closing` is gone: the previous pane in tree order,
/// else the next one.
fn nearest_pane(order: &[PaneId], closing: PaneId) -> Option<PaneId> {
    let index = order.iter().position(|pane| *pane == closing)?;
    index
        .checked_sub(1)
        .and_then(|prev| order.get(prev))
        .or_else(|| order.get(index + 1))
        .copied()
}

// -------------------------------------------------------------------------
// CreateRootPane
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CreateRootParams {
    content_ref: ContentRef,
    #[serde(default)]
    pane_id: Option<PaneId>,
    #[serde(default)]
    node_id: Option<NodeId>,
}

impl CreateRootParams {
    fn describe(&self) -> String {
        format!("Open root pane ({})", self.content_ref)
    }
}

/// Put the first pane into an empty tree and focus it.
#[derive(Debug, Clone)]
pub struct CreateRootPane {
    meta: CommandMeta,
    params: CreateRootParams,
    applied: Option<Option<PaneId>>,
}

command_ctor!(CreateRootPane, CreateRootParams);

impl CreateRootPane {
    #[must_use]
    pub fn new(content_ref: impl Into<ContentRef>) -> Self {
        Self::from_params(CreateRootParams {
            content_ref: content_ref.into(),
            pane_id: None,
            node_id: None,
        })
    }

    /// Use an explicit pane id instead of a generated one.
    #[must_use]
    pub fn with_pane_id(mut self, pane: PaneId) -> Self {
        self.params.pane_id = Some(pane);
        self
    }

    /// Pane id, known once supplied or executed.
    #[must_use]
    pub fn pane_id(&self) -> Option<PaneId> {
        self.params.pane_id
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        if !model.is_empty() {
            return Err(ValidationError::TreeNotEmpty.into());
        }
        let pane = pane_id_slot(model, &mut self.params.pane_id)?;
        let node = node_id_slot(model, &mut self.params.node_id)?;
        let leaf = LeafNode::new(node, pane, self.params.content_ref.clone());
        model.set_root(Some(Arc::new(Node::Leaf(leaf))));
        let prior_focus = model.set_focus(Some(pane))?;
        self.applied = Some(prior_focus);
        Ok(ExecutionResult::ok()
            .with_panes([pane])
            .with_nodes([node])
            .structural())
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let prior_focus = self
            .applied
            .ok_or(CommandError::NotExecuted(CommandKind::CreateRootPane))?;
        let (Some(pane), Some(node)) = (self.params.pane_id, self.params.node_id) else {
            return Err(CommandError::NotExecuted(CommandKind::CreateRootPane));
        };
        if model.root().map(|root| root.node_id()) != Some(node) {
            return Err(drift(format!("{node} is no longer the root")));
        }
        model.set_root(None);
        model.set_focus(prior_focus)?;
        self.applied = None;
        Ok(ExecutionResult::ok()
            .with_panes([pane])
            .with_nodes([node])
            .structural())
    }
}

impl Command for CreateRootPane {
    command_common!(CommandKind::CreateRootPane);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if !model.is_empty() {
            result.push(ValidationError::TreeNotEmpty);
        }
        check_room(model, &mut result);
        check_fresh_ids(model, self.params.pane_id, self.params.node_id, &mut result);
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

// -------------------------------------------------------------------------
// SplitPane
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SplitPaneParams {
    target: PaneId,
    direction: SplitDirection,
    /// Share of the target's area given to the new pane.
    ratio: f64,
    content_ref: ContentRef,
    #[serde(default)]
    pane_id: Option<PaneId>,
    #[serde(default)]
    node_id: Option<NodeId>,
    #[serde(default)]
    wrapper_id: Option<NodeId>,
}

impl SplitPaneParams {
    fn describe(&self) -> String {
        format!("Split {} {:?}", self.target, self.direction)
    }
}

/// Create a pane next to `target`, taking `ratio` of the target's area.
#[derive(Debug, Clone)]
pub struct SplitPane {
    meta: CommandMeta,
    params: SplitPaneParams,
    applied: Option<Attachment>,
}

command_ctor!(SplitPane, SplitPaneParams);

impl SplitPane {
    #[must_use]
    pub fn new(
        target: PaneId,
        direction: SplitDirection,
        ratio: f64,
        content_ref: impl Into<ContentRef>,
    ) -> Self {
        Self::from_params(SplitPaneParams {
            target,
            direction,
            ratio,
            content_ref: content_ref.into(),
            pane_id: None,
            node_id: None,
            wrapper_id: None,
        })
    }

    /// Use an explicit pane id instead of a generated one.
    #[must_use]
    pub fn with_pane_id(mut self, pane: PaneId) -> Self {
        self.params.pane_id = Some(pane);
        self
    }

    /// Use an explicit node id for the new leaf.
    #[must_use]
    pub fn with_node_id(mut self, node: NodeId) -> Self {
        self.params.node_id = Some(node);
        self
    }

    #[must_use]
    pub fn target(&self) -> PaneId {
        self.params.target
    }

    /// Id of the new pane, known once supplied or executed.
    #[must_use]
    pub fn pane_id(&self) -> Option<PaneId> {
        self.params.pane_id
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let target = self.params.target;
        if !model.contains_pane(target) {
            return Err(ValidationError::PaneNotFound(target).into());
        }
        let pane = pane_id_slot(model, &mut self.params.pane_id)?;
        let node = node_id_slot(model, &mut self.params.node_id)?;
        let leaf = Arc::new(Node::Leaf(LeafNode::new(
            node,
            pane,
            self.params.content_ref.clone(),
        )));
        let attachment = attach(
            model,
            target,
            self.params.direction,
            self.params.ratio,
            leaf,
            &mut self.params.wrapper_id,
        )?;
        let touched = attachment.touched_node();
        self.applied = Some(attachment);
        Ok(ExecutionResult::ok()
            .with_panes([target, pane])
            .with_nodes([node, touched])
            .structural())
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let attachment = self
            .applied
            .as_ref()
            .ok_or(CommandError::NotExecuted(CommandKind::SplitPane))?;
        undo_attach(model, attachment)?;
        let touched = attachment.touched_node();
        self.applied = None;
        Ok(ExecutionResult::ok()
            .with_panes([self.params.target])
            .with_panes(self.params.pane_id)
            .with_nodes(self.params.node_id)
            .with_nodes([touched])
            .structural())
    }
}

impl Command for SplitPane {
    command_common!(CommandKind::SplitPane);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if check_pane(model, self.params.target, &mut result) {
            let orientation = self.params.direction.orientation();
            check_depth(model, self.params.target, orientation, &mut result);
        }
        check_new_share(self.params.ratio, &mut result);
        check_room(model, &mut result);
        check_fresh_ids(model, self.params.pane_id, self.params.node_id, &mut result);
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

// -------------------------------------------------------------------------
// ClosePane
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClosePaneParams {
    pane: PaneId,
}

impl ClosePaneParams {
    fn describe(&self) -> String {
        format!("Close {}", self.pane)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CloseState {
    detachment: Detachment,
    prior_focus: Option<PaneId>,
    prior_selection: BTreeSet<PaneId>,
}

/// Remove a pane. Focus moves to the nearest remaining pane; closing the
/// last pane empties the tree.
#[derive(Debug, Clone)]
pub struct ClosePane {
    meta: CommandMeta,
    params: ClosePaneParams,
    applied: Option<CloseState>,
}

command_ctor!(ClosePane, ClosePaneParams);

impl ClosePane {
    #[must_use]
    pub fn new(pane: PaneId) -> Self {
        Self::from_params(ClosePaneParams { pane })
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let pane = self.params.pane;
        require_unlocked(model, pane)?;
        let order = model.pane_ids();
        let prior_focus = model.focused_pane_id();
        let prior_selection = model.selected_pane_ids().clone();

        let (leaf, detachment) = detach(model, pane)?;
        let mut changed_panes = vec![pane];
        if prior_focus == Some(pane) {
            let next = nearest_pane(&order, pane);
            model.set_focus(next)?;
            changed_panes.extend(next);
        }
        if prior_selection.contains(&pane) {
            let mut selection = prior_selection.clone();
            selection.remove(&pane);
            model.set_selection(selection)?;
        }

        let result = ExecutionResult::ok()
            .with_panes(changed_panes)
            .with_nodes([leaf.node_id()])
            .with_nodes(detachment.touched_node())
            .structural();
        self.applied = Some(CloseState {
            detachment,
            prior_focus,
            prior_selection,
        });
        Ok(result)
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let state = self
            .applied
            .as_ref()
            .ok_or(CommandError::NotExecuted(CommandKind::ClosePane))?;
        undo_detach(model, &state.detachment)?;
        model.set_selection(state.prior_selection.clone())?;
        model.set_focus(state.prior_focus)?;
        let touched = state.detachment.touched_node();
        self.applied = None;
        Ok(ExecutionResult::ok()
            .with_panes([self.params.pane])
            .with_nodes(touched)
            .structural())
    }
}

impl Command for ClosePane {
    command_common!(CommandKind::ClosePane);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if check_pane(model, self.params.pane, &mut result) {
            check_unlocked(model, self.params.pane, &mut result);
        }
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

// -------------------------------------------------------------------------
// ResizeDivider
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ResizeParams {
    split: NodeId,
    divider: usize,
    /// Absolute divider position within the split, in `[0, 1]`.
    position: f64,
}

impl ResizeParams {
    fn describe(&self) -> String {
        format!("Resize {} divider {}", self.split, self.divider)
    }
}

/// Ratios after moving divider `divider` of `split` to `position`.
///
/// Divider `i` sits at `sum(ratios[..=i])`. Only children `i` and `i + 1`
/// change.
pub fn resized_ratios(
    split: &SplitNode,
    divider: usize,
    position: f64,
    mode: RatioMode,
) -> Result<Vec<f64>, ValidationError> {
    let ratios = split.ratios();
    let dividers = split.len().saturating_sub(1);
    if divider >= dividers || ratios.len() != split.len() {
        return Err(ValidationError::DividerOutOfRange {
            split: split.node_id(),
            divider,
            dividers,
        });
    }
    let start: f64 = ratios[..divider].iter().sum();
    let end = start + ratios[divider] + ratios[divider + 1];
    let inside = match mode {
        RatioMode::Strict => position > start && position < end,
        RatioMode::Lenient => position >= start && position <= end,
    };
    if !position.is_finite() || !inside {
        return Err(ValidationError::PositionOutOfRange {
            split: split.node_id(),
            divider,
            position,
            min: start,
            max: end,
        });
    }
    let mut next = ratios.to_vec();
    next[divider] = position - start;
    next[divider + 1] = end - position;
    Ok(next)
}

/// Move one divider of a split. Consecutive resizes of the same divider
/// merge into one undo step.
#[derive(Debug, Clone)]
pub struct ResizeDivider {
    meta: CommandMeta,
    params: ResizeParams,
    /// Ratios before the first resize in a merged chain.
    applied: Option<Vec<f64>>,
}

command_ctor!(ResizeDivider, ResizeParams);

impl ResizeDivider {
    #[must_use]
    pub fn new(split: NodeId, divider: usize, position: f64) -> Self {
        Self::from_params(ResizeParams {
            split,
            divider,
            position,
        })
    }

    #[must_use]
    pub fn split(&self) -> NodeId {
        self.params.split
    }

    #[must_use]
    pub fn divider(&self) -> usize {
        self.params.divider
    }

    #[must_use]
    pub fn position(&self) -> f64 {
        self.params.position
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let id = self.params.split;
        let split = model.split(id).ok_or(ValidationError::NotASplit(id))?;
        let current = split.ratios().to_vec();
        let next = resized_ratios(
            split,
            self.params.divider,
            self.params.position,
            model.ratio_mode(),
        )?;
        model.edit_split(id, |split, mode| split.set_ratios(next, mode))?;
        if self.applied.is_none() {
            self.applied = Some(current);
        }
        Ok(ExecutionResult::ok().with_nodes([id]))
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let prior = self
            .applied
            .clone()
            .ok_or(CommandError::NotExecuted(CommandKind::ResizeDivider))?;
        let id = self.params.split;
        model.edit_split(id, |split, mode| split.set_ratios(prior, mode))?;
        self.applied = None;
        Ok(ExecutionResult::ok().with_nodes([id]))
    }
}

impl Command for ResizeDivider {
    command_common!(CommandKind::ResizeDivider);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let id = self.params.split;
        let Some(node) = model.node(id) else {
            return ValidationResult::invalid(ValidationError::NodeNotFound(id));
        };
        let Some(split) = node.as_split() else {
            return ValidationResult::invalid(ValidationError::NotASplit(id));
        };
        match resized_ratios(split, self.params.divider, self.params.position, model.ratio_mode()) {
            Ok(_) => ValidationResult::ok(),
            Err(err) => ValidationResult::invalid(err),
        }
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }

    fn merge_key(&self) -> Option<MergeKey> {
        Some(MergeKey::Divider {
            split: self.params.split,
            divider: self.params.divider,
        })
    }

    fn can_merge_with(&self, next: &dyn Command) -> bool {
        next.as_any()
            .downcast_ref::<Self>()
            .is_some_and(|next| {
                next.params.split == self.params.split && next.params.divider == self.params.divider
            })
    }

    fn merge_with(&self, next: &dyn Command) -> Option<Box<dyn Command>> {
        let next = next.as_any().downcast_ref::<Self>()?;
        Some(Box::new(Self {
            meta: CommandMeta {
                id: self.meta.id,
                timestamp_ms: next.meta.timestamp_ms,
                description: next.meta.description.clone(),
            },
            params: next.params.clone(),
            // Keep the pre-state of the first command in the chain.
            applied: self.applied.clone().or_else(|| next.applied.clone()),
        }))
    }
}

// -------------------------------------------------------------------------
// EqualizeSplit
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EqualizeParams {
    split: NodeId,
}

impl EqualizeParams {
    fn describe(&self) -> String {
        format!("Equalize {}", self.split)
    }
}

/// Give every child of a split the same share.
#[derive(Debug, Clone)]
pub struct EqualizeSplit {
    meta: CommandMeta,
    params: EqualizeParams,
    applied: Option<Vec<f64>>,
}

command_ctor!(EqualizeSplit, EqualizeParams);

impl EqualizeSplit {
    #[must_use]
    pub fn new(split: NodeId) -> Self {
        Self::from_params(EqualizeParams { split })
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let id = self.params.split;
        let prior = model.edit_split(id, |split, mode| {
            let ratios = equal_ratios(split.len());
            split.set_ratios(ratios, mode)
        })?;
        self.applied = Some(prior);
        Ok(ExecutionResult::ok().with_nodes([id]))
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let prior = self
            .applied
            .clone()
            .ok_or(CommandError::NotExecuted(CommandKind::EqualizeSplit))?;
        let id = self.params.split;
        model.edit_split(id, |split, mode| split.set_ratios(prior, mode))?;
        self.applied = None;
        Ok(ExecutionResult::ok().with_nodes([id]))
    }
}

impl Command for EqualizeSplit {
    command_common!(CommandKind::EqualizeSplit);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let id = self.params.split;
        match model.node(id) {
            None => ValidationResult::invalid(ValidationError::NodeNotFound(id)),
            Some(node) if node.as_split().is_none() => {
                ValidationResult::invalid(ValidationError::NotASplit(id))
            }
            Some(_) => ValidationResult::ok(),
        }
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

// -------------------------------------------------------------------------
// SwapPanes
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SwapParams {
    first: PaneId,
    second: PaneId,
}

impl SwapParams {
    fn describe(&self) -> String {
        format!("Swap {} and {}", self.first, self.second)
    }
}

/// Exchange the positions of two panes. Ids travel with their leaves.
#[derive(Debug, Clone)]
pub struct SwapPanes {
    meta: CommandMeta,
    params: SwapParams,
    applied: Option<()>,
}

command_ctor!(SwapPanes, SwapParams);

impl SwapPanes {
    #[must_use]
    pub fn new(first: PaneId, second: PaneId) -> Self {
        Self::from_params(SwapParams { first, second })
    }

    fn swap(model: &mut TreeModel, first: PaneId, second: PaneId) -> Result<ExecutionResult, CommandError> {
        if first == second {
            return Err(ValidationError::SamePane(first).into());
        }
        let first_node = model.leaf_node_id(first)?;
        let second_node = model.leaf_node_id(second)?;
        let first_entry = *model
            .entry(first_node)
            .ok_or(ModelError::NodeNotFound(first_node))?;
        let second_entry = *model
            .entry(second_node)
            .ok_or(ModelError::NodeNotFound(second_node))?;
        let (Some(first_parent), Some(second_parent)) = (first_entry.parent, second_entry.parent)
        else {
            return Err(drift("a root pane has no sibling to swap with".into()));
        };
        let first_leaf = model
            .node_arc(first_node)
            .ok_or(ModelError::NodeNotFound(first_node))?;
        let second_leaf = model
            .node_arc(second_node)
            .ok_or(ModelError::NodeNotFound(second_node))?;

        model.edit_split(first_parent, |split, _| {
            split.replace_child(first_entry.index, Arc::clone(&second_leaf))
        })?;
        if let Err(err) = model.edit_split(second_parent, |split, _| {
            split.replace_child(second_entry.index, Arc::clone(&first_leaf))
        }) {
            model.edit_split(first_parent, |split, _| {
                split.replace_child(first_entry.index, first_leaf)
            })?;
            return Err(err.into());
        }
        Ok(ExecutionResult::ok()
            .with_panes([first, second])
            .with_nodes([first_parent, second_parent])
            .structural())
    }
}

impl Command for SwapPanes {
    command_common!(CommandKind::SwapPanes);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let SwapParams { first, second } = self.params;
        if first == second {
            result.push(ValidationError::SamePane(first));
            return result;
        }
        for pane in [first, second] {
            if check_pane(model, pane, &mut result) {
                check_unlocked(model, pane, &mut result);
            }
        }
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        let SwapParams { first, second } = self.params;
        for pane in [first, second] {
            if let Err(err) = require_unlocked(model, pane) {
                return ExecutionResult::failed(err);
            }
        }
        let result = Self::swap(model, first, second);
        if result.is_ok() {
            self.applied = Some(());
        }
        result.into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        if self.applied.is_none() {
            return ExecutionResult::failed(CommandError::NotExecuted(CommandKind::SwapPanes));
        }
        let result = Self::swap(model, self.params.second, self.params.first);
        if result.is_ok() {
            self.applied = None;
        }
        result.into()
    }
}

// -------------------------------------------------------------------------
// MovePane
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MovePaneParams {
    pane: PaneId,
    target: PaneId,
    direction: SplitDirection,
    ratio: f64,
    #[serde(default)]
    wrapper_id: Option<NodeId>,
}

impl MovePaneParams {
    fn describe(&self) -> String {
        format!("Move {} {:?} of {}", self.pane, self.direction, self.target)
    }
}

/// Detach a pane and re-attach it next to another pane.
#[derive(Debug, Clone)]
pub struct MovePane {
    meta: CommandMeta,
    params: MovePaneParams,
    applied: Option<(Detachment, Attachment)>,
}

command_ctor!(MovePane, MovePaneParams);

impl MovePane {
    #[must_use]
    pub fn new(pane: PaneId, target: PaneId, direction: SplitDirection, ratio: f64) -> Self {
        Self::from_params(MovePaneParams {
            pane,
            target,
            direction,
            ratio,
            wrapper_id: None,
        })
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let MovePaneParams {
            pane,
            target,
            direction,
            ratio,
            ..
        } = self.params;
        if pane == target {
            return Err(ValidationError::SamePane(pane).into());
        }
        require_unlocked(model, pane)?;
        if !model.contains_pane(target) {
            return Err(ValidationError::PaneNotFound(target).into());
        }

        let (leaf, detachment) = detach(model, pane)?;
        let leaf_id = leaf.node_id();
        let attachment = match attach(model, target, direction, ratio, leaf, &mut self.params.wrapper_id) {
            Ok(attachment) => attachment,
            Err(err) => {
                if let Err(restore) = undo_detach(model, &detachment) {
                    return Err(drift(format!(
                        "{err}; putting {pane} back failed: {restore}"
                    )));
                }
                return Err(err);
            }
        };
        let result = ExecutionResult::ok()
            .with_panes([pane, target])
            .with_nodes([leaf_id, attachment.touched_node()])
            .with_nodes(detachment.touched_node())
            .structural();
        self.applied = Some((detachment, attachment));
        Ok(result)
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let (detachment, attachment) = self
            .applied
            .as_ref()
            .ok_or(CommandError::NotExecuted(CommandKind::MovePane))?;
        undo_attach(model, attachment)?;
        undo_detach(model, detachment)?;
        let result = ExecutionResult::ok()
            .with_panes([self.params.pane, self.params.target])
            .with_nodes([attachment.touched_node()])
            .with_nodes(detachment.touched_node())
            .structural();
        self.applied = None;
        Ok(result)
    }
}

impl Command for MovePane {
    command_common!(CommandKind::MovePane);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let MovePaneParams { pane, target, ratio, .. } = self.params;
        if pane == target {
            result.push(ValidationError::SamePane(pane));
            return result;
        }
        if check_pane(model, pane, &mut result) {
            check_unlocked(model, pane, &mut result);
        }
        if check_pane(model, target, &mut result) {
            check_depth(model, target, self.params.direction.orientation(), &mut result);
        }
        check_new_share(ratio, &mut result);
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

// -------------------------------------------------------------------------
// FocusPane
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FocusParams {
    pane: Option<PaneId>,
}

impl FocusParams {
    fn describe(&self) -> String {
        match self.pane {
            Some(pane) => format!("Focus {pane}"),
            None => "Clear focus".to_string(),
        }
    }
}

/// Move focus to a pane, or clear it.
#[derive(Debug, Clone)]
pub struct FocusPane {
    meta: CommandMeta,
    params: FocusParams,
    applied: Option<Option<PaneId>>,
}

command_ctor!(FocusPane, FocusParams);

impl FocusPane {
    #[must_use]
    pub fn new(pane: Option<PaneId>) -> Self {
        Self::from_params(FocusParams { pane })
    }
}

impl Command for FocusPane {
    command_common!(CommandKind::FocusPane);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if let Some(pane) = self.params.pane {
            check_pane(model, pane, &mut result);
        }
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        match model.set_focus(self.params.pane) {
            Ok(prior) => {
                self.applied = Some(prior);
                ExecutionResult::ok()
                    .with_panes(prior)
                    .with_panes(self.params.pane)
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        let Some(prior) = self.applied else {
            return ExecutionResult::failed(CommandError::NotExecuted(CommandKind::FocusPane));
        };
        match model.set_focus(prior) {
            Ok(_) => {
                self.applied = None;
                ExecutionResult::ok()
                    .with_panes(prior)
                    .with_panes(self.params.pane)
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }
}

// -------------------------------------------------------------------------
// SetSelection
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SelectionParams {
    panes: BTreeSet<PaneId>,
}

impl SelectionParams {
    fn describe(&self) -> String {
        format!("Select {} pane(s)", self.panes.len())
    }
}

/// Replace the selected pane set.
#[derive(Debug, Clone)]
pub struct SetSelection {
    meta: CommandMeta,
    params: SelectionParams,
    applied: Option<BTreeSet<PaneId>>,
}

command_ctor!(SetSelection, SelectionParams);

impl SetSelection {
    #[must_use]
    pub fn new(panes: impl IntoIterator<Item = PaneId>) -> Self {
        Self::from_params(SelectionParams {
            panes: panes.into_iter().collect(),
        })
    }
}

impl Command for SetSelection {
    command_common!(CommandKind::SetSelection);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        for &pane in &self.params.panes {
            check_pane(model, pane, &mut result);
        }
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        match model.set_selection(self.params.panes.clone()) {
            Ok(prior) => {
                let changed: BTreeSet<PaneId> =
                    prior.symmetric_difference(&self.params.panes).copied().collect();
                self.applied = Some(prior);
                ExecutionResult::ok().with_panes(changed)
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        let Some(prior) = self.applied.clone() else {
            return ExecutionResult::failed(CommandError::NotExecuted(CommandKind::SetSelection));
        };
        let changed: BTreeSet<PaneId> =
            prior.symmetric_difference(&self.params.panes).copied().collect();
        match model.set_selection(prior) {
            Ok(_) => {
                self.applied = None;
                ExecutionResult::ok().with_panes(changed)
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }
}

// -------------------------------------------------------------------------
// SetPaneLock
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LockParams {
    pane: PaneId,
    locked: bool,
}

impl LockParams {
    fn describe(&self) -> String {
        if self.locked {
            format!("Lock {}", self.pane)
        } else {
            format!("Unlock {}", self.pane)
        }
    }
}

/// Lock or unlock a pane. Locked panes refuse close, move, swap, and
/// content replacement.
#[derive(Debug, Clone)]
pub struct SetPaneLock {
    meta: CommandMeta,
    params: LockParams,
    applied: Option<bool>,
}

command_ctor!(SetPaneLock, LockParams);

impl SetPaneLock {
    #[must_use]
    pub fn new(pane: PaneId, locked: bool) -> Self {
        Self::from_params(LockParams { pane, locked })
    }
}

impl Command for SetPaneLock {
    command_common!(CommandKind::SetPaneLock);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        check_pane(model, self.params.pane, &mut result);
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        match model.set_locked(self.params.pane, self.params.locked) {
            Ok(prior) => {
                self.applied = Some(prior);
                ExecutionResult::ok().with_panes([self.params.pane])
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        let Some(prior) = self.applied else {
            return ExecutionResult::failed(CommandError::NotExecuted(CommandKind::SetPaneLock));
        };
        match model.set_locked(self.params.pane, prior) {
            Ok(_) => {
                self.applied = None;
                ExecutionResult::ok().with_panes([self.params.pane])
            }
            Err(err) => ExecutionResult::failed(err),
        }
    }
}

// -------------------------------------------------------------------------
// SetContent
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ContentParams {
    pane: PaneId,
    content_ref: ContentRef,
}

impl ContentParams {
    fn describe(&self) -> String {
        format!("Show {} in {}", self.content_ref, self.pane)
    }
}

/// Replace the content reference of a pane.
#[derive(Debug, Clone)]
pub struct SetContent {
    meta: CommandMeta,
    params: ContentParams,
    applied: Option<ContentRef>,
}

command_ctor!(SetContent, ContentParams);

impl SetContent {
    #[must_use]
    pub fn new(pane: PaneId, content_ref: impl Into<ContentRef>) -> Self {
        Self::from_params(ContentParams {
            pane,
            content_ref: content_ref.into(),
        })
    }

    fn apply(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let pane = self.params.pane;
        require_unlocked(model, pane)?;
        let content = self.params.content_ref.clone();
        let prior = model.edit_leaf(pane, |leaf| std::mem::replace(&mut leaf.content_ref, content))?;
        let node = model.leaf_node_id(pane)?;
        self.applied = Some(prior);
        Ok(ExecutionResult::ok().with_panes([pane]).with_nodes([node]))
    }

    fn revert(&mut self, model: &mut TreeModel) -> Result<ExecutionResult, CommandError> {
        let prior = self
            .applied
            .clone()
            .ok_or(CommandError::NotExecuted(CommandKind::SetContent))?;
        let pane = self.params.pane;
        model.edit_leaf(pane, |leaf| leaf.content_ref = prior)?;
        let node = model.leaf_node_id(pane)?;
        self.applied = None;
        Ok(ExecutionResult::ok().with_panes([pane]).with_nodes([node]))
    }
}

impl Command for SetContent {
    command_common!(CommandKind::SetContent);

    fn validate(&self, model: &TreeModel) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if check_pane(model, self.params.pane, &mut result) {
            check_unlocked(model, self.params.pane, &mut result);
        }
        result
    }

    fn execute(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.apply(model).into()
    }

    fn undo(&mut self, model: &mut TreeModel) -> ExecutionResult {
        self.revert(model).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn single(content: &str) -> (TreeModel, PaneId) {
        let model = TreeModel::with_root_pane(ModelConfig::default(), content).expect("model");
        let pane = model.pane_ids()[0];
        (model, pane)
    }

    fn run(model: &mut TreeModel, cmd: &mut dyn Command) -> ExecutionResult {
        let validation = cmd.validate(model);
        assert!(validation.is_valid(), "{:?}", validation.errors());
        let result = cmd.execute(model);
        assert!(result.success, "{:?}", result.error);
        assert!(model.validate().is_empty(), "{:?}", model.validate());
        result
    }

    fn ratios_of(model: &TreeModel) -> Vec<f64> {
        model
            .root()
            .and_then(|root| root.as_split())
            .map(|split| split.ratios().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn split_right_wraps_root_leaf() {
        let (mut model, a) = single("a");
        let before = model.capture_state();
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.3, "b");
        run(&mut model, &mut split);

        let root = model.root().expect("root");
        let root_split = root.as_split().expect("root is a split");
        assert_eq!(root_split.orientation(), Orientation::Horizontal);
        assert_eq!(model.pane_ids(), vec![a, split.pane_id().expect("new pane")]);
        let ratios = ratios_of(&model);
        assert!((ratios[0] - 0.7).abs() < 1e-9);
        assert!((ratios[1] - 0.3).abs() < 1e-9);

        assert!(split.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn split_left_puts_new_pane_first() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Left, 0.25, "b");
        run(&mut model, &mut split);
        let new = split.pane_id().expect("new pane");
        assert_eq!(model.pane_ids(), vec![new, a]);
        assert_eq!(ratios_of(&model), vec![0.25, 0.75]);
    }

    #[test]
    fn split_in_same_axis_parent_inserts_sibling() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let b = first.pane_id().expect("b");
        let mut second = SplitPane::new(b, SplitDirection::Right, 0.5, "c");
        run(&mut model, &mut second);

        let root = model.root().expect("root").as_split().expect("split");
        assert_eq!(root.len(), 3);
        assert_eq!(ratios_of(&model), vec![0.5, 0.25, 0.25]);

        assert!(second.undo(&mut model).success);
        assert_eq!(ratios_of(&model), vec![0.5, 0.5]);
        assert!(model.validate().is_empty());
    }

    #[test]
    fn split_cross_axis_wraps_target() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let mut down = SplitPane::new(a, SplitDirection::Down, 0.5, "c");
        run(&mut model, &mut down);
        let a_node = model.leaf_node_id(a).expect("a");
        let parent = model.parent_of(a_node).expect("wrapped");
        assert_eq!(
            model.split(parent).expect("wrapper").orientation(),
            Orientation::Vertical
        );
    }

    #[test]
    fn redo_reuses_allocated_ids() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Down, 0.5, "b");
        run(&mut model, &mut split);
        let first_ids = (split.pane_id(), model.root().map(|r| r.node_id()));
        assert!(split.undo(&mut model).success);
        run(&mut model, &mut split);
        assert_eq!(first_ids, (split.pane_id(), model.root().map(|r| r.node_id())));

        // The generator has moved past them anyway.
        let fresh = model.generate_pane_id().expect("fresh");
        assert!(Some(fresh) > split.pane_id());
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let (model, a) = single("a");
        let split = SplitPane::new(a, SplitDirection::Right, 1.5, "b");
        let result = split.validate(&model);
        assert!(matches!(
            result.errors(),
            [ValidationError::InvalidRatio { value, .. }] if (*value - 1.5).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn pane_limit_is_enforced() {
        let mut model =
            TreeModel::with_root_pane(ModelConfig::default().with_max_panes(1), "a").expect("model");
        let a = model.pane_ids()[0];
        let split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        assert!(
            split
                .validate(&model)
                .errors()
                .contains(&ValidationError::PaneLimitReached { limit: 1 })
        );
        let mut open = CreateRootPane::new("x");
        model.reset();
        assert!(open.validate(&model).is_valid());
        assert!(open.execute(&mut model).success);
    }

    #[test]
    fn depth_limit_blocks_wrapping_but_not_siblings() {
        let config = ModelConfig::default().with_max_depth(Some(2));
        let mut model = TreeModel::with_root_pane(config, "a").expect("model");
        let a = model.pane_ids()[0];
        let mut right = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut right);
        let b = right.pane_id().expect("b");

        let down = SplitPane::new(b, SplitDirection::Down, 0.5, "c");
        assert_eq!(
            down.validate(&model).errors(),
            &[ValidationError::DepthLimitReached { pane: b, limit: 2 }]
        );
        let mut sibling = SplitPane::new(b, SplitDirection::Right, 0.5, "c");
        assert!(sibling.validate(&model).is_valid());
        run(&mut model, &mut sibling);
        assert_eq!(model.pane_count(), 3);
        assert!(model.is_valid());
    }

    #[test]
    fn close_collapses_parent_and_moves_focus() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut split);
        let b = split.pane_id().expect("b");
        model.set_focus(Some(b)).expect("focus");
        model.set_selection(BTreeSet::from([a, b])).expect("select");
        let before = model.capture_state();

        let mut close = ClosePane::new(b);
        run(&mut model, &mut close);
        assert_eq!(model.pane_ids(), vec![a]);
        assert!(model.root().expect("root").as_leaf().is_some());
        assert_eq!(model.focused_pane_id(), Some(a));
        assert_eq!(model.selected_pane_ids(), &BTreeSet::from([a]));

        assert!(close.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn close_in_wide_split_rebalances() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let b = first.pane_id().expect("b");
        let mut second = SplitPane::new(b, SplitDirection::Right, 0.5, "c");
        run(&mut model, &mut second);
        let before = model.capture_state();

        let mut close = ClosePane::new(a);
        run(&mut model, &mut close);
        let ratios = ratios_of(&model);
        assert!((ratios[0] - 0.5).abs() < 1e-9 && (ratios[1] - 0.5).abs() < 1e-9);

        assert!(close.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn closing_last_pane_empties_tree() {
        let (mut model, a) = single("a");
        let mut close = ClosePane::new(a);
        run(&mut model, &mut close);
        assert!(model.is_empty());
        assert_eq!(model.focused_pane_id(), None);
        assert!(close.undo(&mut model).success);
        assert_eq!(model.pane_ids(), vec![a]);
        assert_eq!(model.focused_pane_id(), Some(a));
    }

    #[test]
    fn locked_panes_refuse_destructive_commands() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut split);
        let b = split.pane_id().expect("b");
        model.set_locked(a, true).expect("lock");

        assert!(!ClosePane::new(a).validate(&model).is_valid());
        assert!(!SwapPanes::new(a, b).validate(&model).is_valid());
        assert!(!MovePane::new(a, b, SplitDirection::Down, 0.5).validate(&model).is_valid());
        assert!(!SetContent::new(a, "z").validate(&model).is_valid());
        // Execute refuses too, even without prior validation.
        let mut close = ClosePane::new(a);
        assert!(!close.execute(&mut model).success);
        assert_eq!(model.pane_count(), 2);
    }

    #[test]
    fn resize_moves_only_right_neighbour() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let b = first.pane_id().expect("b");
        let mut second = SplitPane::new(b, SplitDirection::Right, 0.5, "c");
        run(&mut model, &mut second);
        let root = model.root().expect("root").node_id();

        // Ratios [0.5, 0.25, 0.25]; divider 1 sits at 0.75.
        let mut resize = ResizeDivider::new(root, 1, 0.9);
        run(&mut model, &mut resize);
        let ratios = ratios_of(&model);
        assert!((ratios[0] - 0.5).abs() < 1e-9);
        assert!((ratios[1] - 0.4).abs() < 1e-9);
        assert!((ratios[2] - 0.1).abs() < 1e-9);

        assert!(resize.undo(&mut model).success);
        assert_eq!(ratios_of(&model), vec![0.5, 0.25, 0.25]);

        let too_far = ResizeDivider::new(root, 1, 0.4);
        assert!(matches!(
            too_far.validate(&model).errors(),
            [ValidationError::PositionOutOfRange { .. }]
        ));
        let no_divider = ResizeDivider::new(root, 2, 0.9);
        assert!(matches!(
            no_divider.validate(&model).errors(),
            [ValidationError::DividerOutOfRange { dividers: 2, .. }]
        ));
    }

    #[test]
    fn resize_merge_keeps_first_prior_state() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut split);
        let root = model.root().expect("root").node_id();

        let mut first = ResizeDivider::new(root, 0, 0.6).with_timestamp(1_000);
        run(&mut model, &mut first);
        let second = ResizeDivider::new(root, 0, 0.65).with_timestamp(1_050);
        assert!(first.can_merge_with(&second));
        let mut merged = first.merge_with(&second).expect("merge");
        assert_eq!(merged.timestamp(), 1_050);
        assert_eq!(merged.id(), first.id());

        assert!(merged.execute(&mut model).success);
        let ratios = ratios_of(&model);
        assert!((ratios[0] - 0.65).abs() < 1e-9);
        assert!(merged.undo(&mut model).success);
        assert_eq!(ratios_of(&model), vec![0.5, 0.5]);

        let other_divider = EqualizeSplit::new(root);
        assert!(!first.can_merge_with(&other_divider));
    }

    #[test]
    fn equalize_and_undo() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Up, 0.2, "b");
        run(&mut model, &mut split);
        let root = model.root().expect("root").node_id();
        let mut equalize = EqualizeSplit::new(root);
        run(&mut model, &mut equalize);
        assert_eq!(ratios_of(&model), vec![0.5, 0.5]);
        assert!(equalize.undo(&mut model).success);
        assert_eq!(ratios_of(&model), vec![0.2, 0.8]);
    }

    #[test]
    fn swap_exchanges_positions() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let b = first.pane_id().expect("b");
        let mut down = SplitPane::new(b, SplitDirection::Down, 0.5, "c");
        run(&mut model, &mut down);
        let c = down.pane_id().expect("c");
        let before = model.capture_state();

        let mut swap = SwapPanes::new(a, c);
        run(&mut model, &mut swap);
        assert_eq!(model.pane_ids(), vec![c, b, a]);
        assert!(swap.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
        assert!(!SwapPanes::new(a, a).validate(&model).is_valid());
    }

    #[test]
    fn move_pane_and_undo() {
        let (mut model, a) = single("a");
        let mut first = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut first);
        let b = first.pane_id().expect("b");
        let mut second = SplitPane::new(b, SplitDirection::Right, 0.5, "c");
        run(&mut model, &mut second);
        let c = second.pane_id().expect("c");
        let before = model.capture_state();

        let mut mv = MovePane::new(a, c, SplitDirection::Down, 0.5);
        run(&mut model, &mut mv);
        assert_eq!(model.pane_ids(), vec![b, c, a]);
        let a_node = model.leaf_node_id(a).expect("a");
        let parent = model.parent_of(a_node).expect("parent");
        assert_eq!(model.split(parent).expect("split").orientation(), Orientation::Vertical);

        assert!(mv.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn move_next_to_collapsed_sibling() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut split);
        let b = split.pane_id().expect("b");
        let before = model.capture_state();

        let mut mv = MovePane::new(a, b, SplitDirection::Down, 0.3);
        run(&mut model, &mut mv);
        assert_eq!(model.pane_ids(), vec![b, a]);
        assert!(mv.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn focus_selection_lock_content_round_trip() {
        let (mut model, a) = single("a");
        let mut split = SplitPane::new(a, SplitDirection::Right, 0.5, "b");
        run(&mut model, &mut split);
        let b = split.pane_id().expect("b");
        let before = model.capture_state();

        let mut focus = FocusPane::new(Some(b));
        let mut select = SetSelection::new([a, b]);
        let mut lock = SetPaneLock::new(b, true);
        let mut content = SetContent::new(a, "logs");
        run(&mut model, &mut focus);
        run(&mut model, &mut select);
        run(&mut model, &mut content);
        run(&mut model, &mut lock);
        assert_eq!(model.focused_pane_id(), Some(b));
        assert_eq!(model.leaf(a).expect("a").content_ref.as_str(), "logs");
        assert!(model.is_locked(b));

        assert!(lock.undo(&mut model).success);
        assert!(content.undo(&mut model).success);
        assert!(select.undo(&mut model).success);
        assert!(focus.undo(&mut model).success);
        assert_eq!(model.capture_state(), before);
    }

    #[test]
    fn undo_before_execute_is_an_error() {
        let (mut model, a) = single("a");
        let mut close = ClosePane::new(a);
        let result = close.undo(&mut model);
        assert_eq!(
            result.error,
            Some(CommandError::NotExecuted(CommandKind::ClosePane))
        );
    }

    #[test]
    fn records_decode_back() {
        let (_, a) = single("a");
        let split = SplitPane::new(a, SplitDirection::Down, 0.4, "b").with_timestamp(77);
        let record = split.to_record();
        assert_eq!(record.kind, "split_pane");
        assert_eq!(record.parameters["direction"], "down");
        let decoded = SplitPane::from_record(&record).expect("decode");
        assert_eq!(decoded.timestamp(), 77);
        assert_eq!(decoded.id(), split.id());
        assert_eq!(decoded.target(), a);
        assert_eq!(decoded.to_record(), record);
    }
}
