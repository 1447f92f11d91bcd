//! TreeEngine: the expansion state machine over a [`TreeIndex`].
//!
//! Every branch `(node, child-type)` is either collapsed or expanded. Expanding a materialized
//! branch shows its direct children; expanding a placeholder branch hands a [`FetchTicket`] back
//! to the caller, who resolves it through [`TreeEngine::complete_fetch`] once the data source
//! answers. Collapsing hides the whole subtree and forgets any nested expansion.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;

use super::index::{ChildFilter, TreeIndex};
use crate::{
    config::{BranchMode, TreeConfig},
    event::{Event, EventSink, TreeEvent, TreeId},
    properties::{
        Affordance, BranchKey, BranchState, ChildType, NodeDescriptor, NodeId, RowId, TreeNode,
    },
    source::FetchRequest,
    TreeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingFetch {
    pub(crate) ticket: u64,
    pub(crate) parent_row: RowId,
    /// Cleared when the branch is collapsed while its data is in flight.
    pub(crate) expand_on_arrival: bool,
}

/// An outstanding fetch for one placeholder branch. Hand it back to
/// [`TreeEngine::complete_fetch`] together with the data source's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub(crate) ticket: u64,
    pub branch: BranchKey,
    pub parent_row: RowId,
    pub request: FetchRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyExpanded,
    AlreadyLoading,
    NoChildren,
    /// The node itself is hidden (an ancestor is collapsed).
    NotVisible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandStep {
    /// The branch was already materialized and is now shown.
    Shown,
    /// The branch is a placeholder; its data must be fetched.
    Fetch(FetchTicket),
    Ignored(IgnoreReason),
}

#[derive(Debug)]
pub struct TreeEngine {
    pub(super) config: Arc<TreeConfig>,
    pub(super) mode: BranchMode,
    pub(super) index: TreeIndex,
    pub(super) expanded: BTreeSet<BranchKey>,
    pub(super) pending: BTreeMap<BranchKey, PendingFetch>,
    pub(super) next_ticket: u64,
    pub(super) events: EventSink,
}

impl TreeEngine {
    /// Scan the initial flat rows once: child rows start hidden, every branch starts collapsed and
    /// offers an expand control only if it has children.
    pub fn new<C: Into<Arc<TreeConfig>>>(
        config: C,
        rows: Vec<NodeDescriptor>,
        events: Option<UnboundedSender<Event>>,
    ) -> Self {
        TreeEngine::with_tree_id(TreeId::new(), config, rows, events)
    }

    pub fn with_tree_id<C: Into<Arc<TreeConfig>>>(
        tree: TreeId,
        config: C,
        rows: Vec<NodeDescriptor>,
        events: Option<UnboundedSender<Event>>,
    ) -> Self {
        let config = config.into();
        let mode = config.branch_mode();
        let mut index = TreeIndex::new(config.parent_grouping);
        index.insert_after(None, rows, true);
        let stray = index.normalize_placeholders(mode != BranchMode::Single);

        let mut engine = TreeEngine {
            config,
            mode,
            index,
            expanded: BTreeSet::new(),
            pending: BTreeMap::new(),
            next_ticket: 0,
            events: EventSink::new(tree, events),
        };
        if !stray.is_empty() {
            engine.events.emit(TreeEvent::RowsRemoved(stray));
        }
        engine.initialize();
        tracing::debug!(
            "[{}] initialized {} rows in {:?} mode",
            engine.tree_id(),
            engine.index.len(),
            engine.mode
        );
        engine
    }

    fn initialize(&mut self) {
        let mut hidden = Vec::new();
        let mut leads = Vec::new();
        for node in self.index.rows() {
            if self.index.is_follower(node) {
                continue;
            }
            if let Some(parent_id) = &node.parent_id {
                if self.index.get_parent(node).is_some() {
                    hidden.push(node.row);
                } else {
                    let err = TreeError::MalformedRelationship(format!(
                        "{} names missing parent '{parent_id}'; treating it as a root",
                        node.label()
                    ));
                    tracing::warn!("[{}] {err}", self.tree_id());
                }
            }
            if let Some(id) = &node.id {
                leads.push(id.clone());
            }
        }
        for row in hidden {
            self.set_row_visible(row, false);
        }
        for id in leads {
            self.emit_affordances_of(&id);
        }
    }

    pub fn tree_id(&self) -> TreeId {
        self.events.tree()
    }

    pub fn config(&self) -> &Arc<TreeConfig> {
        &self.config
    }

    pub fn mode(&self) -> BranchMode {
        self.mode
    }

    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    pub fn node(&self, id: &str) -> Option<&TreeNode> {
        self.index.node(id)
    }

    /// The branch a `(node, child_type)` request refers to under the configured mode.
    pub fn branch_key(&self, node: &str, child_type: ChildType) -> BranchKey {
        match self.mode {
            BranchMode::Single => BranchKey::new(node, None),
            BranchMode::Multiple | BranchMode::Exclusive => BranchKey::new(node, child_type),
        }
    }

    pub(super) fn filter<'k>(&self, key: &'k BranchKey) -> ChildFilter<'k> {
        match self.mode {
            BranchMode::Single => ChildFilter::All,
            BranchMode::Multiple | BranchMode::Exclusive => ChildFilter::of(&key.child_type),
        }
    }

    /// Branch-types a node offers controls for under the configured mode.
    pub(super) fn branch_types(&self, node: &TreeNode) -> Vec<ChildType> {
        let known = self.index.child_types(node);
        match self.mode {
            BranchMode::Single if known.is_empty() => Vec::new(),
            BranchMode::Single => vec![None],
            BranchMode::Multiple | BranchMode::Exclusive => known,
        }
    }

    pub fn is_expanded(&self, node: &str, child_type: ChildType) -> bool {
        self.expanded.contains(&self.branch_key(node, child_type))
    }

    pub fn is_loading(&self, node: &str, child_type: ChildType) -> bool {
        self.pending.contains_key(&self.branch_key(node, child_type))
    }

    pub fn branch_state(&self, node: &str, child_type: ChildType) -> Option<BranchState> {
        let key = self.branch_key(node, child_type);
        self.index
            .node(&key.node)
            .map(|parent| self.index.branch_state(parent, self.filter(&key)))
    }

    pub fn affordance(&self, node: &str, child_type: ChildType) -> Affordance {
        self.compute_affordance(&self.branch_key(node, child_type))
    }

    fn compute_affordance(&self, key: &BranchKey) -> Affordance {
        let Some(node) = self.index.node(&key.node) else {
            return Affordance::None;
        };
        if self.expanded.contains(key) {
            Affordance::Collapse
        } else if self.index.has_children(node, self.filter(key)) {
            Affordance::Expand
        } else {
            Affordance::None
        }
    }

    pub fn visible_rows(&self) -> Vec<RowId> {
        self.index
            .rows()
            .filter(|node| node.visible)
            .map(|node| node.row)
            .collect()
    }

    /// Ids of visible rows, in table order.
    pub fn visible_ids(&self) -> Vec<NodeId> {
        self.index
            .rows()
            .filter(|node| node.visible)
            .filter_map(|node| node.id.clone())
            .collect()
    }

    /// Branches violating the placeholder invariant. Empty for a healthy tree.
    pub fn check_invariants(&self) -> Vec<String> {
        self.index
            .check_invariants(self.mode != BranchMode::Single)
    }

    pub(super) fn audit(&self) {
        for violation in self.check_invariants() {
            tracing::warn!("[{}] invariant violated: {violation}", self.tree_id());
        }
    }

    pub(super) fn emit_affordance(&self, key: &BranchKey) {
        self.events.emit(TreeEvent::Affordance {
            node: key.node.clone(),
            child_type: key.child_type.clone(),
            affordance: self.compute_affordance(key),
        });
    }

    /// Emit the controls of every branch under `id`; a node without children gets a single
    /// `Affordance::None` for its default branch.
    pub(super) fn emit_affordances_of(&self, id: &str) {
        let Some(node) = self.index.node(id) else {
            return;
        };
        let types = self.branch_types(node);
        if types.is_empty() {
            self.events.emit(TreeEvent::Affordance {
                node: id.to_string(),
                child_type: None,
                affordance: Affordance::None,
            });
            return;
        }
        for child_type in types {
            self.emit_affordance(&BranchKey::new(id, child_type));
        }
    }

    /// Show or hide a row together with its grouped follower rows. Only changes are emitted.
    pub(super) fn set_row_visible(&mut self, row: RowId, visible: bool) {
        let mut rows = vec![row];
        if let Some(node) = self.index.get(row) {
            rows.extend(self.index.followers(node));
        }
        for row in rows {
            if let Some(node) = self.index.get_mut(row) {
                if node.visible != visible {
                    node.visible = visible;
                    self.events.emit(if visible {
                        TreeEvent::Shown(row)
                    } else {
                        TreeEvent::Hidden(row)
                    });
                }
            }
        }
    }

    pub(super) fn show_branch(&mut self, key: &BranchKey) {
        let Some(parent) = self.index.node(&key.node) else {
            return;
        };
        let direct: Vec<RowId> = self
            .index
            .get_children(parent, self.filter(key))
            .into_iter()
            .map(|child| child.row)
            .collect();
        self.expanded.insert(key.clone());
        for row in direct {
            self.set_row_visible(row, true);
        }
        self.emit_affordance(key);
        tracing::debug!("[{}] expanded {key}", self.tree_id());
    }

    /// Hide every row below the branch and return each descendant's own branches to collapsed.
    pub(super) fn reset_descendants(&mut self, key: &BranchKey) {
        let Some(parent) = self.index.node(&key.node) else {
            return;
        };
        let parent_row = parent.row;
        let rows: Vec<RowId> = self
            .index
            .get_children(parent, self.filter(key))
            .into_iter()
            .flat_map(|child| self.index.walk_branch(child.row, true))
            .filter(|row| *row != parent_row)
            .collect();

        let mut ids = Vec::new();
        for row in rows {
            self.set_row_visible(row, false);
            if let Some(node) = self.index.get(row) {
                if let (Some(id), false) = (&node.id, self.index.is_follower(node)) {
                    ids.push(id.clone());
                }
            }
        }

        let reset: BTreeSet<&NodeId> = ids.iter().collect();
        self.expanded.retain(|branch| !reset.contains(&branch.node));
        for (branch, pending) in self.pending.iter_mut() {
            if reset.contains(&branch.node) {
                pending.expand_on_arrival = false;
            }
        }
        for id in ids.iter() {
            self.emit_affordances_of(id);
        }
    }

    /// Collapsed -> Expanded. In exclusive mode, every other materialized branch-type of the node
    /// is evicted first.
    pub fn request_expand(
        &mut self,
        node: &str,
        child_type: ChildType,
    ) -> Result<ExpandStep, TreeError> {
        let key = self.branch_key(node, child_type);
        let parent_row = self
            .index
            .row_of(&key.node)
            .ok_or_else(|| TreeError::NotFound(key.node.clone()))?;

        if let Some(pending) = self.pending.get_mut(&key) {
            pending.expand_on_arrival = true;
            tracing::debug!("[{}] {key} is already loading", self.events.tree());
            return Ok(ExpandStep::Ignored(IgnoreReason::AlreadyLoading));
        }
        if self.expanded.contains(&key) {
            return Ok(ExpandStep::Ignored(IgnoreReason::AlreadyExpanded));
        }

        let Some(parent) = self.index.get(parent_row) else {
            return Err(TreeError::NotFound(key.node.clone()));
        };
        if !parent.visible {
            return Ok(ExpandStep::Ignored(IgnoreReason::NotVisible));
        }
        let state = self.index.branch_state(parent, self.filter(&key));
        if matches!(
            state,
            BranchState::Empty | BranchState::Materialized { children: 0 }
        ) {
            return Ok(ExpandStep::Ignored(IgnoreReason::NoChildren));
        }

        if self.mode == BranchMode::Exclusive {
            self.evict_other_types(&key, parent_row);
        }

        if state == BranchState::Placeholder {
            Ok(ExpandStep::Fetch(self.begin_fetch(key, parent_row)))
        } else {
            self.show_branch(&key);
            Ok(ExpandStep::Shown)
        }
    }

    /// Expanded -> Collapsed. Returns whether the branch was expanded. Collapsing a branch whose
    /// data is still in flight keeps the fetch but leaves the branch collapsed when it lands.
    pub fn collapse(&mut self, node: &str, child_type: ChildType) -> Result<bool, TreeError> {
        let key = self.branch_key(node, child_type);
        if self.index.row_of(&key.node).is_none() {
            return Err(TreeError::NotFound(key.node));
        }
        if let Some(pending) = self.pending.get_mut(&key) {
            pending.expand_on_arrival = false;
        }
        let was_expanded = self.expanded.remove(&key);
        self.reset_descendants(&key);
        self.emit_affordance(&key);
        tracing::debug!("[{}] collapsed {key}", self.tree_id());
        Ok(was_expanded)
    }
}
