//! Branch materialization: turning a placeholder branch into real rows once its fetch resolves.

use std::collections::{BTreeMap, BTreeSet};

use super::state::{FetchTicket, PendingFetch, TreeEngine};
use crate::{
    config::BranchMode,
    event::TreeEvent,
    properties::{BranchKey, BranchState, ChildType, NodeDescriptor, NodeId, RowId},
    source::FetchRequest,
    TreeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The ticket no longer matches the branch's outstanding fetch (evicted or replaced).
    Superseded,
    /// The parent row was removed while the fetch was in flight.
    ParentGone,
    /// The branch stopped being a placeholder while the fetch was in flight.
    NotPlaceholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Fetched rows were spliced in. `expanded` is false when the branch was collapsed (or its
    /// parent hidden) while the fetch was in flight.
    Merged { inserted: Vec<RowId>, expanded: bool },
    Discarded(DiscardReason),
}

impl TreeEngine {
    pub(super) fn begin_fetch(&mut self, key: BranchKey, parent_row: RowId) -> FetchTicket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(
            key.clone(),
            PendingFetch {
                ticket,
                parent_row,
                expand_on_arrival: true,
            },
        );
        self.events.emit(TreeEvent::Loading(key.clone()));
        tracing::debug!("[{}] fetching {key} (ticket {ticket})", self.tree_id());
        FetchTicket {
            ticket,
            request: FetchRequest::new(&key, &self.config),
            branch: key,
            parent_row,
        }
    }

    /// Resume a fetch. The branch is re-validated first: a ticket that was superseded, a parent
    /// that was evicted, or a branch that is no longer a placeholder discards the result. On
    /// success the placeholder is replaced by the fetched rows, inserted hidden directly below the
    /// parent, and the branch is shown unless it was collapsed in the meantime. On failure the
    /// placeholder stays and the error is returned.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<NodeDescriptor>, TreeError>,
    ) -> Result<MergeOutcome, TreeError> {
        let key = ticket.branch;
        let pending = match self.pending.get(&key) {
            Some(pending) if pending.ticket == ticket.ticket => *pending,
            _ => {
                if let Err(e) = &result {
                    tracing::warn!("[{}] dropping failure for stale {key}: {e}", self.tree_id());
                } else {
                    tracing::debug!("[{}] dropping stale fetch for {key}", self.tree_id());
                }
                return Ok(MergeOutcome::Discarded(DiscardReason::Superseded));
            }
        };
        self.pending.remove(&key);

        let Some(parent) = self
            .index
            .get(pending.parent_row)
            .filter(|parent| parent.id.as_deref() == Some(key.node.as_str()))
        else {
            tracing::warn!("[{}] parent of {key} is gone; dropping fetch", self.tree_id());
            return Ok(MergeOutcome::Discarded(DiscardReason::ParentGone));
        };
        self.events.emit(TreeEvent::LoadingCleared(key.clone()));

        let descriptors = match result {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::warn!("[{}] fetch for {key} failed: {e}", self.tree_id());
                self.fail_branch(&key, &e);
                return Err(e);
            }
        };
        let filter = self.filter(&key);
        if self.index.branch_state(parent, filter) != BranchState::Placeholder {
            tracing::debug!("[{}] {key} is no longer a placeholder", self.tree_id());
            return Ok(MergeOutcome::Discarded(DiscardReason::NotPlaceholder));
        }
        let parent_visible = parent.visible;
        let (placeholders, _) = self.index.branch_rows(parent, filter);

        let descriptors = match self.validate_batch(&key, descriptors) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::warn!("[{}] {e}", self.tree_id());
                self.fail_branch(&key, &e);
                return Err(e);
            }
        };

        self.index.remove(&placeholders);
        self.events.emit(TreeEvent::RowsRemoved(placeholders));
        self.index
            .register_type(key.node.clone(), key.child_type.clone());

        let anchor = self.index.anchor_after(pending.parent_row);
        let inserted = self.index.insert_after(Some(anchor), descriptors, false);
        let rows: Vec<(RowId, NodeDescriptor)> = inserted
            .iter()
            .filter_map(|row| self.index.get(*row).map(|node| (*row, node.descriptor())))
            .collect();
        self.events.emit(TreeEvent::RowsInserted {
            after: anchor,
            rows,
        });

        // New rows start collapsed; their controls reflect the child sets that arrived with them.
        let new_ids: Vec<NodeId> = inserted
            .iter()
            .filter_map(|row| self.index.get(*row))
            .filter(|node| !self.index.is_follower(node))
            .filter_map(|node| node.id.clone())
            .collect();
        for id in new_ids.iter() {
            self.emit_affordances_of(id);
        }

        // An empty answer leaves nothing to show, so the branch stays collapsed with no control.
        let has_rows = self
            .index
            .get(pending.parent_row)
            .map(|parent| self.index.has_children(parent, self.filter(&key)))
            .unwrap_or(false);
        let expanded = pending.expand_on_arrival && parent_visible && has_rows;
        if expanded {
            self.show_branch(&key);
        } else {
            self.emit_affordance(&key);
        }
        tracing::debug!(
            "[{}] materialized {key} with {} row(s)",
            self.tree_id(),
            inserted.len()
        );
        self.audit();
        Ok(MergeOutcome::Merged { inserted, expanded })
    }

    /// Give up on a fetch whose answer will never be handed back. The branch stays a placeholder
    /// and can be expanded again. Stale tickets are ignored.
    pub fn abandon_fetch(&mut self, ticket: &FetchTicket) -> bool {
        let key = &ticket.branch;
        if !matches!(self.pending.get(key), Some(pending) if pending.ticket == ticket.ticket) {
            return false;
        }
        self.pending.remove(key);
        self.events.emit(TreeEvent::LoadingCleared(key.clone()));
        if self.index.row_of(&key.node).is_some() {
            self.emit_affordance(key);
        }
        tracing::debug!("[{}] abandoned fetch for {key}", self.tree_id());
        true
    }

    fn fail_branch(&self, key: &BranchKey, e: &TreeError) {
        self.events
            .emit(TreeEvent::FetchFailed(key.clone(), e.to_string()));
        self.emit_affordance(key);
    }

    /// Fill in defaults for fetched rows and reject responses that would corrupt the tree. Rows
    /// come back ordered so that every row follows its in-batch parent (or group lead).
    fn validate_batch(
        &self,
        key: &BranchKey,
        descriptors: Vec<NodeDescriptor>,
    ) -> Result<Vec<NodeDescriptor>, TreeError> {
        let malformed = |message: String| TreeError::MalformedResponse {
            branch: key.to_string(),
            message,
        };
        let descriptors: Vec<NodeDescriptor> = descriptors
            .into_iter()
            .map(NodeDescriptor::normalized)
            .collect();

        let mut batch_ids = BTreeSet::new();
        for id in descriptors.iter().filter_map(|desc| desc.id.as_ref()) {
            if self.index.row_of(id).is_some() {
                return Err(malformed(format!("node '{id}' already exists")));
            }
            if !batch_ids.insert(id.clone()) {
                return Err(malformed(format!("node '{id}' appears twice")));
            }
        }

        let mut seen = BTreeSet::new();
        let mut nested: BTreeMap<(NodeId, ChildType), (usize, usize)> = BTreeMap::new();
        let mut placed = BatchOrder::default();
        for mut desc in descriptors {
            let follows_lead = self.config.parent_grouping
                && desc.group.as_ref().map(|g| seen.contains(g)).unwrap_or(false);
            if let Some(id) = &desc.id {
                seen.insert(id.clone());
            }
            if follows_lead {
                let lead = desc.group.clone();
                placed.push(desc, lead);
                continue;
            }
            // Fetched rows can only join groups led from within the same response.
            if self.config.parent_grouping {
                desc.group = None;
            }

            let parent = desc
                .parent_id
                .get_or_insert_with(|| key.node.clone())
                .clone();
            if parent == key.node {
                if self.mode != BranchMode::Single {
                    if desc.child_type.is_none() {
                        desc.child_type = key.child_type.clone();
                    } else if desc.child_type != key.child_type {
                        return Err(malformed(format!(
                            "row {} belongs to branch-type '{}'",
                            desc.id.as_deref().unwrap_or("<anonymous>"),
                            desc.child_type.as_deref().unwrap_or_default()
                        )));
                    }
                }
                if desc.placeholder {
                    return Err(malformed(
                        "response contains a placeholder for the branch itself".to_string(),
                    ));
                }
                placed.push(desc, None);
            } else if batch_ids.contains(&parent) {
                let branch_type = if self.mode == BranchMode::Single {
                    None
                } else {
                    desc.child_type.clone()
                };
                let counts = nested.entry((parent.clone(), branch_type)).or_default();
                if desc.placeholder {
                    counts.0 += 1;
                } else {
                    counts.1 += 1;
                }
                placed.push(desc, Some(parent));
            } else {
                return Err(malformed(format!(
                    "row {} names parent '{parent}' outside the response",
                    desc.id.as_deref().unwrap_or("<anonymous>")
                )));
            }
        }

        for ((parent, child_type), (placeholders, real)) in nested {
            if placeholders > 1 || (placeholders > 0 && real > 0) {
                return Err(malformed(format!(
                    "nested branch {} mixes placeholders and rows",
                    BranchKey::new(parent, child_type)
                )));
            }
        }

        // Rows still waiting sit on a parent cycle and never reach the requested node.
        let (rows, unreached) = placed.finish();
        if !unreached.is_empty() {
            return Err(malformed(format!(
                "rows under {} never connect to '{}'",
                unreached
                    .iter()
                    .map(|id| format!("'{id}'"))
                    .collect::<Vec<_>>()
                    .join(", "),
                key.node
            )));
        }
        Ok(rows)
    }
}

/// Parent-first ordering of a fetched batch. A row whose in-batch parent has not been placed yet
/// waits for it.
#[derive(Default)]
struct BatchOrder {
    rows: Vec<NodeDescriptor>,
    placed: BTreeSet<NodeId>,
    waiting: BTreeMap<NodeId, Vec<NodeDescriptor>>,
}

impl BatchOrder {
    fn push(&mut self, desc: NodeDescriptor, after: Option<NodeId>) {
        match after {
            Some(after) if !self.placed.contains(&after) => {
                self.waiting.entry(after).or_default().push(desc)
            }
            _ => self.place(desc),
        }
    }

    fn place(&mut self, desc: NodeDescriptor) {
        let mut stack = vec![desc];
        while let Some(desc) = stack.pop() {
            if let Some(id) = &desc.id {
                self.placed.insert(id.clone());
                if let Some(mut next) = self.waiting.remove(id) {
                    next.reverse();
                    stack.extend(next);
                }
            }
            self.rows.push(desc);
        }
    }

    fn finish(self) -> (Vec<NodeDescriptor>, Vec<NodeId>) {
        (self.rows, self.waiting.into_keys().collect())
    }
}
