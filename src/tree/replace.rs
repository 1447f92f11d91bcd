//! Eviction: returning a materialized branch to a single placeholder so its next expansion fetches
//! again.

use std::collections::BTreeSet;

use super::state::TreeEngine;
use crate::{
    event::TreeEvent,
    properties::{BranchKey, BranchState, ChildType, NodeDescriptor, NodeId, RowId},
    TreeError,
};

impl TreeEngine {
    /// Discard the rows of a materialized branch (and everything below them) and put a fresh
    /// placeholder in their place. Returns the removed rows; a branch that is not materialized is
    /// left alone.
    pub fn evict(&mut self, node: &str, child_type: ChildType) -> Result<Vec<RowId>, TreeError> {
        let key = self.branch_key(node, child_type);
        let parent_row = self
            .index
            .row_of(&key.node)
            .ok_or_else(|| TreeError::NotFound(key.node.clone()))?;
        Ok(self.evict_branch(&key, parent_row).unwrap_or_default())
    }

    pub(super) fn evict_branch(&mut self, key: &BranchKey, parent_row: RowId) -> Option<Vec<RowId>> {
        let parent = self.index.get(parent_row)?;
        let filter = self.filter(key);
        if !matches!(
            self.index.branch_state(parent, filter),
            BranchState::Materialized { .. }
        ) {
            return None;
        }
        let (_, real) = self.index.branch_rows(parent, filter);
        let doomed: Vec<RowId> = real
            .iter()
            .flat_map(|row| self.index.walk_branch(*row, true))
            .filter(|row| *row != parent_row)
            .collect();

        let ids: BTreeSet<NodeId> = doomed
            .iter()
            .filter_map(|row| self.index.get(*row))
            .filter_map(|node| node.id.clone())
            .collect();
        self.expanded.retain(|branch| !ids.contains(&branch.node));
        // Fetches below the evicted rows resolve as superseded.
        self.pending.retain(|branch, _| !ids.contains(&branch.node));

        self.index.remove(&doomed);
        self.events.emit(TreeEvent::RowsRemoved(doomed.clone()));

        let anchor = self.index.anchor_after(parent_row);
        let placeholder = NodeDescriptor::placeholder_for(key.node.clone(), key.child_type.clone());
        let inserted = self
            .index
            .insert_after(Some(anchor), vec![placeholder.clone()], false);
        self.events.emit(TreeEvent::RowsInserted {
            after: anchor,
            rows: inserted.into_iter().map(|row| (row, placeholder.clone())).collect(),
        });

        self.expanded.remove(key);
        self.emit_affordance(key);
        tracing::debug!(
            "[{}] evicted {key} ({} row(s))",
            self.tree_id(),
            doomed.len()
        );
        self.audit();
        Some(doomed)
    }

    /// Cancel and evict every branch-type of the node other than `key`'s.
    pub(super) fn evict_other_types(&mut self, key: &BranchKey, parent_row: RowId) {
        let Some(parent) = self.index.get(parent_row) else {
            return;
        };
        let others: Vec<BranchKey> = self
            .index
            .child_types(parent)
            .into_iter()
            .filter(|child_type| *child_type != key.child_type)
            .map(|child_type| BranchKey::new(key.node.clone(), child_type))
            .collect();

        for other in others {
            if self.pending.remove(&other).is_some() {
                tracing::debug!("[{}] cancelled fetch for {other}", self.tree_id());
                self.events.emit(TreeEvent::LoadingCleared(other.clone()));
            }
            if self.evict_branch(&other, parent_row).is_none() {
                self.expanded.remove(&other);
                self.emit_affordance(&other);
            }
        }
    }
}
