//! Flat row storage plus the parent -> children adjacency index, and the relationship lookups
//! built on it.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    properties::{BranchState, ChildType, NodeDescriptor, NodeId, RowId, TreeNode},
    TreeError,
};

/// Restricts a child lookup to one branch-type. `Only(None)` is the default (untyped) branch,
/// which is not the same as `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFilter<'a> {
    All,
    Only(Option<&'a str>),
}

impl<'a> ChildFilter<'a> {
    pub fn of(child_type: &'a ChildType) -> Self {
        ChildFilter::Only(child_type.as_deref())
    }

    pub fn matches(&self, node: &TreeNode) -> bool {
        match self {
            ChildFilter::All => true,
            ChildFilter::Only(child_type) => node.child_type.as_deref() == *child_type,
        }
    }
}

/// The ordered collection of rows belonging to one tree instance.
///
/// Invariants maintained on every insert/remove:
/// - `order` holds every key of `rows` exactly once.
/// - `children[p]` lists, in row order, every non-follower row whose `parent_id` is `p`.
/// - `by_id` maps each declared id to the first row that declared it.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    rows: BTreeMap<RowId, TreeNode>,
    order: Vec<RowId>,
    by_id: BTreeMap<NodeId, RowId>,
    children: BTreeMap<NodeId, Vec<RowId>>,
    followers: BTreeMap<NodeId, Vec<RowId>>,
    known_types: BTreeMap<NodeId, Vec<ChildType>>,
    next_row: u64,
    grouping: bool,
}

impl TreeIndex {
    pub fn new(grouping: bool) -> Self {
        TreeIndex {
            grouping,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.order.iter().filter_map(|row| self.rows.get(row))
    }

    pub fn get(&self, row: RowId) -> Option<&TreeNode> {
        self.rows.get(&row)
    }

    pub(crate) fn get_mut(&mut self, row: RowId) -> Option<&mut TreeNode> {
        self.rows.get_mut(&row)
    }

    pub fn row_of(&self, id: &str) -> Option<RowId> {
        self.by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&TreeNode> {
        self.row_of(id).and_then(|row| self.rows.get(&row))
    }

    pub fn position(&self, row: RowId) -> Option<usize> {
        self.order.iter().position(|r| *r == row)
    }

    /// Rows that belong to `lead`'s group, in row order. Always empty without grouping.
    pub fn followers(&self, lead: &TreeNode) -> &[RowId] {
        lead.id
            .as_ref()
            .and_then(|id| self.followers.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn is_follower(&self, node: &TreeNode) -> bool {
        self.grouping
            && node
                .group
                .as_ref()
                .and_then(|lead| self.followers.get(lead))
                .map(|rows| rows.contains(&node.row))
                .unwrap_or(false)
    }

    /// The row new rows should be placed after so they land directly below `row`'s group.
    pub fn anchor_after(&self, row: RowId) -> RowId {
        self.rows
            .get(&row)
            .and_then(|node| self.followers(node).last().copied())
            .unwrap_or(row)
    }

    /// Insert rows directly after `after` (or at the end when `after` is `None`), preserving the
    /// order of `descriptors`. Returns the new row ids in the same order.
    pub(crate) fn insert_after(
        &mut self,
        after: Option<RowId>,
        descriptors: Vec<NodeDescriptor>,
        visible: bool,
    ) -> Vec<RowId> {
        let mut at = match after.and_then(|row| self.position(row)) {
            Some(pos) => pos + 1,
            None => self.order.len(),
        };
        let mut inserted = Vec::with_capacity(descriptors.len());
        let mut touched_parents = BTreeSet::new();

        for desc in descriptors {
            let row = RowId(self.next_row);
            self.next_row += 1;
            let mut node = TreeNode::from_descriptor(row, desc);
            node.visible = visible;

            if let Some(id) = &node.id {
                if self.by_id.contains_key(id) {
                    tracing::warn!("Duplicate node id '{id}' at {row}; lookups keep the first");
                } else {
                    self.by_id.insert(id.clone(), row);
                }
            }

            let lead = node
                .group
                .as_ref()
                .filter(|lead| {
                    self.grouping && node.id.as_ref() != Some(*lead) && self.by_id.contains_key(*lead)
                })
                .cloned();
            if let Some(lead) = lead {
                self.followers.entry(lead).or_default().push(row);
            } else if let Some(parent) = &node.parent_id {
                self.children.entry(parent.clone()).or_default().push(row);
                self.register_type(parent.clone(), node.child_type.clone());
                touched_parents.insert(parent.clone());
            }

            self.order.insert(at, row);
            at += 1;
            self.rows.insert(row, node);
            inserted.push(row);
        }

        if !touched_parents.is_empty() {
            let positions: BTreeMap<RowId, usize> = self
                .order
                .iter()
                .enumerate()
                .map(|(pos, row)| (*row, pos))
                .collect();
            for parent in touched_parents {
                if let Some(rows) = self.children.get_mut(&parent) {
                    rows.sort_by_key(|row| positions.get(row).copied().unwrap_or(usize::MAX));
                }
            }
        }
        inserted
    }

    /// Remove rows from storage and from every index. Removing a row that declared an id also
    /// forgets the child-types known under that id.
    pub(crate) fn remove(&mut self, rows: &[RowId]) -> Vec<TreeNode> {
        let doomed: BTreeSet<RowId> = rows.iter().copied().collect();
        self.order.retain(|row| !doomed.contains(row));
        let mut removed = Vec::with_capacity(doomed.len());
        for row in doomed.iter() {
            let Some(node) = self.rows.remove(row) else {
                continue;
            };
            if let Some(id) = &node.id {
                if self.by_id.get(id) == Some(row) {
                    self.by_id.remove(id);
                    self.known_types.remove(id);
                    self.followers.remove(id);
                }
            }
            if let Some(parent) = &node.parent_id {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.retain(|r| r != row);
                    if siblings.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
            if let Some(lead) = &node.group {
                if let Some(group) = self.followers.get_mut(lead) {
                    group.retain(|r| r != row);
                }
            }
            removed.push(node);
        }
        removed
    }

    /// Record that `parent` has (or had) a branch of `child_type`.
    pub(crate) fn register_type(&mut self, parent: NodeId, child_type: ChildType) {
        let types = self.known_types.entry(parent).or_default();
        if !types.contains(&child_type) {
            types.push(child_type);
        }
    }

    /// The node `node.parent_id` names, if it exists in this tree.
    pub fn get_parent(&self, node: &TreeNode) -> Option<&TreeNode> {
        node.parent_id.as_deref().and_then(|parent| self.node(parent))
    }

    /// Direct children of `node` in row order. A node without an id has none.
    pub fn get_children(&self, node: &TreeNode, filter: ChildFilter<'_>) -> Vec<&TreeNode> {
        self.child_rows(node)
            .iter()
            .filter_map(|row| self.rows.get(row))
            .filter(|child| filter.matches(child))
            .collect()
    }

    pub(crate) fn child_rows(&self, node: &TreeNode) -> &[RowId] {
        node.id
            .as_ref()
            .and_then(|id| self.children.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_child(&self, node: &TreeNode) -> bool {
        node.is_child()
    }

    pub fn has_children(&self, node: &TreeNode, filter: ChildFilter<'_>) -> bool {
        self.child_rows(node)
            .iter()
            .filter_map(|row| self.rows.get(row))
            .any(|child| filter.matches(child))
    }

    /// Walks the parent chain looking for `ancestor_id`. A chain that revisits a node yields
    /// [`TreeError::CycleDetected`].
    pub fn try_has_ancestor(&self, node: &TreeNode, ancestor_id: &str) -> Result<bool, TreeError> {
        let mut visited = BTreeSet::new();
        visited.insert(node.row);
        let mut current = node;
        while let Some(parent) = self.get_parent(current) {
            if parent.id.as_deref() == Some(ancestor_id) {
                return Ok(true);
            }
            if !visited.insert(parent.row) {
                return Err(TreeError::CycleDetected {
                    node: node.label(),
                    revisited: parent.label(),
                });
            }
            current = parent;
        }
        Ok(false)
    }

    /// [`TreeIndex::try_has_ancestor`] with cycles reported as "no such ancestor".
    pub fn has_ancestor(&self, node: &TreeNode, ancestor_id: &str) -> bool {
        match self.try_has_ancestor(node, ancestor_id) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("{e}");
                false
            }
        }
    }

    /// Child-types present under (or previously materialized for) `node`, first-seen order.
    pub fn child_types(&self, node: &TreeNode) -> Vec<ChildType> {
        node.id
            .as_ref()
            .and_then(|id| self.known_types.get(id))
            .cloned()
            .unwrap_or_default()
    }

    /// Placeholder rows and real rows of one branch.
    pub(crate) fn branch_rows(
        &self,
        node: &TreeNode,
        filter: ChildFilter<'_>,
    ) -> (Vec<RowId>, Vec<RowId>) {
        let mut placeholders = Vec::new();
        let mut real = Vec::new();
        for child in self.get_children(node, filter) {
            if child.placeholder {
                placeholders.push(child.row);
            } else {
                real.push(child.row);
            }
        }
        (placeholders, real)
    }

    pub fn branch_state(&self, node: &TreeNode, filter: ChildFilter<'_>) -> BranchState {
        let (placeholders, real) = self.branch_rows(node, filter);
        if !placeholders.is_empty() {
            return BranchState::Placeholder;
        }
        if !real.is_empty() {
            return BranchState::Materialized {
                children: real.len(),
            };
        }
        let known = self.child_types(node);
        let is_known = match filter {
            ChildFilter::All => !known.is_empty(),
            ChildFilter::Only(child_type) => known.iter().any(|ct| ct.as_deref() == child_type),
        };
        if is_known {
            BranchState::Materialized { children: 0 }
        } else {
            BranchState::Empty
        }
    }

    /// Every branch that holds a placeholder together with real children, or more than one
    /// placeholder. With `per_type` unset all children of a node count as one branch.
    pub fn check_invariants(&self, per_type: bool) -> Vec<String> {
        let mut violations = Vec::new();
        for (parent, rows) in self.children.iter() {
            let mut branches: BTreeMap<ChildType, (usize, usize)> = BTreeMap::new();
            for child in rows.iter().filter_map(|row| self.rows.get(row)) {
                let key = if per_type {
                    child.child_type.clone()
                } else {
                    None
                };
                let counts = branches.entry(key).or_default();
                if child.placeholder {
                    counts.0 += 1;
                } else {
                    counts.1 += 1;
                }
            }
            for (child_type, (placeholders, real)) in branches {
                if placeholders > 1 || (placeholders > 0 && real > 0) {
                    violations.push(format!(
                        "branch {parent}/{} holds {placeholders} placeholder(s) and {real} real row(s)",
                        child_type.as_deref().unwrap_or("*")
                    ));
                }
            }
        }
        violations
    }

    /// Drop placeholders that share a branch with real children or with an earlier placeholder.
    /// Returns the dropped rows.
    pub(crate) fn normalize_placeholders(&mut self, per_type: bool) -> Vec<RowId> {
        let mut stray = Vec::new();
        for rows in self.children.values() {
            let mut branches: BTreeMap<ChildType, (Vec<RowId>, bool)> = BTreeMap::new();
            for child in rows.iter().filter_map(|row| self.rows.get(row)) {
                let key = if per_type {
                    child.child_type.clone()
                } else {
                    None
                };
                let entry = branches.entry(key).or_default();
                if child.placeholder {
                    entry.0.push(child.row);
                } else {
                    entry.1 = true;
                }
            }
            for (_, (placeholders, has_real)) in branches {
                let keep = if has_real { 0 } else { 1 };
                stray.extend(placeholders.into_iter().skip(keep));
            }
        }
        if !stray.is_empty() {
            tracing::warn!(
                "Dropping {} stray placeholder row(s) that conflict with their branch",
                stray.len()
            );
            self.remove(&stray);
        }
        stray
    }
}
