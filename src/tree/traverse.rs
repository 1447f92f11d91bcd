//! Depth-first, pre-order walks over a subtree.

use std::collections::BTreeSet;

use super::index::TreeIndex;
use crate::properties::{RowId, TreeNode};

/// Pre-order walk over every descendant of a row (all child-types), using an explicit stack so
/// deep trees cannot exhaust the call stack. A parent is yielded before its children; grouped
/// follower rows are yielded right after their lead. Rows are yielded at most once, so malformed
/// cyclic parent links terminate.
pub struct BranchWalk<'a> {
    index: &'a TreeIndex,
    stack: Vec<RowId>,
    visited: BTreeSet<RowId>,
}

impl<'a> BranchWalk<'a> {
    pub(crate) fn new(index: &'a TreeIndex, root: RowId, include_self: bool) -> Self {
        let mut walk = BranchWalk {
            index,
            stack: Vec::new(),
            visited: BTreeSet::new(),
        };
        if include_self {
            walk.stack.push(root);
        } else if let Some(node) = index.get(root) {
            walk.visited.insert(root);
            walk.push_children(node);
        }
        walk
    }

    fn push_children(&mut self, node: &TreeNode) {
        self.stack
            .extend(self.index.child_rows(node).iter().rev().copied());
    }
}

impl Iterator for BranchWalk<'_> {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        while let Some(row) = self.stack.pop() {
            if !self.visited.insert(row) {
                continue;
            }
            let Some(node) = self.index.get(row) else {
                continue;
            };
            self.push_children(node);
            // Followers sit on top of the stack so they come out before the children.
            self.stack
                .extend(self.index.followers(node).iter().rev().copied());
            return Some(row);
        }
        None
    }
}

impl TreeIndex {
    pub fn walk_branch(&self, root: RowId, include_self: bool) -> BranchWalk<'_> {
        BranchWalk::new(self, root, include_self)
    }

    /// Apply `f` to every row of the subtree below `root` (and to `root` when `include_self`),
    /// parents before children. Returns the visited rows in visit order.
    pub fn apply_to_branch<F>(&mut self, root: RowId, mut f: F, include_self: bool) -> Vec<RowId>
    where
        F: FnMut(&mut TreeNode),
    {
        let rows: Vec<RowId> = self.walk_branch(root, include_self).collect();
        for row in rows.iter() {
            if let Some(node) = self.get_mut(*row) {
                f(node);
            }
        }
        rows
    }
}
