//! # lazytree
//!
//! A lazy tree expansion engine for tree-tables: trees rendered as a flat list of rows, where each
//! row names its parent (and optionally a child-type) as attributes, and where subtrees are fetched
//! from a remote source the first time they are opened.
//!
//! ## Overview
//!
//! The renderer hands the engine its current flat rows. The engine rebuilds the hierarchy as a
//! parent -> children index, decides which rows are visible, which expand/collapse controls each
//! branch offers, and when a branch must be fetched. Every decision is reported as a
//! [`event::TreeEvent`] over an unbounded channel; the renderer applies them.
//!
//! ### Key Features
//!
//! - **Placeholder branches**: a single placeholder row stands in for children that have not been
//!   fetched yet. Expanding it fetches and splices the real rows in below the parent
//! - **Typed branches**: one node can carry several independent child-type branches, optionally
//!   with only one materialized at a time
//! - **Safe resumption**: fetches never hold the engine; when a fetch resolves the branch is
//!   re-validated, and stale answers are discarded rather than merged
//! - **Cycle-safe traversal**: subtree walks and ancestry checks terminate on malformed parent links
//!
//! ## Architecture
//!
//! - **[`tree`]**: The engine (`TreeIndex`, `TreeEngine`, subtree walks)
//! - **[`lazytree`]**: `LazyTree`, the engine wired to a [`source::DataSource`]
//! - **[`source`]**: Data and parameter collaborators, fetch requests
//! - **[`properties`]**: Node, branch and affordance types
//! - **[`event`]**: Render events
//! - **[`config`]**: Immutable engine configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lazytree::{
//!     config::{BranchMode, TreeConfig},
//!     lazytree::LazyTree,
//!     properties::NodeDescriptor,
//!     source::StaticSource,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rows = vec![
//!         NodeDescriptor::new("R"),
//!         NodeDescriptor::placeholder_for("R", Some("comments".to_string())),
//!     ];
//!     let source = StaticSource::new().with_fragment(
//!         "R",
//!         Some("comments"),
//!         vec![NodeDescriptor::new("C1").with_child_type("comments")],
//!     );
//!     let config = TreeConfig::default().with_branch_mode(BranchMode::Multiple);
//!     let tree = LazyTree::simple(config, rows, source);
//!
//!     tree.expand("R", Some("comments".to_string())).await?;
//!     assert_eq!(tree.visible_ids(), vec!["R", "C1"]);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod lazytree;
pub mod properties;
pub mod source;
#[cfg(test)]
mod tests;
pub mod tree;

pub use error::*;
