//! Tree module: the lazy expansion engine behind one table of rows.
//!
//! # Module Organization
//!
//! - [`index`]: Flat row storage and relationship lookups (`TreeIndex`)
//! - [`traverse`]: Subtree walks (`BranchWalk`)
//! - [`state`]: The expansion state machine (`TreeEngine`)
//! - `materialize`: Merging fetched rows into a placeholder branch
//! - `replace`: Returning materialized branches to placeholders
//!
//! The engine is synchronous. Fetching is split in two: [`TreeEngine::request_expand`] hands back a
//! [`FetchTicket`] for placeholder branches and [`TreeEngine::complete_fetch`] merges the answer.
//! [`crate::lazytree::LazyTree`] drives both halves against a [`crate::source::DataSource`].

pub mod index;
mod materialize;
mod replace;
pub mod state;
pub mod traverse;


pub use index::{ChildFilter, TreeIndex};
pub use materialize::{DiscardReason, MergeOutcome};
pub use state::{ExpandStep, FetchTicket, IgnoreReason, TreeEngine};
pub use traverse::BranchWalk;
