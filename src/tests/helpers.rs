//! Shared test utilities for engine tests

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::{
    config::{BranchMode, TreeConfig},
    event::{Event, TreeEvent},
    properties::{Affordance, NodeDescriptor},
    tree::TreeEngine,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn typed_config(mode: BranchMode) -> TreeConfig {
    TreeConfig::default().with_branch_mode(mode)
}

/// Build an engine and the receiving end of its render events.
pub fn engine_with_events(
    config: TreeConfig,
    rows: Vec<NodeDescriptor>,
) -> (TreeEngine, UnboundedReceiver<Event>) {
    init_logging();
    let (tx, rx) = unbounded_channel();
    (TreeEngine::new(config, rows, Some(tx)), rx)
}

/// Everything emitted since the last drain.
pub fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<TreeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.change);
    }
    events
}

/// Last affordance emitted for `(node, child_type)`.
pub fn last_affordance(
    events: &[TreeEvent],
    node: &str,
    child_type: Option<&str>,
) -> Option<Affordance> {
    events.iter().rev().find_map(|event| match event {
        TreeEvent::Affordance {
            node: n,
            child_type: ct,
            affordance,
        } if n == node && ct.as_deref() == child_type => Some(*affordance),
        _ => None,
    })
}

/// `R` with a `comments` placeholder branch and an `attachments` placeholder branch, plus a
/// childless sibling root `S`.
pub fn two_branch_rows() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new("R"),
        NodeDescriptor::placeholder_for("R", Some("comments".to_string())),
        NodeDescriptor::placeholder_for("R", Some("attachments".to_string())),
        NodeDescriptor::new("S"),
    ]
}

/// Three levels, fully materialized: `R -> A -> A1`, `R -> B`, plus a placeholder under `B`.
pub fn nested_rows() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new("R"),
        NodeDescriptor::new("A").with_parent("R"),
        NodeDescriptor::new("A1").with_parent("A"),
        NodeDescriptor::new("B").with_parent("R"),
        NodeDescriptor::placeholder_for("B", None),
    ]
}

pub fn comment(id: &str) -> NodeDescriptor {
    NodeDescriptor::new(id)
        .with_parent("R")
        .with_child_type("comments")
}
