use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::properties::{Affordance, BranchKey, ChildType, NodeDescriptor, NodeId, RowId};

/// Identifies one tree instance (one rendering surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub Uuid);

impl TreeId {
    pub fn new() -> Self {
        TreeId(Uuid::new_v4())
    }
}

impl Default for TreeId {
    fn default() -> Self {
        TreeId::new()
    }
}

impl Display for TreeId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A render decision for the renderer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEvent {
    Shown(RowId),
    Hidden(RowId),
    /// Controls for the branch `(node, child_type)`
    Affordance {
        node: NodeId,
        child_type: ChildType,
        affordance: Affordance,
    },
    Loading(BranchKey),
    LoadingCleared(BranchKey),
    /// Branch, error message
    FetchFailed(BranchKey, String),
    /// Rows placed directly after `after`, in order. Inserted rows start hidden.
    RowsInserted {
        after: RowId,
        rows: Vec<(RowId, NodeDescriptor)>,
    },
    RowsRemoved(Vec<RowId>),
}

impl TreeEvent {
    /// The row this event shows or hides, if it is a visibility event.
    pub fn visibility(&self) -> Option<(RowId, bool)> {
        match self {
            TreeEvent::Shown(row) => Some((*row, true)),
            TreeEvent::Hidden(row) => Some((*row, false)),
            _ => None,
        }
    }
}

impl Display for TreeEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TreeEvent::Shown(row) => write!(f, "Shown({row})"),
            TreeEvent::Hidden(row) => write!(f, "Hidden({row})"),
            TreeEvent::Affordance {
                node,
                child_type,
                affordance,
            } => write!(
                f,
                "Affordance({}, {affordance:?})",
                BranchKey::new(node.clone(), child_type.clone())
            ),
            TreeEvent::Loading(branch) => write!(f, "Loading({branch})"),
            TreeEvent::LoadingCleared(branch) => write!(f, "LoadingCleared({branch})"),
            TreeEvent::FetchFailed(branch, _) => write!(f, "FetchFailed({branch})"),
            TreeEvent::RowsInserted { after, rows } => {
                write!(f, "RowsInserted({} after {after})", rows.len())
            }
            TreeEvent::RowsRemoved(rows) => write!(f, "RowsRemoved({})", rows.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tree: TreeId,
    pub change: TreeEvent,
}

/// Where a tree sends its render decisions. A tree without a sink still tracks state; the
/// renderer can then poll it instead.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tree: TreeId,
    tx: Option<UnboundedSender<Event>>,
}

impl EventSink {
    pub(crate) fn new(tree: TreeId, tx: Option<UnboundedSender<Event>>) -> Self {
        EventSink { tree, tx }
    }

    pub(crate) fn tree(&self) -> TreeId {
        self.tree
    }

    pub(crate) fn emit(&self, change: TreeEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.send(Event {
                tree: self.tree,
                change,
            }) {
                // Surface gone; state keeps tracking without it.
                tracing::debug!("[{}] dropped render event {}", self.tree, e.0.change);
            }
        }
    }
}
