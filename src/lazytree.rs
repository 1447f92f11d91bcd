//! [`LazyTree`]: a [`TreeEngine`] wired to its data and parameter sources.
//!
//! The engine is shared behind a lock so several user actions can be in flight at once. The lock
//! is never held across a fetch: each expand takes it once to request the branch and once more to
//! merge the answer, and the engine re-validates the branch in between.

use parking_lot::{ArcRwLockReadGuard, RawRwLock, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    config::TreeConfig,
    event::{Event, TreeId},
    properties::{Affordance, BranchState, ChildType, NodeDescriptor, NodeId, RowId},
    source::{DataSource, NoParams, ParamSource},
    tree::{ExpandStep, FetchTicket, IgnoreReason, MergeOutcome, TreeEngine},
    TreeError,
};

/// Result of an expand request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Already materialized; shown without a fetch.
    Shown,
    /// Fetched and merged, or discarded because the branch changed while the fetch was in flight.
    Fetched(MergeOutcome),
    Ignored(IgnoreReason),
}

/// Result of activating a control element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Expanded(Expansion),
    /// Whether the branch had been expanded.
    Collapsed(bool),
}

/// RAII guard over an outstanding fetch: abandons it on drop unless disarmed once the answer is
/// in hand.
struct InFlight<'a> {
    engine: &'a RwLock<TreeEngine>,
    ticket: Option<FetchTicket>,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.ticket = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.engine.write().abandon_fetch(&ticket);
        }
    }
}

pub struct LazyTree<S, P = NoParams> {
    config: Arc<TreeConfig>,
    engine: Arc<RwLock<TreeEngine>>,
    source: Arc<S>,
    params: Arc<P>,
}

impl<S, P> Clone for LazyTree<S, P> {
    fn clone(&self) -> Self {
        LazyTree {
            config: self.config.clone(),
            engine: self.engine.clone(),
            source: self.source.clone(),
            params: self.params.clone(),
        }
    }
}

impl<S: DataSource> LazyTree<S, NoParams> {
    pub fn simple(config: TreeConfig, rows: Vec<NodeDescriptor>, source: S) -> Self {
        LazyTree::new(config, rows, source, NoParams, None)
    }
}

impl<S: DataSource, P: ParamSource> LazyTree<S, P> {
    /// Scan `rows` (the renderer's current flat collection) and set up initial visibility and
    /// controls. Render decisions go to `events` when given.
    pub fn new(
        config: TreeConfig,
        rows: Vec<NodeDescriptor>,
        source: S,
        params: P,
        events: Option<UnboundedSender<Event>>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = TreeEngine::new(config.clone(), rows, events);
        LazyTree {
            config,
            engine: Arc::new(RwLock::new(engine)),
            source: Arc::new(source),
            params: Arc::new(params),
        }
    }

    pub fn tree_id(&self) -> TreeId {
        self.engine.read().tree_id()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Read access to the engine. Do not hold the guard across an `.await`.
    pub fn engine(&self) -> ArcRwLockReadGuard<RawRwLock, TreeEngine> {
        self.engine.read_arc()
    }

    /// Expand a branch, fetching it first if it is still a placeholder. Fetch failures are
    /// returned after the branch has been put back to its placeholder state. Dropping the future
    /// mid-fetch (a timeout or an aborted task) abandons the fetch and leaves the branch
    /// expandable.
    pub async fn expand(&self, node: &str, child_type: ChildType) -> Result<Expansion, TreeError> {
        let step = self.engine.write().request_expand(node, child_type)?;
        let ticket = match step {
            ExpandStep::Shown => return Ok(Expansion::Shown),
            ExpandStep::Ignored(reason) => return Ok(Expansion::Ignored(reason)),
            ExpandStep::Fetch(ticket) => ticket,
        };

        let request = ticket
            .request
            .clone()
            .with_params(self.params.as_ref(), &self.config);
        let mut guard = InFlight {
            engine: &self.engine,
            ticket: Some(ticket.clone()),
        };
        let result = self.source.fetch(&request).await;
        guard.disarm();

        let outcome = self.engine.write().complete_fetch(ticket, result)?;
        Ok(Expansion::Fetched(outcome))
    }

    pub fn collapse(&self, node: &str, child_type: ChildType) -> Result<bool, TreeError> {
        self.engine.write().collapse(node, child_type)
    }

    pub fn evict(&self, node: &str, child_type: ChildType) -> Result<Vec<RowId>, TreeError> {
        self.engine.write().evict(node, child_type)
    }

    /// Dispatch a click on a control element, identified by its configured tag.
    pub async fn activate(
        &self,
        control: &str,
        node: &str,
        child_type: ChildType,
    ) -> Result<Activation, TreeError> {
        if control == self.config.expand_control {
            Ok(Activation::Expanded(self.expand(node, child_type).await?))
        } else if control == self.config.collapse_control {
            Ok(Activation::Collapsed(self.collapse(node, child_type)?))
        } else {
            Err(TreeError::UnknownControl(control.to_string()))
        }
    }

    pub fn is_expanded(&self, node: &str, child_type: ChildType) -> bool {
        self.engine.read().is_expanded(node, child_type)
    }

    pub fn is_loading(&self, node: &str, child_type: ChildType) -> bool {
        self.engine.read().is_loading(node, child_type)
    }

    pub fn is_visible(&self, node: &str) -> Option<bool> {
        self.engine.read().node(node).map(|n| n.visible())
    }

    pub fn affordance(&self, node: &str, child_type: ChildType) -> Affordance {
        self.engine.read().affordance(node, child_type)
    }

    pub fn branch_state(&self, node: &str, child_type: ChildType) -> Option<BranchState> {
        self.engine.read().branch_state(node, child_type)
    }

    pub fn visible_ids(&self) -> Vec<NodeId> {
        self.engine.read().visible_ids()
    }

    pub fn check_invariants(&self) -> Vec<String> {
        self.engine.read().check_invariants()
    }
}
