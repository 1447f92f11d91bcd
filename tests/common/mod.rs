//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

use lazytree::{
    properties::NodeDescriptor,
    source::{DataSource, FetchRequest, StaticSource},
    TreeError,
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A [`StaticSource`] whose answers are held back until the test releases them, so tests can act
/// on the tree while fetches are in flight.
#[allow(dead_code)]
pub struct GatedSource {
    pub inner: StaticSource,
    gate: Semaphore,
    started: AtomicUsize,
    on_start: Notify,
}

#[allow(dead_code)]
impl GatedSource {
    pub fn new(inner: StaticSource) -> Self {
        GatedSource {
            inner,
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            on_start: Notify::new(),
        }
    }

    /// Let `n` held fetches answer.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` fetches have been issued.
    pub async fn wait_for_fetches(&self, n: usize) {
        loop {
            let notified = self.on_start.notified();
            if self.started() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl DataSource for GatedSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<NodeDescriptor>, TreeError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.on_start.notify_waiters();
        self.gate
            .acquire()
            .await
            .map_err(|e| TreeError::fetch(&request.parent_node, e))?
            .forget();
        self.inner.fetch(request).await
    }
}

/// `R` with placeholder branches for `comments` and `attachments` (both carrying `prefix`), and a
/// childless root `S`.
#[allow(dead_code)]
pub fn typed_rows(prefix: &str) -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new("R"),
        NodeDescriptor::placeholder_for("R", Some(format!("{prefix}comments"))),
        NodeDescriptor::placeholder_for("R", Some(format!("{prefix}attachments"))),
        NodeDescriptor::new("S"),
    ]
}

/// Branch contents for [`typed_rows`], keyed by the unprefixed child-types sent on the wire.
#[allow(dead_code)]
pub fn typed_source(prefix: &str) -> StaticSource {
    StaticSource::new()
        .with_fragment(
            "R",
            Some("comments"),
            vec![
                NodeDescriptor::new("C1").with_child_type(format!("{prefix}comments")),
                NodeDescriptor::new("C2").with_child_type(format!("{prefix}comments")),
                NodeDescriptor::placeholder_for("C1", None),
            ],
        )
        .with_fragment(
            "R",
            Some("attachments"),
            vec![NodeDescriptor::new("A1").with_child_type(format!("{prefix}attachments"))],
        )
        .with_fragment(
            "C1",
            None,
            vec![NodeDescriptor::new("C1r").with_parent("C1")],
        )
}
