//! The collaborators a tree fetches through: [`DataSource`] for branch contents and
//! [`ParamSource`] for the extra name/value bag merged into every request.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};
use url::Url;

use crate::{
    config::TreeConfig,
    properties::{BranchKey, ChildType, NodeDescriptor, NodeId},
    TreeError,
};

pub const PARENT_NODE_PARAM: &str = "parent_node";
pub const CHILD_TYPE_PARAM: &str = "child_type";

/// The body of one branch fetch: `{parent_node, child_type, ...extra}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub parent_node: NodeId,
    /// Child-type with any configured prefix removed. Omitted when the branch is untyped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(branch: &BranchKey, config: &TreeConfig) -> Self {
        FetchRequest {
            parent_node: branch.node.clone(),
            child_type: branch
                .child_type
                .as_deref()
                .map(|ct| config.wire_child_type(ct).to_string()),
            extra: BTreeMap::new(),
        }
    }

    /// Merge `params` into the request, skipping deny-listed names. The core keys cannot be
    /// overridden by extra params.
    pub fn with_params<P: ParamSource + ?Sized>(mut self, params: &P, config: &TreeConfig) -> Self {
        for (name, value) in params.params() {
            if config.is_denied(&name) {
                continue;
            }
            if name == PARENT_NODE_PARAM || name == CHILD_TYPE_PARAM {
                tracing::warn!("Extra param '{name}' shadows a fetch request key; ignoring it");
                continue;
            }
            self.extra.insert(name, value);
        }
        self
    }

    /// Request parameters in wire order: core keys first, then extras by name.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(PARENT_NODE_PARAM.to_string(), self.parent_node.clone())];
        if let Some(child_type) = &self.child_type {
            pairs.push((CHILD_TYPE_PARAM.to_string(), child_type.clone()));
        }
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }

    /// The request as a GET against `endpoint`. Existing query parameters on the endpoint are
    /// kept.
    pub fn to_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().extend_pairs(self.pairs());
        url
    }

    /// The request as a GET against the configured `child_fetch_path`, resolved relative to the
    /// page at `base`.
    pub fn endpoint_url(&self, config: &TreeConfig, base: &Url) -> Result<Url, TreeError> {
        Ok(self.to_url(&config.fetch_url(base)?))
    }
}

/// Remote source of branch contents.
///
/// Implementations return the descriptors of the new child rows for the requested branch. Rows
/// may omit `parent_id` (the requested parent is assumed) and may include deeper descendants whose
/// parents are other rows of the same response. HTTP-backed sources build their GET with
/// [`FetchRequest::endpoint_url`] and decode the body with [`decode_fragment`].
pub trait DataSource: Sync {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<NodeDescriptor>, TreeError>> + Send;
}

impl<D: DataSource> DataSource for &D {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<NodeDescriptor>, TreeError> {
        (**self).fetch(request).await
    }
}

/// Adapts a closure returning a future into a [`DataSource`].
pub struct FnSource<F>(pub F);

impl<F, Fut> DataSource for FnSource<F>
where
    F: Fn(FetchRequest) -> Fut + Sync,
    Fut: Future<Output = Result<Vec<NodeDescriptor>, TreeError>> + Send,
{
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Vec<NodeDescriptor>, TreeError>> + Send {
        (self.0)(request.clone())
    }
}

/// Reference in-memory source: branch contents keyed by `(parent_node, child_type)` as they
/// appear on the wire. Suits trees whose data is already loaded, and embedders checking what
/// their tree asks for. Unknown branches fail with [`TreeError::Fetch`]. Every fetch is counted
/// and its request recorded.
#[derive(Debug, Default)]
pub struct StaticSource {
    fragments: RwLock<BTreeMap<(NodeId, ChildType), Vec<NodeDescriptor>>>,
    requests: Mutex<Vec<FetchRequest>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        StaticSource::default()
    }

    pub fn with_fragment<S: Into<String>>(
        self,
        parent: S,
        child_type: Option<&str>,
        rows: Vec<NodeDescriptor>,
    ) -> Self {
        self.set_fragment(parent, child_type, rows);
        self
    }

    pub fn set_fragment<S: Into<String>>(
        &self,
        parent: S,
        child_type: Option<&str>,
        rows: Vec<NodeDescriptor>,
    ) {
        self.fragments
            .write()
            .insert((parent.into(), child_type.map(str::to_string)), rows);
    }

    pub fn remove_fragment(&self, parent: &str, child_type: Option<&str>) {
        self.fragments
            .write()
            .remove(&(parent.to_string(), child_type.map(str::to_string)));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }
}

impl DataSource for StaticSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<NodeDescriptor>, TreeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let key = (request.parent_node.clone(), request.child_type.clone());
        self.fragments.read().get(&key).cloned().ok_or_else(|| {
            TreeError::fetch(
                BranchKey::new(key.0.clone(), key.1.clone()),
                "no such branch",
            )
        })
    }
}

/// Supplier of the extra name/value bag merged into fetch requests.
pub trait ParamSource: Sync {
    fn params(&self) -> Vec<(String, String)>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoParams;

impl ParamSource for NoParams {
    fn params(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// A form-like parameter bag whose values may change between fetches.
#[derive(Debug, Default)]
pub struct FormParams(RwLock<BTreeMap<String, String>>);

impl FormParams {
    pub fn new() -> Self {
        FormParams::default()
    }

    pub fn set<K: Into<String>, V: Into<String>>(&self, name: K, value: V) {
        self.0.write().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.0.write().remove(name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FormParams(RwLock::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

impl ParamSource for FormParams {
    fn params(&self) -> Vec<(String, String)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Decode a JSON response fragment: an array of attribute bags, read with the configured
/// attribute names and placeholder marker. Non-string scalars are stringified; nulls are dropped.
pub fn decode_fragment(json: &str, config: &TreeConfig) -> Result<Vec<NodeDescriptor>, TreeError> {
    let raw: Vec<BTreeMap<String, serde_json::Value>> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|bag| {
            let attrs: BTreeMap<String, String> = bag
                .into_iter()
                .filter_map(|(name, value)| match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some((name, s)),
                    other => Some((name, other.to_string())),
                })
                .collect();
            NodeDescriptor::from_attributes(&attrs, config)
        })
        .collect())
}
