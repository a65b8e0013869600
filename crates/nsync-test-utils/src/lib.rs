//! Testing utilities for nsync workspace
//!
//! Shared fakes and fixtures: an in-memory organization graph implementing
//! [`RemoteGraph`], canned trees, and an engine harness wired to in-memory
//! platform and store.

#![allow(missing_docs)]

use async_trait::async_trait;
use nsync_core::{MemoryPlatform, SyncConfig, SyncEngine, SyncRequest};
use nsync_remote::{Credential, NodeLabel, NodeSummary, RemoteError, RemoteGraph, SearchQuery};
use nsync_store::{MemoryMappingStore, Scope};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct FakeNode {
    summary: NodeSummary,
    label: NodeLabel,
}

#[derive(Debug, Default)]
struct FakeState {
    nodes: BTreeMap<String, FakeNode>,
    /// Child ids per parent, in insertion order
    children: BTreeMap<String, Vec<String>>,
    workspaces: Vec<NodeSummary>,
    self_referencing: HashSet<String>,
    /// Extra child edges returned by circle queries only
    injected: BTreeMap<String, Vec<String>>,
    /// Answer searches with descendants up to `depth - 1` levels down
    descendants: bool,
    unauthorized: bool,
    /// Searches allowed before every call turns unauthorized
    searches_left: Option<usize>,
    fail_mark_synced: bool,
    queries: Vec<SearchQuery>,
    marked: Vec<String>,
    inbox: Vec<NodeSummary>,
}

/// In-memory organization graph
///
/// `search` returns the direct children of the query's context node that
/// carry the requested label, honoring `skip` and `limit`. After
/// [`FakeRemote::return_descendants`] it returns every descendant within
/// `depth - 1` levels instead, nearest level first.
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workspace root
    pub fn workspace(&self, id: &str, title: &str) -> &Self {
        let summary = NodeSummary::new(id, title);
        let mut state = self.state.lock();
        state.workspaces.push(summary.clone());
        state.nodes.insert(
            id.to_string(),
            FakeNode {
                summary,
                label: NodeLabel::Circle,
            },
        );
        drop(state);
        self
    }

    /// Add a circle under `parent`
    pub fn circle(&self, parent: &str, id: &str, title: &str) -> &Self {
        self.add(parent, NodeSummary::new(id, title).with_parent(parent), NodeLabel::Circle)
    }

    /// Add a circle with an HTML purpose under `parent`
    pub fn circle_with_purpose(&self, parent: &str, id: &str, title: &str, purpose: &str) -> &Self {
        let summary = NodeSummary::new(id, title)
            .with_parent(parent)
            .with_purpose(purpose);
        self.add(parent, summary, NodeLabel::Circle)
    }

    /// Add a role under `parent`
    pub fn role(&self, parent: &str, id: &str, title: &str) -> &Self {
        self.add(parent, NodeSummary::new(id, title).with_parent(parent), NodeLabel::Role)
    }

    /// Remove a node and its subtree
    pub fn remove(&self, id: &str) -> &Self {
        let mut state = self.state.lock();
        let mut pending = vec![id.to_string()];
        while let Some(next) = pending.pop() {
            state.nodes.remove(&next);
            if let Some(children) = state.children.remove(&next) {
                pending.extend(children);
            }
        }
        for children in state.children.values_mut() {
            children.retain(|c| c != id);
        }
        drop(state);
        self
    }

    /// Make circle queries under `id` also return `id` itself
    pub fn reference_self(&self, id: &str) -> &Self {
        self.state.lock().self_referencing.insert(id.to_string());
        self
    }

    /// Make circle queries under `parent` also return `other`
    pub fn inject_child(&self, parent: &str, other: &str) -> &Self {
        self.state
            .lock()
            .injected
            .entry(parent.to_string())
            .or_default()
            .push(other.to_string());
        self
    }

    /// Let the query depth reach below direct children
    pub fn return_descendants(&self) -> &Self {
        self.state.lock().descendants = true;
        self
    }

    /// Reject every call as if the credential expired
    pub fn expire_credential(&self) {
        self.state.lock().unauthorized = true;
    }

    /// Accept the credential again
    pub fn renew_credential(&self) {
        let mut state = self.state.lock();
        state.unauthorized = false;
        state.searches_left = None;
    }

    /// Let `count` more searches succeed, then expire the credential
    pub fn expire_after_searches(&self, count: usize) {
        self.state.lock().searches_left = Some(count);
    }

    /// Make `mark_synced` fail with a server error
    pub fn fail_mark_synced(&self, fail: bool) {
        self.state.lock().fail_mark_synced = fail;
    }

    /// Queries received so far
    #[must_use]
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.state.lock().queries.clone()
    }

    /// Roots passed to `mark_synced`
    #[must_use]
    pub fn marked(&self) -> Vec<String> {
        self.state.lock().marked.clone()
    }

    /// Items created through `create_inbox_item`
    #[must_use]
    pub fn inbox(&self) -> Vec<NodeSummary> {
        self.state.lock().inbox.clone()
    }

    fn add(&self, parent: &str, summary: NodeSummary, label: NodeLabel) -> &Self {
        let mut state = self.state.lock();
        state
            .children
            .entry(parent.to_string())
            .or_default()
            .push(summary.id.clone());
        state.nodes.insert(summary.id.clone(), FakeNode { summary, label });
        drop(state);
        self
    }

    fn descendants_of(state: &FakeState, context: &str, levels: u32) -> Vec<String> {
        let mut found = Vec::new();
        let mut frontier = vec![context.to_string()];
        for _ in 0..levels {
            let next: Vec<String> = frontier
                .iter()
                .filter_map(|id| state.children.get(id))
                .flatten()
                .cloned()
                .collect();
            if next.is_empty() {
                break;
            }
            found.extend(next.iter().cloned());
            frontier = next;
        }
        found
    }

    fn check_auth(state: &FakeState) -> Result<(), RemoteError> {
        if state.unauthorized {
            return Err(RemoteError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGraph for FakeRemote {
    async fn search(
        &self,
        _credential: &Credential,
        query: &SearchQuery,
    ) -> Result<Vec<NodeSummary>, RemoteError> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        match state.searches_left {
            Some(0) => state.unauthorized = true,
            Some(n) => state.searches_left = Some(n - 1),
            None => {}
        }
        Self::check_auth(&state)?;

        let Some(context) = query.context_id.as_deref() else {
            return Ok(Vec::new());
        };

        let mut ids: Vec<String> = if state.descendants {
            let levels = query.depth.map_or(1, |depth| depth.saturating_sub(1).max(1));
            Self::descendants_of(&state, context, levels)
        } else {
            state.children.get(context).cloned().unwrap_or_default()
        };
        if query.label == NodeLabel::Circle {
            if state.self_referencing.contains(context) {
                ids.insert(0, context.to_string());
            }
            if let Some(extra) = state.injected.get(context) {
                ids.extend(extra.iter().cloned());
            }
        }

        let matching: Vec<NodeSummary> = ids
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|node| node.label == query.label || node.summary.id == context)
            .map(|node| node.summary.clone())
            .collect();

        Ok(matching.into_iter().skip(query.skip).take(query.limit).collect())
    }

    async fn workspaces(
        &self,
        _credential: &Credential,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<NodeSummary>, RemoteError> {
        let state = self.state.lock();
        Self::check_auth(&state)?;
        Ok(state.workspaces.iter().skip(skip).take(limit).cloned().collect())
    }

    async fn mark_synced(&self, _credential: &Credential, root_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        Self::check_auth(&state)?;
        if state.fail_mark_synced {
            return Err(RemoteError::unavailable(Some(503), "maintenance"));
        }
        state.marked.push(root_id.to_string());
        Ok(())
    }

    async fn create_inbox_item(
        &self,
        _credential: &Credential,
        title: &str,
        description: Option<&str>,
    ) -> Result<NodeSummary, RemoteError> {
        let mut state = self.state.lock();
        Self::check_auth(&state)?;
        let mut item = NodeSummary::new(format!("inbox-{}", state.inbox.len() + 1), title).with_parent("inbox");
        if let Some(description) = description {
            item = item.with_purpose(description);
        }
        state.inbox.push(item.clone());
        Ok(item)
    }
}

/// Workspace `W1` "Acme" with a single circle `C1` "Ops"
#[must_use]
pub fn single_circle_workspace() -> FakeRemote {
    let remote = FakeRemote::new();
    remote.workspace("W1", "Acme").circle("W1", "C1", "Ops");
    remote
}

/// Workspace `W1` "Acme" with nested circles and roles at every level
///
/// ```text
/// W1 Acme
/// ├── R1 Lead Link
/// ├── C1 Ops
/// │   ├── R2 Facilitator
/// │   └── C2 Infra Team
/// │       └── R3 On Call
/// └── C3 Sales
/// ```
#[must_use]
pub fn nested_workspace() -> FakeRemote {
    let remote = FakeRemote::new();
    remote
        .workspace("W1", "Acme")
        .role("W1", "R1", "Lead Link")
        .circle_with_purpose("W1", "C1", "Ops", "<p>Keep things <b>running</b></p>")
        .role("C1", "R2", "Facilitator")
        .circle("C1", "C2", "Infra Team")
        .role("C2", "R3", "On Call")
        .circle("W1", "C3", "Sales");
    remote
}

/// Engine wired to a fake remote and in-memory platform and store
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub platform: Arc<MemoryPlatform>,
    pub store: Arc<MemoryMappingStore>,
    pub engine: SyncEngine,
}

impl Harness {
    #[must_use]
    pub fn new(remote: FakeRemote) -> Self {
        Self::with_config(remote, SyncConfig::default())
    }

    #[must_use]
    pub fn with_config(remote: FakeRemote, config: SyncConfig) -> Self {
        Self::with_platform(remote, MemoryPlatform::new(), config)
    }

    #[must_use]
    pub fn with_platform(remote: FakeRemote, platform: MemoryPlatform, config: SyncConfig) -> Self {
        let remote = Arc::new(remote);
        let platform = Arc::new(platform);
        let store = Arc::new(MemoryMappingStore::new());
        let engine = SyncEngine::new(remote.clone(), platform.clone(), store.clone(), config);
        Self {
            remote,
            platform,
            store,
            engine,
        }
    }
}

/// Credential accepted by [`FakeRemote`]
#[must_use]
pub fn credential() -> Credential {
    Credential::new("test-token", "test-user")
}

/// Scope used by the canned fixtures
#[must_use]
pub fn scope() -> Scope {
    Scope::new("guild-1")
}

/// Request syncing `W1` "Acme" into [`scope`]
#[must_use]
pub fn acme_request() -> SyncRequest {
    SyncRequest::new(scope(), "W1", "Acme")
}
