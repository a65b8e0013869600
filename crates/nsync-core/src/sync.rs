//! Sync algorithm
//!
//! Mirrors one remote workspace into the platform:
//! 1. Ensure the workspace container `"{display name} circles"` exists
//! 2. Ensure the anchor channel exists inside it
//! 3. Walk the circle tree from the root, creating a label per role and a
//!    channel per child circle, upserting a mapping record for each
//! 4. Record the workspace mapping and notify the remote side
//!
//! The walk uses an explicit work stack instead of recursion. Each circle is
//! queried with a depth one greater than its parent's; the root starts at
//! [`SyncConfig::initial_depth`]. Platform objects are looked up by derived
//! name before being created, so re-runs and resumed runs never duplicate.
//!
//! Deeper queries may also return grandchildren and further descendants.
//! Those are left for their own parent's visit, and a node is mapped at most
//! once per run.
//!
//! Nodes removed remotely are not deleted locally.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::naming;
use crate::platform::PlatformAdapter;
use crate::scope_lock::ScopeLocks;
use chrono::Utc;
use nsync_remote::{search_all, workspaces_all, Credential, NodeLabel, NodeSummary, RemoteGraph, SearchQuery};
use nsync_store::{
    CircleMapping, CredentialStore, MappingRecord, MappingStore, PlatformId, RoleMapping, Scope,
    UpsertOutcome, WorkspaceMapping,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// What to synchronize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub scope: Scope,
    /// Remote workspace id
    pub root_id: String,
    pub display_name: String,
    /// Prefix for the root's role labels and child channel names
    pub name_prefix: Option<String>,
}

impl SyncRequest {
    /// Create request without a name prefix
    #[must_use]
    pub fn new(scope: impl Into<Scope>, root_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            root_id: root_id.into(),
            display_name: display_name.into(),
            name_prefix: None,
        }
    }

    /// With name prefix
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub root_id: String,
    pub container_id: Option<PlatformId>,
    pub containers_created: usize,
    pub channels_created: usize,
    pub channels_found: usize,
    pub labels_created: usize,
    pub labels_found: usize,
    /// Circles whose roles and children were queried, root included
    pub circles_visited: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    /// Query results equal to their own context node, or to an ancestor
    pub self_references_skipped: usize,
    /// Query results below their context node's direct children, or already
    /// mapped earlier in the run
    pub repeated_nodes_skipped: usize,
    pub remote_notified: bool,
    pub execution_time_ms: u64,
}

impl SyncReport {
    /// Platform objects created by the run
    #[inline]
    #[must_use]
    pub fn objects_created(&self) -> usize {
        self.containers_created + self.channels_created + self.labels_created
    }

    fn count_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.records_inserted += 1,
            UpsertOutcome::Updated => self.records_updated += 1,
        }
    }
}

/// Pending step of the walk
enum Work {
    /// Query a circle's roles and child circles, map the roles
    Visit(Frame),
    /// Ensure a child circle's channel and mapping, then schedule its visit
    Child { parent: Frame, node: NodeSummary },
}

#[derive(Debug, Clone)]
struct Frame {
    node_id: String,
    prefix: Option<String>,
    depth: u32,
    /// Ids from the root down to this node, inclusive
    path: Arc<Vec<String>>,
}

/// Synchronization engine
///
/// Holds its collaborators explicitly; nothing is ambient. One engine may
/// serve many scopes; runs on the same scope are serialized.
pub struct SyncEngine {
    pub(crate) remote: Arc<dyn RemoteGraph>,
    pub(crate) platform: Arc<dyn PlatformAdapter>,
    pub(crate) store: Arc<dyn MappingStore>,
    pub(crate) config: SyncConfig,
    pub(crate) locks: ScopeLocks,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create engine over the given collaborators
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteGraph>,
        platform: Arc<dyn PlatformAdapter>,
        store: Arc<dyn MappingStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            platform,
            store,
            config,
            locks: ScopeLocks::new(),
        }
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Mirror the workspace described by `request`
    ///
    /// # Errors
    /// Any remote, platform or store failure aborts the run. Objects and
    /// records applied before the failure remain; a later run picks them up
    /// by name. A failed final notification is `SyncIncomplete`.
    #[tracing::instrument(
        skip(self, credential, request),
        fields(scope = %request.scope, root_id = %request.root_id)
    )]
    pub async fn sync_workspace(
        &self,
        credential: &Credential,
        request: &SyncRequest,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.acquire(&request.scope).await;
        let start = Instant::now();
        tracing::info!(display_name = %request.display_name, "starting workspace sync");

        let mut report = SyncReport {
            root_id: request.root_id.clone(),
            ..SyncReport::default()
        };

        let container = self.ensure_container(request, &mut report).await?;
        self.ensure_channel(&request.scope, &container, &self.config.anchor_channel, None, &mut report)
            .await?;

        self.walk(credential, request, &container, &mut report).await?;

        let outcome = self
            .store
            .upsert(MappingRecord::Workspace(WorkspaceMapping {
                remote_id: request.root_id.clone(),
                scope: request.scope.clone(),
                display_name: request.display_name.clone(),
                channel_prefix: request.name_prefix.clone(),
                container_id: container.clone(),
                last_synced_at: Utc::now(),
            }))
            .await?;
        report.count_upsert(outcome);
        self.store.flush().await?;
        report.container_id = Some(container);

        if self.config.mark_synced {
            if let Err(source) = self.remote.mark_synced(credential, &request.root_id).await {
                tracing::warn!(error = %source, "workspace synced but remote notification failed");
                return Err(SyncError::SyncIncomplete {
                    root_id: request.root_id.clone(),
                    source,
                });
            }
            report.remote_notified = true;
        }

        report.execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            circles = report.circles_visited,
            created = report.objects_created(),
            elapsed_ms = report.execution_time_ms,
            "workspace sync completed"
        );
        Ok(report)
    }

    /// Sync on behalf of a chat identity, resolving its stored credential
    ///
    /// # Errors
    /// `Unauthorized` if the identity never logged in, `ConsistencyViolation`
    /// if it has several credentials, otherwise as [`Self::sync_workspace`]
    pub async fn sync_for_identity(
        &self,
        credentials: &CredentialStore,
        identity: &str,
        request: &SyncRequest,
    ) -> Result<SyncReport, SyncError> {
        let record = credentials.lookup(identity)?.ok_or(SyncError::Unauthorized)?;
        let credential = Credential::new(record.auth_token, record.remote_user_id);
        self.sync_workspace(&credential, request).await
    }

    /// Workspaces the credential can choose from
    ///
    /// # Errors
    /// `Unauthorized` or `RemoteUnavailable`
    pub async fn list_workspaces(&self, credential: &Credential) -> Result<Vec<NodeSummary>, SyncError> {
        Ok(workspaces_all(self.remote.as_ref(), credential, self.config.page_size).await?)
    }

    /// Wait for an interactive workspace choice, then sync it
    ///
    /// The choice is bounded by [`SyncConfig::selection_timeout`]. Nothing is
    /// mutated unless a workspace is chosen in time.
    ///
    /// # Errors
    /// `SelectionTimedOut`, `SelectionCancelled`, or as [`Self::sync_workspace`]
    pub async fn sync_selected<F>(
        &self,
        credential: &Credential,
        scope: &Scope,
        name_prefix: Option<String>,
        selection: F,
    ) -> Result<SyncReport, SyncError>
    where
        F: Future<Output = Option<NodeSummary>> + Send,
    {
        let timeout = self.config.selection_timeout();
        let chosen = tokio::time::timeout(timeout, selection)
            .await
            .map_err(|_| SyncError::SelectionTimedOut {
                timeout_secs: timeout.as_secs(),
            })?
            .ok_or(SyncError::SelectionCancelled)?;

        let mut request = SyncRequest::new(scope.clone(), chosen.id, chosen.title);
        if let Some(prefix) = name_prefix {
            request = request.with_prefix(prefix);
        }
        self.sync_workspace(credential, &request).await
    }

    async fn ensure_container(
        &self,
        request: &SyncRequest,
        report: &mut SyncReport,
    ) -> Result<PlatformId, SyncError> {
        let name = naming::container_name(&request.display_name, &self.config.container_suffix);
        if let Some(id) = self.platform.find_container(&request.scope, &name).await? {
            tracing::debug!(%name, "container exists");
            return Ok(id);
        }
        let id = self.platform.create_container(&request.scope, &name).await?;
        report.containers_created += 1;
        tracing::info!(%name, %id, "created container");
        Ok(id)
    }

    async fn ensure_channel(
        &self,
        scope: &Scope,
        container: &PlatformId,
        name: &str,
        topic: Option<&str>,
        report: &mut SyncReport,
    ) -> Result<PlatformId, SyncError> {
        if let Some(id) = self.platform.find_channel(scope, container, name).await? {
            report.channels_found += 1;
            tracing::debug!(%name, "channel exists");
            return Ok(id);
        }
        let id = self.platform.create_channel(scope, container, name, topic).await?;
        report.channels_created += 1;
        tracing::info!(%name, %id, "created channel");
        Ok(id)
    }

    async fn ensure_label(
        &self,
        scope: &Scope,
        name: &str,
        report: &mut SyncReport,
    ) -> Result<PlatformId, SyncError> {
        if let Some(id) = self.platform.find_label(scope, name).await? {
            report.labels_found += 1;
            tracing::debug!(%name, "label exists");
            return Ok(id);
        }
        let id = self.platform.create_label(scope, name).await?;
        report.labels_created += 1;
        tracing::info!(%name, %id, "created label");
        Ok(id)
    }

    async fn walk(
        &self,
        credential: &Credential,
        request: &SyncRequest,
        container: &PlatformId,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let root = Frame {
            node_id: request.root_id.clone(),
            prefix: request.name_prefix.clone(),
            depth: self.config.initial_depth,
            path: Arc::new(vec![request.root_id.clone()]),
        };
        let mut mapped = HashSet::from([request.root_id.clone()]);
        let mut stack = vec![Work::Visit(root)];

        while let Some(work) = stack.pop() {
            match work {
                Work::Visit(frame) => {
                    if let Some(max) = self.config.max_nodes {
                        if report.circles_visited >= max {
                            return Err(SyncError::TraversalLimit(format!(
                                "more than {max} circles under {}",
                                request.root_id
                            )));
                        }
                    }
                    let children = self
                        .visit(credential, &request.scope, &frame, &mut mapped, report)
                        .await?;
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|node| Work::Child {
                                parent: frame.clone(),
                                node,
                            }),
                    );
                }
                Work::Child { parent, node } => {
                    let child = self
                        .map_child_circle(&request.scope, container, &parent, node, report)
                        .await?;
                    stack.push(Work::Visit(child));
                }
            }
        }
        Ok(())
    }

    /// Query one circle, map its roles, and return its child circles.
    ///
    /// Both queries complete before anything is written, so a failing query
    /// leaves no partial writes for this circle.
    async fn visit(
        &self,
        credential: &Credential,
        scope: &Scope,
        frame: &Frame,
        mapped: &mut HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<Vec<NodeSummary>, SyncError> {
        report.circles_visited += 1;
        tracing::debug!(node = %frame.node_id, depth = frame.depth, "visiting circle");

        let roles = self.query(credential, NodeLabel::Role, frame).await?;
        let circles = self.query(credential, NodeLabel::Circle, frame).await?;

        for role in roles {
            if !is_direct_child(&role, frame) || !mapped.insert(role.id.clone()) {
                tracing::debug!(node = %frame.node_id, role = %role.id, "skipping role outside this circle");
                report.repeated_nodes_skipped += 1;
                continue;
            }
            let label = naming::label_name(frame.prefix.as_deref(), &role.title);
            let label_id = self.ensure_label(scope, &label, report).await?;
            let outcome = self
                .store
                .upsert(MappingRecord::Role(RoleMapping {
                    remote_id: role.id,
                    scope: scope.clone(),
                    title: role.title,
                    label_id,
                    parent_circle_remote_id: frame.node_id.clone(),
                    last_synced_at: Utc::now(),
                }))
                .await?;
            self.store.flush().await?;
            report.count_upsert(outcome);
        }

        let mut children = Vec::with_capacity(circles.len());
        for circle in circles {
            if circle.id == frame.node_id {
                tracing::debug!(node = %frame.node_id, "skipping self-reference in circle query");
                report.self_references_skipped += 1;
                continue;
            }
            if frame.path.contains(&circle.id) {
                tracing::warn!(node = %frame.node_id, ancestor = %circle.id, "skipping ancestor returned as child");
                report.self_references_skipped += 1;
                continue;
            }
            if !is_direct_child(&circle, frame) || !mapped.insert(circle.id.clone()) {
                tracing::debug!(node = %frame.node_id, circle = %circle.id, "skipping circle outside this level");
                report.repeated_nodes_skipped += 1;
                continue;
            }
            children.push(circle);
        }
        Ok(children)
    }

    async fn map_child_circle(
        &self,
        scope: &Scope,
        container: &PlatformId,
        parent: &Frame,
        node: NodeSummary,
        report: &mut SyncReport,
    ) -> Result<Frame, SyncError> {
        let depth = parent.depth + 1;
        if let Some(max) = self.config.max_depth {
            if depth > max {
                return Err(SyncError::TraversalLimit(format!(
                    "circle {} would be queried at depth {depth}, limit is {max}",
                    node.id
                )));
            }
        }

        let slug = naming::circle_slug(parent.prefix.as_deref(), &node.title);
        let channel = naming::circle_channel_name(&slug);
        let topic = node
            .purpose
            .as_deref()
            .map(naming::strip_html)
            .filter(|t| !t.is_empty());
        let channel_id = self
            .ensure_channel(scope, container, &channel, topic.as_deref(), report)
            .await?;

        let outcome = self
            .store
            .upsert(MappingRecord::Circle(CircleMapping {
                remote_id: node.id.clone(),
                scope: scope.clone(),
                title: node.title,
                channel_id,
                parent_remote_id: parent.node_id.clone(),
                last_synced_at: Utc::now(),
            }))
            .await?;
        self.store.flush().await?;
        report.count_upsert(outcome);

        let mut path = Vec::with_capacity(parent.path.len() + 1);
        path.extend(parent.path.iter().cloned());
        path.push(node.id.clone());

        Ok(Frame {
            node_id: node.id,
            prefix: Some(slug),
            depth,
            path: Arc::new(path),
        })
    }

    async fn query(
        &self,
        credential: &Credential,
        label: NodeLabel,
        frame: &Frame,
    ) -> Result<Vec<NodeSummary>, SyncError> {
        let query = SearchQuery::new(label)
            .with_depth(frame.depth)
            .with_context(frame.node_id.clone())
            .with_limit(self.config.page_size);
        let nodes = search_all(self.remote.as_ref(), credential, query).await?;
        tracing::debug!(node = %frame.node_id, %label, count = nodes.len(), "remote query");
        Ok(nodes)
    }
}

/// Results without a parent id are taken as direct children
fn is_direct_child(node: &NodeSummary, frame: &Frame) -> bool {
    node.parent_id.as_deref().unwrap_or(&frame.node_id) == frame.node_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryPlatform, ObjectKind};
    use async_trait::async_trait;
    use mockall::mock;
    use nsync_remote::RemoteError;
    use nsync_store::{RecordKind, StoreError};
    use parking_lot::Mutex;

    mock! {
        Store {}

        #[async_trait]
        impl MappingStore for Store {
            async fn find(
                &self,
                scope: &Scope,
                kind: RecordKind,
                remote_id: &str,
            ) -> Result<Option<MappingRecord>, StoreError>;
            async fn find_by_parent(
                &self,
                scope: &Scope,
                kind: RecordKind,
                parent_remote_id: &str,
            ) -> Result<Vec<MappingRecord>, StoreError>;
            async fn find_roots(&self, scope: &Scope) -> Result<Vec<WorkspaceMapping>, StoreError>;
            async fn records(&self, scope: &Scope) -> Result<Vec<MappingRecord>, StoreError>;
            async fn upsert(&self, record: MappingRecord) -> Result<UpsertOutcome, StoreError>;
            async fn remove(
                &self,
                scope: &Scope,
                kind: RecordKind,
                remote_id: &str,
            ) -> Result<bool, StoreError>;
            async fn flush(&self) -> Result<(), StoreError>;
        }
    }

    /// Remote with an empty workspace, optionally rejecting the credential
    #[derive(Default)]
    struct EmptyRemote {
        unauthorized: bool,
        marked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteGraph for EmptyRemote {
        async fn search(&self, _: &Credential, _: &SearchQuery) -> Result<Vec<NodeSummary>, RemoteError> {
            if self.unauthorized {
                Err(RemoteError::Unauthorized)
            } else {
                Ok(Vec::new())
            }
        }

        async fn workspaces(&self, _: &Credential, _: usize, _: usize) -> Result<Vec<NodeSummary>, RemoteError> {
            Ok(Vec::new())
        }

        async fn mark_synced(&self, _: &Credential, root_id: &str) -> Result<(), RemoteError> {
            self.marked.lock().push(root_id.to_string());
            Ok(())
        }

        async fn create_inbox_item(
            &self,
            _: &Credential,
            title: &str,
            _: Option<&str>,
        ) -> Result<NodeSummary, RemoteError> {
            Ok(NodeSummary::new("inbox-1", title))
        }
    }

    fn credential() -> Credential {
        Credential::new("token", "user")
    }

    #[tokio::test]
    async fn unauthorized_query_writes_nothing() {
        let remote = Arc::new(EmptyRemote {
            unauthorized: true,
            ..EmptyRemote::default()
        });
        let mut store = MockStore::new();
        store.expect_upsert().never();
        store.expect_flush().never();

        let platform = Arc::new(MemoryPlatform::new());
        let engine = SyncEngine::new(remote.clone(), platform.clone(), Arc::new(store), SyncConfig::default());

        let err = engine
            .sync_workspace(&credential(), &SyncRequest::new("g1", "W1", "Acme"))
            .await
            .unwrap_err();

        assert!(err.is_reauth_required());
        assert!(remote.marked.lock().is_empty());
        // Container and anchor precede the walk.
        assert_eq!(platform.names(&Scope::new("g1"), ObjectKind::Channel), vec!["anchor-circle"]);
    }

    #[tokio::test]
    async fn failed_flush_skips_remote_notification() {
        let remote = Arc::new(EmptyRemote::default());
        let mut store = MockStore::new();
        store
            .expect_upsert()
            .withf(|record| record.kind() == RecordKind::Workspace && record.remote_id() == "W1")
            .times(1)
            .returning(|_| Ok(UpsertOutcome::Inserted));
        store.expect_flush().times(1).returning(|| {
            Err(StoreError::io(
                "nsync-db.json",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        });

        let engine = SyncEngine::new(
            remote.clone(),
            Arc::new(MemoryPlatform::new()),
            Arc::new(store),
            SyncConfig::default(),
        );

        let err = engine
            .sync_workspace(&credential(), &SyncRequest::new("g1", "W1", "Acme"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Store(StoreError::Io { .. })));
        assert!(remote.marked.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_workspace_is_notified_once_recorded() {
        let remote = Arc::new(EmptyRemote::default());
        let mut store = MockStore::new();
        store.expect_upsert().times(1).returning(|_| Ok(UpsertOutcome::Inserted));
        store.expect_flush().times(1).returning(|| Ok(()));

        let engine = SyncEngine::new(
            remote.clone(),
            Arc::new(MemoryPlatform::new()),
            Arc::new(store),
            SyncConfig::default(),
        );

        let report = engine
            .sync_workspace(&credential(), &SyncRequest::new("g1", "W1", "Acme"))
            .await
            .unwrap();

        assert_eq!(report.circles_visited, 1);
        assert_eq!(report.containers_created, 1);
        assert_eq!(report.channels_created, 1);
        assert!(report.remote_notified);
        assert_eq!(*remote.marked.lock(), vec!["W1".to_string()]);
    }

    #[test]
    fn request_prefix_ignores_empty() {
        let request = SyncRequest::new("g1", "W1", "Acme").with_prefix("");
        assert_eq!(request.name_prefix, None);

        let request = SyncRequest::new("g1", "W1", "Acme").with_prefix("acme");
        assert_eq!(request.name_prefix.as_deref(), Some("acme"));
    }

    #[test]
    fn report_counts_objects() {
        let report = SyncReport {
            containers_created: 1,
            channels_created: 2,
            labels_created: 3,
            ..SyncReport::default()
        };
        assert_eq!(report.objects_created(), 6);
    }
}
