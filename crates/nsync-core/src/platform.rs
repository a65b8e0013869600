//! Platform adapter
//!
//! Capability interface over the collaboration platform the graph is mirrored
//! into. The engine only ever calls through [`PlatformAdapter`]; it never owns
//! platform sessions.
//!
//! [`MemoryPlatform`] backs tests and dry-run planning.

use crate::error::PlatformError;
use async_trait::async_trait;
use nsync_store::{PlatformId, Scope};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Scoped create/find/delete over containers, channels and labels
///
/// Lookups match the exact derived name.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    async fn find_container(&self, scope: &Scope, name: &str) -> Result<Option<PlatformId>, PlatformError>;

    async fn create_container(&self, scope: &Scope, name: &str) -> Result<PlatformId, PlatformError>;

    async fn find_channel(
        &self,
        scope: &Scope,
        container: &PlatformId,
        name: &str,
    ) -> Result<Option<PlatformId>, PlatformError>;

    async fn create_channel(
        &self,
        scope: &Scope,
        container: &PlatformId,
        name: &str,
        topic: Option<&str>,
    ) -> Result<PlatformId, PlatformError>;

    async fn find_label(&self, scope: &Scope, name: &str) -> Result<Option<PlatformId>, PlatformError>;

    async fn create_label(&self, scope: &Scope, name: &str) -> Result<PlatformId, PlatformError>;

    /// Delete a channel; `Ok(false)` if it no longer exists
    async fn delete_channel(&self, id: &PlatformId) -> Result<bool, PlatformError>;

    /// Delete a container; `Ok(false)` if it no longer exists
    async fn delete_container(&self, id: &PlatformId) -> Result<bool, PlatformError>;

    /// Delete a label; `Ok(false)` if it no longer exists
    async fn delete_label(&self, id: &PlatformId) -> Result<bool, PlatformError>;
}

/// Platform object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Container,
    Channel,
    Label,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Container => "container",
            Self::Channel => "channel",
            Self::Label => "label",
        })
    }
}

/// Object held by [`MemoryPlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformObject {
    pub id: PlatformId,
    pub kind: ObjectKind,
    pub scope: Scope,
    pub name: String,
    /// Container of a channel
    pub container: Option<PlatformId>,
    pub topic: Option<String>,
}

/// Mutating call recorded by [`MemoryPlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
    Created { kind: ObjectKind, name: String },
    Deleted { kind: ObjectKind, name: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<PlatformId, PlatformObject>,
    next_id: u64,
    ops: Vec<PlatformOp>,
    failing: HashSet<(ObjectKind, String)>,
    failing_deletes: HashSet<(ObjectKind, String)>,
    unconfigured: bool,
}

/// In-memory platform
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
}

impl MemoryPlatform {
    /// Create empty platform
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform where every call fails with `Unconfigured`
    #[must_use]
    pub fn unconfigured() -> Self {
        let platform = Self::default();
        platform.state.lock().unconfigured = true;
        platform
    }

    /// Make the next create of `kind` named `name` fail
    pub fn fail_create(&self, kind: ObjectKind, name: impl Into<String>) {
        self.state.lock().failing.insert((kind, name.into()));
    }

    /// Make the next delete of `kind` named `name` fail
    pub fn fail_delete(&self, kind: ObjectKind, name: impl Into<String>) {
        self.state.lock().failing_deletes.insert((kind, name.into()));
    }

    /// Objects of one scope, in id order
    #[must_use]
    pub fn objects(&self, scope: &Scope) -> Vec<PlatformObject> {
        self.state
            .lock()
            .objects
            .values()
            .filter(|o| &o.scope == scope)
            .cloned()
            .collect()
    }

    /// Names of `kind` objects in `scope`, sorted
    #[must_use]
    pub fn names(&self, scope: &Scope, kind: ObjectKind) -> Vec<String> {
        let mut names: Vec<_> = self
            .objects(scope)
            .into_iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.name)
            .collect();
        names.sort();
        names
    }

    /// Object by id
    #[must_use]
    pub fn get(&self, id: &PlatformId) -> Option<PlatformObject> {
        self.state.lock().objects.get(id).cloned()
    }

    /// Mutations performed so far
    #[must_use]
    pub fn operations(&self) -> Vec<PlatformOp> {
        self.state.lock().ops.clone()
    }

    /// Insert an object directly, as if created out of band
    pub fn seed(&self, scope: &Scope, kind: ObjectKind, name: &str, container: Option<&PlatformId>) -> PlatformId {
        let mut state = self.state.lock();
        let id = Self::insert(&mut state, scope, kind, name, container, None);
        // Seeding is not a sync-driven mutation.
        state.ops.pop();
        id
    }

    fn insert(
        state: &mut MemoryState,
        scope: &Scope,
        kind: ObjectKind,
        name: &str,
        container: Option<&PlatformId>,
        topic: Option<&str>,
    ) -> PlatformId {
        state.next_id += 1;
        let id = PlatformId::new(format!("{kind}-{}", state.next_id));
        state.objects.insert(
            id.clone(),
            PlatformObject {
                id: id.clone(),
                kind,
                scope: scope.clone(),
                name: name.to_string(),
                container: container.cloned(),
                topic: topic.map(str::to_string),
            },
        );
        state.ops.push(PlatformOp::Created {
            kind,
            name: name.to_string(),
        });
        id
    }

    fn find(
        &self,
        scope: &Scope,
        kind: ObjectKind,
        name: &str,
        container: Option<&PlatformId>,
    ) -> Result<Option<PlatformId>, PlatformError> {
        let state = self.state.lock();
        check_configured(&state)?;
        Ok(state
            .objects
            .values()
            .find(|o| {
                o.kind == kind
                    && &o.scope == scope
                    && o.name == name
                    && (container.is_none() || o.container.as_ref() == container)
            })
            .map(|o| o.id.clone()))
    }

    fn create(
        &self,
        scope: &Scope,
        kind: ObjectKind,
        name: &str,
        container: Option<&PlatformId>,
        topic: Option<&str>,
    ) -> Result<PlatformId, PlatformError> {
        let mut state = self.state.lock();
        check_configured(&state)?;
        if state.failing.remove(&(kind, name.to_string())) {
            return Err(PlatformError::rejected(format!("create {kind}"), format!("{name} refused")));
        }
        if let Some(container) = container {
            if !state.objects.contains_key(container) {
                return Err(PlatformError::rejected(
                    format!("create {kind}"),
                    format!("unknown container {container}"),
                ));
            }
        }
        Ok(Self::insert(&mut state, scope, kind, name, container, topic))
    }

    fn delete(&self, kind: ObjectKind, id: &PlatformId) -> Result<bool, PlatformError> {
        let mut state = self.state.lock();
        check_configured(&state)?;
        let name = match state.objects.get(id) {
            Some(o) if o.kind == kind => o.name.clone(),
            _ => return Ok(false),
        };
        if state.failing_deletes.remove(&(kind, name.clone())) {
            return Err(PlatformError::rejected(format!("delete {kind}"), format!("{name} refused")));
        }
        state.objects.remove(id);
        state.ops.push(PlatformOp::Deleted { kind, name });
        Ok(true)
    }
}

fn check_configured(state: &MemoryState) -> Result<(), PlatformError> {
    if state.unconfigured {
        Err(PlatformError::Unconfigured("platform session".to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for MemoryPlatform {
    async fn find_container(&self, scope: &Scope, name: &str) -> Result<Option<PlatformId>, PlatformError> {
        self.find(scope, ObjectKind::Container, name, None)
    }

    async fn create_container(&self, scope: &Scope, name: &str) -> Result<PlatformId, PlatformError> {
        self.create(scope, ObjectKind::Container, name, None, None)
    }

    async fn find_channel(
        &self,
        scope: &Scope,
        container: &PlatformId,
        name: &str,
    ) -> Result<Option<PlatformId>, PlatformError> {
        self.find(scope, ObjectKind::Channel, name, Some(container))
    }

    async fn create_channel(
        &self,
        scope: &Scope,
        container: &PlatformId,
        name: &str,
        topic: Option<&str>,
    ) -> Result<PlatformId, PlatformError> {
        self.create(scope, ObjectKind::Channel, name, Some(container), topic)
    }

    async fn find_label(&self, scope: &Scope, name: &str) -> Result<Option<PlatformId>, PlatformError> {
        self.find(scope, ObjectKind::Label, name, None)
    }

    async fn create_label(&self, scope: &Scope, name: &str) -> Result<PlatformId, PlatformError> {
        self.create(scope, ObjectKind::Label, name, None, None)
    }

    async fn delete_channel(&self, id: &PlatformId) -> Result<bool, PlatformError> {
        self.delete(ObjectKind::Channel, id)
    }

    async fn delete_container(&self, id: &PlatformId) -> Result<bool, PlatformError> {
        self.delete(ObjectKind::Container, id)
    }

    async fn delete_label(&self, id: &PlatformId) -> Result<bool, PlatformError> {
        self.delete(ObjectKind::Label, id)
    }
}
