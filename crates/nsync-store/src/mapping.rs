//! Mapping store
//!
//! Provides [`MappingStore`], the scoped record collection the sync engine
//! reads and mutates, with two backends:
//! - [`MemoryMappingStore`] for tests and dry runs
//! - [`JsonMappingStore`] persisting to a single JSON file
//!
//! Every operation takes the scope explicitly; no lookup ever crosses scopes.
//! Mutations are buffered until [`MappingStore::flush`] is called.

use crate::error::StoreError;
use crate::record::{MappingRecord, RecordKind, Scope, WorkspaceMapping};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for `(scope, remote_id)`
    Inserted,
    /// Mutable fields of the existing record were replaced
    Updated,
}

/// Scoped key/value collection of mapping records
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Find the record of `kind` for `remote_id` in `scope`
    async fn find(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<Option<MappingRecord>, StoreError>;

    /// All records of `kind` whose parent is `parent_remote_id`
    async fn find_by_parent(
        &self,
        scope: &Scope,
        kind: RecordKind,
        parent_remote_id: &str,
    ) -> Result<Vec<MappingRecord>, StoreError>;

    /// Workspace records of `scope`
    async fn find_roots(&self, scope: &Scope) -> Result<Vec<WorkspaceMapping>, StoreError>;

    /// Every record of `scope`
    async fn records(&self, scope: &Scope) -> Result<Vec<MappingRecord>, StoreError>;

    /// Insert, or replace the mutable fields of the existing record
    async fn upsert(&self, record: MappingRecord) -> Result<UpsertOutcome, StoreError>;

    /// Remove the record of `kind` for `remote_id`; returns whether one existed
    async fn remove(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<bool, StoreError>;

    /// Make all buffered mutations durable
    async fn flush(&self) -> Result<(), StoreError>;
}

/// Ordered in-memory index keyed on `(scope, remote_id)`
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    records: BTreeMap<(Scope, String), MappingRecord>,
}

impl RecordIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a flat list of records
    ///
    /// # Errors
    /// `KindConflict` if two records share `(scope, remote_id)` with different kinds
    pub fn from_records(
        records: impl IntoIterator<Item = MappingRecord>,
    ) -> Result<Self, StoreError> {
        let mut index = Self::new();
        for record in records {
            index.upsert(record)?;
        }
        Ok(index)
    }

    /// Lookup by kind and remote id
    #[must_use]
    pub fn find(&self, scope: &Scope, kind: RecordKind, remote_id: &str) -> Option<&MappingRecord> {
        self.records
            .get(&(scope.clone(), remote_id.to_string()))
            .filter(|r| r.kind() == kind)
    }

    /// Records of one scope, in key order
    pub fn scoped<'a>(&'a self, scope: &'a Scope) -> impl Iterator<Item = &'a MappingRecord> + 'a {
        self.records
            .range((scope.clone(), String::new())..)
            .take_while(move |((s, _), _)| s == scope)
            .map(|(_, record)| record)
    }

    /// Children of `parent_remote_id` with the given kind
    #[must_use]
    pub fn by_parent(
        &self,
        scope: &Scope,
        kind: RecordKind,
        parent_remote_id: &str,
    ) -> Vec<MappingRecord> {
        self.scoped(scope)
            .filter(|r| r.kind() == kind && r.parent_remote_id() == Some(parent_remote_id))
            .cloned()
            .collect()
    }

    /// Insert or merge
    ///
    /// # Errors
    /// `KindConflict` if the key is already used by another kind
    pub fn upsert(&mut self, record: MappingRecord) -> Result<UpsertOutcome, StoreError> {
        let key = (record.scope().clone(), record.remote_id().to_string());
        match self.records.get_mut(&key) {
            None => {
                self.records.insert(key, record);
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) => {
                let existing_kind = existing.kind();
                let incoming_kind = record.kind();
                if existing.merge_from(record) {
                    Ok(UpsertOutcome::Updated)
                } else {
                    Err(StoreError::KindConflict {
                        scope: key.0,
                        remote_id: key.1,
                        existing: existing_kind,
                        incoming: incoming_kind,
                    })
                }
            }
        }
    }

    /// Remove by kind and remote id
    pub fn remove(&mut self, scope: &Scope, kind: RecordKind, remote_id: &str) -> bool {
        let key = (scope.clone(), remote_id.to_string());
        if self.records.get(&key).is_some_and(|r| r.kind() == kind) {
            self.records.remove(&key);
            true
        } else {
            false
        }
    }

    /// Total record count across scopes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flat record list, the persisted layout
    #[must_use]
    pub fn to_records(&self) -> Vec<MappingRecord> {
        self.records.values().cloned().collect()
    }
}

/// In-memory mapping store
///
/// Flushing is a no-op apart from resetting the pending-write counter, which
/// lets tests observe that callers flush before dependent steps.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    index: RwLock<RecordIndex>,
    pending_writes: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryMappingStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-populated from an index snapshot
    #[must_use]
    pub fn with_index(index: RecordIndex) -> Self {
        Self {
            index: RwLock::new(index),
            ..Self::default()
        }
    }

    /// Mutations since the last flush
    #[inline]
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Number of flushes performed
    #[inline]
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Copy of the current index
    #[must_use]
    pub fn snapshot(&self) -> RecordIndex {
        self.index.read().clone()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn find(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<Option<MappingRecord>, StoreError> {
        Ok(self.index.read().find(scope, kind, remote_id).cloned())
    }

    async fn find_by_parent(
        &self,
        scope: &Scope,
        kind: RecordKind,
        parent_remote_id: &str,
    ) -> Result<Vec<MappingRecord>, StoreError> {
        Ok(self.index.read().by_parent(scope, kind, parent_remote_id))
    }

    async fn find_roots(&self, scope: &Scope) -> Result<Vec<WorkspaceMapping>, StoreError> {
        Ok(roots_of(&self.index.read(), scope))
    }

    async fn records(&self, scope: &Scope) -> Result<Vec<MappingRecord>, StoreError> {
        Ok(self.index.read().scoped(scope).cloned().collect())
    }

    async fn upsert(&self, record: MappingRecord) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.index.write().upsert(record)?;
        self.pending_writes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn remove(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<bool, StoreError> {
        let removed = self.index.write().remove(scope, kind, remote_id);
        if removed {
            self.pending_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.pending_writes.store(0, Ordering::SeqCst);
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// On-disk layout of [`JsonMappingStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    records: Vec<MappingRecord>,
}

const MAPPING_FILE_VERSION: u32 = 1;

/// Mapping store persisted as one JSON document
///
/// Writes go to a sibling temp file which is renamed over the target, so a
/// crash mid-flush leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonMappingStore {
    path: PathBuf,
    index: RwLock<RecordIndex>,
    dirty: AtomicUsize,
}

impl JsonMappingStore {
    /// Open the store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    /// IO or decoding failures, or kind conflicts in the persisted records
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let index = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: MappingFile = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::serialize(&path, e))?;
                tracing::debug!(
                    path = %path.display(),
                    records = file.records.len(),
                    "loaded mapping store"
                );
                RecordIndex::from_records(file.records)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordIndex::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        Ok(Self {
            path,
            index: RwLock::new(index),
            dirty: AtomicUsize::new(0),
        })
    }

    /// Backing file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current index
    #[must_use]
    pub fn snapshot(&self) -> RecordIndex {
        self.index.read().clone()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MappingStore for JsonMappingStore {
    async fn find(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<Option<MappingRecord>, StoreError> {
        Ok(self.index.read().find(scope, kind, remote_id).cloned())
    }

    async fn find_by_parent(
        &self,
        scope: &Scope,
        kind: RecordKind,
        parent_remote_id: &str,
    ) -> Result<Vec<MappingRecord>, StoreError> {
        Ok(self.index.read().by_parent(scope, kind, parent_remote_id))
    }

    async fn find_roots(&self, scope: &Scope) -> Result<Vec<WorkspaceMapping>, StoreError> {
        Ok(roots_of(&self.index.read(), scope))
    }

    async fn records(&self, scope: &Scope) -> Result<Vec<MappingRecord>, StoreError> {
        Ok(self.index.read().scoped(scope).cloned().collect())
    }

    async fn upsert(&self, record: MappingRecord) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.index.write().upsert(record)?;
        self.dirty.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn remove(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
    ) -> Result<bool, StoreError> {
        let removed = self.index.write().remove(scope, kind, remote_id);
        if removed {
            self.dirty.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let pending = self.dirty.swap(0, Ordering::SeqCst);
        if pending == 0 {
            return Ok(());
        }

        let file = MappingFile {
            version: MAPPING_FILE_VERSION,
            records: self.index.read().to_records(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| StoreError::serialize(&self.path, e))?;

        let tmp = self.temp_path();
        let written = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            // Keep the writes pending so a later flush retries them.
            self.dirty.fetch_add(pending, Ordering::SeqCst);
            return Err(StoreError::io(&self.path, e));
        }

        tracing::debug!(path = %self.path.display(), records = file.records.len(), "flushed mapping store");
        Ok(())
    }
}

fn roots_of(index: &RecordIndex, scope: &Scope) -> Vec<WorkspaceMapping> {
    index
        .scoped(scope)
        .filter_map(|r| match r {
            MappingRecord::Workspace(w) => Some(w.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CircleMapping, PlatformId, RoleMapping};
    use chrono::Utc;

    fn workspace(scope: &str, id: &str) -> MappingRecord {
        MappingRecord::Workspace(WorkspaceMapping {
            remote_id: id.to_string(),
            scope: Scope::new(scope),
            display_name: "Acme".to_string(),
            channel_prefix: None,
            container_id: PlatformId::new("cat-1"),
            last_synced_at: Utc::now(),
        })
    }

    fn circle(scope: &str, id: &str, parent: &str) -> MappingRecord {
        MappingRecord::Circle(CircleMapping {
            remote_id: id.to_string(),
            scope: Scope::new(scope),
            title: id.to_uppercase(),
            channel_id: PlatformId::new(format!("ch-{id}")),
            parent_remote_id: parent.to_string(),
            last_synced_at: Utc::now(),
        })
    }

    fn role(scope: &str, id: &str, parent: &str) -> MappingRecord {
        MappingRecord::Role(RoleMapping {
            remote_id: id.to_string(),
            scope: Scope::new(scope),
            title: id.to_uppercase(),
            label_id: PlatformId::new(format!("lbl-{id}")),
            parent_circle_remote_id: parent.to_string(),
            last_synced_at: Utc::now(),
        })
    }

    #[test]
    fn index_scoped_iteration_stays_in_scope() {
        let index = RecordIndex::from_records([
            workspace("a", "w1"),
            circle("a", "c1", "w1"),
            workspace("b", "w1"),
            circle("ab", "c9", "w1"),
        ])
        .unwrap();

        let scope = Scope::new("a");
        let ids: Vec<_> = index.scoped(&scope).map(|r| r.remote_id().to_string()).collect();
        assert_eq!(ids, vec!["c1", "w1"]);
    }

    #[test]
    fn index_rejects_kind_conflict() {
        let mut index = RecordIndex::new();
        index.upsert(circle("a", "n1", "w1")).unwrap();

        let err = index.upsert(role("a", "n1", "w1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::KindConflict {
                existing: RecordKind::Circle,
                incoming: RecordKind::Role,
                ..
            }
        ));
    }

    #[test]
    fn index_remove_requires_matching_kind() {
        let mut index = RecordIndex::new();
        index.upsert(circle("a", "n1", "w1")).unwrap();

        assert!(!index.remove(&Scope::new("a"), RecordKind::Role, "n1"));
        assert!(index.remove(&Scope::new("a"), RecordKind::Circle, "n1"));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn memory_store_tracks_pending_writes() {
        let store = MemoryMappingStore::new();
        store.upsert(workspace("a", "w1")).await.unwrap();
        store.upsert(circle("a", "c1", "w1")).await.unwrap();
        assert_eq!(store.pending_writes(), 2);

        store.flush().await.unwrap();
        assert_eq!(store.pending_writes(), 0);
        assert_eq!(store.flush_count(), 1);
    }

    #[tokio::test]
    async fn memory_store_find_by_parent_filters_kind() {
        let store = MemoryMappingStore::new();
        store.upsert(circle("a", "c1", "w1")).await.unwrap();
        store.upsert(role("a", "r1", "w1")).await.unwrap();
        store.upsert(role("a", "r2", "c1")).await.unwrap();

        let scope = Scope::new("a");
        let roles = store.find_by_parent(&scope, RecordKind::Role, "w1").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].remote_id(), "r1");

        let circles = store.find_by_parent(&scope, RecordKind::Circle, "w1").await.unwrap();
        assert_eq!(circles.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_upsert_reports_outcome() {
        let store = MemoryMappingStore::new();
        assert_eq!(store.upsert(circle("a", "c1", "w1")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(circle("a", "c1", "w1")).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.records(&Scope::new("a")).await.unwrap().len(), 1);
    }
}
