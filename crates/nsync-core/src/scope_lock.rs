//! Per-scope serialization
//!
//! Two sync/unsync runs for the same scope must not interleave; runs for
//! different scopes proceed independently.

use dashmap::DashMap;
use nsync_store::Scope;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held for the duration of one run
pub type ScopeGuard = OwnedMutexGuard<()>;

/// Lazily created mutex per scope
#[derive(Debug, Default)]
pub struct ScopeLocks {
    locks: DashMap<Scope, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    /// Create empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `scope`
    pub async fn acquire(&self, scope: &Scope) -> ScopeGuard {
        let lock = self.lock_for(scope);
        lock.lock_owned().await
    }

    /// Exclusive access to `scope` if nobody holds it
    #[must_use]
    pub fn try_acquire(&self, scope: &Scope) -> Option<ScopeGuard> {
        self.lock_for(scope).try_lock_owned().ok()
    }

    /// Number of scopes seen
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no scope has been locked yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn lock_for(&self, scope: &Scope) -> Arc<Mutex<()>> {
        // Clone out so the shard lock is released before awaiting.
        self.locks.entry(scope.clone()).or_default().clone()
    }
}
