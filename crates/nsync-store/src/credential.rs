//! Credential store
//!
//! Maps a chat identity to the remote-service credentials issued to it. Records
//! are written by the login flow and only read by the sync engine.

use crate::error::StoreError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Remote credentials stored for one chat identity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub discord_identity: String,
    pub remote_user_id: String,
    pub auth_token: String,
}

impl CredentialRecord {
    /// Create record
    #[must_use]
    pub fn new(
        discord_identity: impl Into<String>,
        remote_user_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            discord_identity: discord_identity.into(),
            remote_user_id: remote_user_id.into(),
            auth_token: auth_token.into(),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("discord_identity", &self.discord_identity)
            .field("remote_user_id", &self.remote_user_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    credentials: Vec<CredentialRecord>,
}

/// Identity → credential collection
///
/// Kept as a flat list rather than a map so that duplicate identities written
/// by another process are detected instead of silently collapsed.
#[derive(Debug)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    records: RwLock<Vec<CredentialRecord>>,
}

impl CredentialStore {
    /// Create an unpersisted store
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Create an unpersisted store holding `records` as given
    #[must_use]
    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        Self {
            path: None,
            records: RwLock::new(records),
        }
    }

    /// Open the store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    /// IO or decoding failures
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: CredentialFile = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::serialize(&path, e))?;
                file.credentials
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// Credential for `identity`, if one is stored
    ///
    /// # Errors
    /// `ConsistencyViolation` if more than one record exists for the identity
    pub fn lookup(&self, identity: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let records = self.records.read();
        let mut matches = records.iter().filter(|r| r.discord_identity == identity);
        let first = matches.next().cloned();
        let extra = matches.count();
        if extra > 0 {
            return Err(StoreError::ConsistencyViolation {
                identity: identity.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// Store or replace the credential for the record's identity, then persist
    ///
    /// # Errors
    /// `ConsistencyViolation` if duplicates already exist, or persistence failures
    pub async fn upsert(&self, record: CredentialRecord) -> Result<(), StoreError> {
        self.lookup(&record.discord_identity)?;
        {
            let mut records = self.records.write();
            match records
                .iter_mut()
                .find(|r| r.discord_identity == record.discord_identity)
            {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        self.persist().await
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no credentials are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CredentialFile {
            credentials: self.records.read().clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| StoreError::serialize(path, e))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_missing_identity() {
        let store = CredentialStore::in_memory();
        assert!(store.lookup("nobody").unwrap().is_none());
    }

    #[test]
    fn lookup_detects_duplicates() {
        let store = CredentialStore::from_records(vec![
            CredentialRecord::new("u1", "r1", "t1"),
            CredentialRecord::new("u2", "r2", "t2"),
            CredentialRecord::new("u1", "r1", "t3"),
        ]);

        let err = store.lookup("u1").unwrap_err();
        assert!(matches!(err, StoreError::ConsistencyViolation { count: 2, .. }));
        assert!(store.lookup("u2").unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_existing() {
        let store = CredentialStore::in_memory();
        store.upsert(CredentialRecord::new("u1", "r1", "old")).await.unwrap();
        store.upsert(CredentialRecord::new("u1", "r1", "new")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("u1").unwrap().unwrap().auth_token, "new");
    }

    #[test]
    fn debug_redacts_token() {
        let record = CredentialRecord::new("u1", "r1", "secret-token");
        let text = format!("{record:?}");
        assert!(!text.contains("secret-token"));
    }
}
