//! Error types for nsync storage
//!
//! Covers:
//! - Persistence failures (file IO, encoding)
//! - Key conflicts between record kinds
//! - Credential consistency violations

use crate::record::{RecordKind, Scope};
use std::path::PathBuf;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error while reading or writing the backing file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backing file could not be encoded or decoded
    #[error("serialization error on {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A record with the same remote id exists in the scope under another kind
    #[error("{remote_id} in scope {scope} is already mapped as a {existing}, not a {incoming}")]
    KindConflict {
        scope: Scope,
        remote_id: String,
        existing: RecordKind,
        incoming: RecordKind,
    },

    /// More than one credential is stored for a single identity
    #[error("consistency violation: {count} credential records for identity {identity}")]
    ConsistencyViolation { identity: String, count: usize },
}

impl StoreError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create serialization error for path
    pub fn serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.into(),
            source,
        }
    }

    /// Whether this error indicates corrupted external data
    #[inline]
    #[must_use]
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::ConsistencyViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_conflict_display() {
        let err = StoreError::KindConflict {
            scope: Scope::new("g1"),
            remote_id: "n1".to_string(),
            existing: RecordKind::Circle,
            incoming: RecordKind::Role,
        };
        let text = err.to_string();
        assert!(text.contains("n1"));
        assert!(text.contains("circle"));
        assert!(text.contains("role"));
    }

    #[test]
    fn consistency_violation_classified() {
        let err = StoreError::ConsistencyViolation {
            identity: "u1".to_string(),
            count: 2,
        };
        assert!(err.is_consistency_violation());
        assert!(!StoreError::io("x", std::io::Error::other("boom")).is_consistency_violation());
    }
}
