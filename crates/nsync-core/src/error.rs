//! Error types for nsync core
//!
//! Provides the error taxonomy surfaced to callers of the sync engine:
//! - Credential failures (re-authenticate)
//! - Missing local records
//! - Remote and platform failures
//! - Consistency violations in external data
//!
//! The engine never swallows these. Mutations applied before the failure stay
//! in place; a later run reconciles them by name.

use nsync_remote::RemoteError;
use nsync_store::{RecordKind, Scope, StoreError};
use std::path::PathBuf;

/// Main sync error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Credential invalid, expired or missing
    #[error("remote credentials are invalid or expired; log in again")]
    Unauthorized,

    /// A record the operation expects is absent locally
    #[error("{kind} {remote_id} not found in scope {scope}")]
    NotFound {
        scope: Scope,
        kind: RecordKind,
        remote_id: String,
    },

    /// Non-auth failure of the remote service
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// Required platform capability is missing
    #[error("platform capability missing: {0}")]
    PlatformUnconfigured(String),

    /// External data is corrupted
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Platform objects were applied but the final remote notification failed
    #[error("sync of {root_id} applied but the remote side was not notified: {source}")]
    SyncIncomplete {
        root_id: String,
        #[source]
        source: RemoteError,
    },

    /// Mapping store failure
    #[error("mapping store error: {0}")]
    Store(StoreError),

    /// Platform adapter failure
    #[error("platform error: {0}")]
    Platform(PlatformError),

    /// Configured node or depth limit hit during the walk
    #[error("traversal limit reached: {0}")]
    TraversalLimit(String),

    /// Interactive workspace selection did not complete in time
    #[error("workspace selection timed out after {timeout_secs}s")]
    SelectionTimedOut { timeout_secs: u64 },

    /// Interactive workspace selection was declined
    #[error("workspace selection cancelled")]
    SelectionCancelled,
}

impl SyncError {
    /// Whether the user must log in again before retrying
    #[inline]
    #[must_use]
    pub fn is_reauth_required(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized
                | Self::SyncIncomplete {
                    source: RemoteError::Unauthorized,
                    ..
                }
        )
    }

    /// Whether re-running the same operation later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteUnavailable(_) | Self::Platform(PlatformError::Unavailable(_)) => true,
            Self::SyncIncomplete { source, .. } => !source.is_unauthorized(),
            _ => false,
        }
    }

    /// Create not-found error
    pub fn not_found(scope: &Scope, kind: RecordKind, remote_id: impl Into<String>) -> Self {
        Self::NotFound {
            scope: scope.clone(),
            kind,
            remote_id: remote_id.into(),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unauthorized => Self::Unauthorized,
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        if e.is_consistency_violation() {
            Self::ConsistencyViolation(e.to_string())
        } else {
            Self::Store(e)
        }
    }
}

impl From<PlatformError> for SyncError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Unconfigured(what) => Self::PlatformUnconfigured(what),
            other => Self::Platform(other),
        }
    }
}

/// Platform adapter errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    /// Capability not available in this scope
    #[error("not configured: {0}")]
    Unconfigured(String),

    /// Platform refused the operation
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    /// Platform temporarily unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    /// Create rejection error
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::SyncConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_to_taxonomy() {
        assert!(matches!(
            SyncError::from(RemoteError::Unauthorized),
            SyncError::Unauthorized
        ));
        assert!(matches!(
            SyncError::from(RemoteError::unavailable(Some(500), "boom")),
            SyncError::RemoteUnavailable(_)
        ));
    }

    #[test]
    fn credential_duplicates_map_to_consistency_violation() {
        let err = SyncError::from(StoreError::ConsistencyViolation {
            identity: "u1".to_string(),
            count: 2,
        });
        assert!(matches!(err, SyncError::ConsistencyViolation(_)));
    }

    #[test]
    fn unconfigured_platform_is_surfaced() {
        let err = SyncError::from(PlatformError::Unconfigured("webhook".to_string()));
        assert!(matches!(err, SyncError::PlatformUnconfigured(ref w) if w == "webhook"));
    }

    #[test]
    fn reauth_and_retry_classification() {
        assert!(SyncError::Unauthorized.is_reauth_required());
        assert!(!SyncError::Unauthorized.is_retryable());

        let incomplete = SyncError::SyncIncomplete {
            root_id: "W1".to_string(),
            source: RemoteError::unavailable(Some(502), "gateway"),
        };
        assert!(incomplete.is_retryable());
        assert!(!incomplete.is_reauth_required());

        let incomplete_auth = SyncError::SyncIncomplete {
            root_id: "W1".to_string(),
            source: RemoteError::Unauthorized,
        };
        assert!(incomplete_auth.is_reauth_required());
        assert!(!incomplete_auth.is_retryable());

        assert!(!SyncError::SelectionCancelled.is_retryable());
    }
}
