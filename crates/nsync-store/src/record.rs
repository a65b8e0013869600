//! Mapping record types
//!
//! A mapping record links one remote node (workspace, circle or role) to the
//! platform object created for it. Records are confined to a [`Scope`] and are
//! unique per `(scope, remote_id)`.
//!
//! The persisted form is one flat collection of records tagged by `kind`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform space that all mappings and platform lookups are confined to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Create scope from its platform identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Scope identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Scope {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for Scope {
    fn from(id: u64) -> Self {
        Self::new(id.to_string())
    }
}

/// Identifier of a platform object (container, channel or label)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(String);

impl PlatformId {
    /// Wrap a platform-issued identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Root of a synchronized tree
    Workspace,
    /// Circle mapped to a channel
    Circle,
    /// Role mapped to a label
    Role,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Workspace => "workspace",
            Self::Circle => "circle",
            Self::Role => "role",
        })
    }
}

/// Root of one synchronized tree, mapped to a platform container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMapping {
    pub remote_id: String,
    pub scope: Scope,
    pub display_name: String,
    pub channel_prefix: Option<String>,
    pub container_id: PlatformId,
    pub last_synced_at: DateTime<Utc>,
}

/// Circle mapped to a platform channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleMapping {
    pub remote_id: String,
    pub scope: Scope,
    pub title: String,
    pub channel_id: PlatformId,
    /// Workspace or circle this circle hangs under
    pub parent_remote_id: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Role mapped to a platform label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub remote_id: String,
    pub scope: Scope,
    pub title: String,
    pub label_id: PlatformId,
    pub parent_circle_remote_id: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Any mapping record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingRecord {
    Workspace(WorkspaceMapping),
    Circle(CircleMapping),
    Role(RoleMapping),
}

impl MappingRecord {
    /// Record kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Workspace(_) => RecordKind::Workspace,
            Self::Circle(_) => RecordKind::Circle,
            Self::Role(_) => RecordKind::Role,
        }
    }

    /// Scope the record belongs to
    #[must_use]
    pub fn scope(&self) -> &Scope {
        match self {
            Self::Workspace(w) => &w.scope,
            Self::Circle(c) => &c.scope,
            Self::Role(r) => &r.scope,
        }
    }

    /// Remote node id
    #[must_use]
    pub fn remote_id(&self) -> &str {
        match self {
            Self::Workspace(w) => &w.remote_id,
            Self::Circle(c) => &c.remote_id,
            Self::Role(r) => &r.remote_id,
        }
    }

    /// Parent remote id (workspaces have none)
    #[must_use]
    pub fn parent_remote_id(&self) -> Option<&str> {
        match self {
            Self::Workspace(_) => None,
            Self::Circle(c) => Some(&c.parent_remote_id),
            Self::Role(r) => Some(&r.parent_circle_remote_id),
        }
    }

    /// Platform object the record points at
    #[must_use]
    pub fn platform_id(&self) -> &PlatformId {
        match self {
            Self::Workspace(w) => &w.container_id,
            Self::Circle(c) => &c.channel_id,
            Self::Role(r) => &r.label_id,
        }
    }

    /// Display title (workspace display name for roots)
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Workspace(w) => &w.display_name,
            Self::Circle(c) => &c.title,
            Self::Role(r) => &r.title,
        }
    }

    /// Timestamp of the last sync that touched this record
    #[must_use]
    pub fn last_synced_at(&self) -> DateTime<Utc> {
        match self {
            Self::Workspace(w) => w.last_synced_at,
            Self::Circle(c) => c.last_synced_at,
            Self::Role(r) => r.last_synced_at,
        }
    }

    /// Replace the mutable fields with those of `incoming`.
    ///
    /// Identity (`remote_id`, `scope`) and parent linkage are kept. Returns
    /// `false` when the kinds differ and nothing was changed.
    pub fn merge_from(&mut self, incoming: MappingRecord) -> bool {
        match (self, incoming) {
            (Self::Workspace(cur), Self::Workspace(new)) => {
                cur.display_name = new.display_name;
                cur.channel_prefix = new.channel_prefix;
                cur.container_id = new.container_id;
                cur.last_synced_at = new.last_synced_at;
                true
            }
            (Self::Circle(cur), Self::Circle(new)) => {
                cur.title = new.title;
                cur.channel_id = new.channel_id;
                cur.last_synced_at = new.last_synced_at;
                true
            }
            (Self::Role(cur), Self::Role(new)) => {
                cur.title = new.title;
                cur.label_id = new.label_id;
                cur.last_synced_at = new.last_synced_at;
                true
            }
            _ => false,
        }
    }
}

impl From<WorkspaceMapping> for MappingRecord {
    fn from(m: WorkspaceMapping) -> Self {
        Self::Workspace(m)
    }
}

impl From<CircleMapping> for MappingRecord {
    fn from(m: CircleMapping) -> Self {
        Self::Circle(m)
    }
}

impl From<RoleMapping> for MappingRecord {
    fn from(m: RoleMapping) -> Self {
        Self::Role(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(parent: &str, title: &str, channel: &str) -> CircleMapping {
        CircleMapping {
            remote_id: "c1".to_string(),
            scope: Scope::new("g1"),
            title: title.to_string(),
            channel_id: PlatformId::new(channel),
            parent_remote_id: parent.to_string(),
            last_synced_at: Utc::now(),
        }
    }

    #[test]
    fn serialized_records_carry_kind_tag() {
        let record = MappingRecord::from(circle("w1", "Ops", "ch-1"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "circle");
        assert_eq!(json["parent_remote_id"], "w1");

        let back: MappingRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn merge_keeps_parent_linkage() {
        let mut current = MappingRecord::from(circle("w1", "Ops", "ch-1"));
        let incoming = MappingRecord::from(circle("elsewhere", "Operations", "ch-2"));

        assert!(current.merge_from(incoming));
        assert_eq!(current.parent_remote_id(), Some("w1"));
        assert_eq!(current.title(), "Operations");
        assert_eq!(current.platform_id().as_str(), "ch-2");
    }

    #[test]
    fn merge_rejects_other_kind() {
        let mut current = MappingRecord::from(circle("w1", "Ops", "ch-1"));
        let role = MappingRecord::Role(RoleMapping {
            remote_id: "c1".to_string(),
            scope: Scope::new("g1"),
            title: "Lead".to_string(),
            label_id: PlatformId::new("l1"),
            parent_circle_remote_id: "w1".to_string(),
            last_synced_at: Utc::now(),
        });

        assert!(!current.merge_from(role));
        assert_eq!(current.kind(), RecordKind::Circle);
    }

    #[test]
    fn scope_from_numeric_guild_id() {
        let scope = Scope::from(42_u64);
        assert_eq!(scope.as_str(), "42");
    }
}
