//! Remote graph types
//!
//! Defines:
//! - The credential pair sent with every request
//! - Node summaries returned by searches
//! - Label-filtered, paginated search queries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote-service credentials `{token, remote_user_id}`
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub user_id: String,
}

impl Credential {
    /// Create credential
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Summary of one remote node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub title: String,
    pub purpose: Option<String>,
    pub parent_id: Option<String>,
}

impl NodeSummary {
    /// Create summary without purpose or parent
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            purpose: None,
            parent_id: None,
        }
    }

    /// With purpose text
    #[inline]
    #[must_use]
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// With parent id
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Label a search is filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLabel {
    Circle,
    Role,
}

impl NodeLabel {
    /// Label text used in filter expressions
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circle => "circle",
            Self::Role => "role",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default page size for searches
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// One page of a label-filtered search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub label: NodeLabel,
    /// Context-relative depth passed through to the remote filter
    pub depth: Option<u32>,
    pub limit: usize,
    pub skip: usize,
    /// Node the search is scoped to
    pub context_id: Option<String>,
}

impl SearchQuery {
    /// First page of a search for `label`
    #[must_use]
    pub fn new(label: NodeLabel) -> Self {
        Self {
            label,
            depth: None,
            limit: DEFAULT_PAGE_SIZE,
            skip: 0,
            context_id: None,
        }
    }

    /// With depth filter
    #[inline]
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Scoped to a context node
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Starting offset
    #[inline]
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Filter expression, e.g. `label:circle depth:3`
    #[must_use]
    pub fn filter_expression(&self) -> String {
        match self.depth {
            Some(depth) => format!("label:{} depth:{depth}", self.label),
            None => format!("label:{}", self.label),
        }
    }
}
