//! Sync configuration
//!
//! Loaded from TOML, then overridden from the environment:
//! - `NESTR_API_URL` replaces `api_base_url`
//! - `NESTR_TOKEN` + `NESTR_USERID` form a fallback service credential

use crate::error::ConfigError;
use nsync_remote::{Credential, DEFAULT_API_BASE, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote API base URL
    pub api_base_url: String,
    /// Page size for remote searches
    pub page_size: usize,
    /// Depth passed to the remote query for the root circle
    pub initial_depth: u32,
    /// Channel created inside every workspace container
    pub anchor_channel: String,
    /// Appended to the workspace display name to name its container
    pub container_suffix: String,
    /// Maximum circles visited in one run
    pub max_nodes: Option<usize>,
    /// Maximum depth value passed to the remote query
    pub max_depth: Option<u32>,
    /// Whether a completed sync notifies the remote side
    pub mark_synced: bool,
    /// Seconds allowed for interactive workspace selection
    pub selection_timeout_secs: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Mapping store file
    pub store_path: PathBuf,
    /// Credential store file
    pub credentials_path: PathBuf,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text; absent keys keep their defaults
    ///
    /// # Errors
    /// `Parse` for malformed TOML, `Invalid` for out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`Self::from_toml_str`]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`
    #[must_use]
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("NESTR_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        self
    }

    /// Service credential from `NESTR_TOKEN` / `NESTR_USERID`
    #[must_use]
    pub fn service_credential(lookup: impl Fn(&str) -> Option<String>) -> Option<Credential> {
        let token = lookup("NESTR_TOKEN").filter(|v| !v.is_empty())?;
        let user = lookup("NESTR_USERID").filter(|v| !v.is_empty())?;
        Some(Credential::new(token, user))
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `Invalid` naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.anchor_channel.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "anchor_channel",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(max_depth) = self.max_depth {
            if max_depth < self.initial_depth {
                return Err(ConfigError::Invalid {
                    field: "max_depth",
                    reason: format!("{max_depth} is below initial_depth {}", self.initial_depth),
                });
            }
        }
        Ok(())
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// With root query depth
    #[inline]
    #[must_use]
    pub fn with_initial_depth(mut self, initial_depth: u32) -> Self {
        self.initial_depth = initial_depth;
        self
    }

    /// With node limit
    #[inline]
    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    /// With depth limit
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// With or without the completion notification
    #[inline]
    #[must_use]
    pub fn with_mark_synced(mut self, mark_synced: bool) -> Self {
        self.mark_synced = mark_synced;
        self
    }

    /// With selection timeout
    #[inline]
    #[must_use]
    pub fn with_selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout_secs = timeout.as_secs();
        self
    }

    /// Selection timeout as a duration
    #[inline]
    #[must_use]
    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }

    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            initial_depth: 2,
            anchor_channel: "anchor-circle".to_string(),
            container_suffix: "circles".to_string(),
            max_nodes: None,
            max_depth: None,
            mark_synced: true,
            selection_timeout_secs: 120,
            request_timeout_secs: 30,
            store_path: PathBuf::from("nsync-db.json"),
            credentials_path: PathBuf::from("nsync-credentials.json"),
        }
    }
}
