//! nsync Core - hierarchical workspace synchronization
//!
//! Mirrors a remote workspace → circle → role graph into a chat platform:
//! - One container per workspace, one channel per circle, one label per role
//! - Scoped mapping records so repeated runs converge instead of duplicating
//! - Teardown driven by the mapping records alone
//! - Per-scope serialization of runs
//!
//! # Example
//!
//! ```rust,ignore
//! use nsync_core::prelude::*;
//!
//! let engine = SyncEngine::new(remote, platform, store, SyncConfig::new());
//! let request = SyncRequest::new("guild-1", "W1", "Acme");
//! let report = engine.sync_workspace(&credential, &request).await?;
//!
//! println!("visited {} circles", report.circles_visited);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod naming;
pub mod platform;
pub mod scope_lock;
pub mod sync;
pub mod unsync;

pub use config::SyncConfig;
pub use error::{ConfigError, PlatformError, SyncError};
pub use platform::{MemoryPlatform, ObjectKind, PlatformAdapter, PlatformObject, PlatformOp};
pub use scope_lock::{ScopeGuard, ScopeLocks};
pub use sync::{SyncEngine, SyncReport, SyncRequest};
pub use unsync::UnsyncReport;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the sync engine
    pub use crate::{
        MemoryPlatform, PlatformAdapter, SyncConfig, SyncEngine, SyncError, SyncReport,
        SyncRequest, UnsyncReport,
    };
    pub use nsync_remote::{Credential, RemoteGraph};
    pub use nsync_store::{MappingStore, Scope};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
