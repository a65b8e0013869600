//! nsync Store - scoped mapping records and credentials
//!
//! Persists the link between remote organization nodes and the platform
//! objects created for them:
//! - Typed mapping records (workspace, circle, role) keyed per scope
//! - In-memory and JSON-file backed [`MappingStore`] implementations
//! - The identity → credential collection read by the sync engine
//!
//! # Example
//!
//! ```rust,ignore
//! use nsync_store::{JsonMappingStore, MappingStore, Scope};
//!
//! let store = JsonMappingStore::open("nsync-db.json").await?;
//! let roots = store.find_roots(&Scope::new("1234")).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod credential;
pub mod error;
pub mod mapping;
pub mod record;

pub use credential::{CredentialRecord, CredentialStore};
pub use error::StoreError;
pub use mapping::{JsonMappingStore, MappingStore, MemoryMappingStore, RecordIndex, UpsertOutcome};
pub use record::{
    CircleMapping, MappingRecord, PlatformId, RecordKind, RoleMapping, Scope, WorkspaceMapping,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
