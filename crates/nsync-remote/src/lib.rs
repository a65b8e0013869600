//! nsync Remote - organization graph client
//!
//! Queries the remote service that owns the workspace → circle → role graph:
//! - [`RemoteGraph`]: the contract consumed by the sync engine
//! - [`HttpRemoteGraph`]: header-authenticated HTTP implementation
//! - [`search_all`] / [`workspaces_all`]: skip-based pagination loops
//!
//! Authentication failures surface as [`RemoteError::Unauthorized`] and are
//! never retried here.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod error;
pub mod paging;
pub mod types;

pub use client::{HttpRemoteGraph, RemoteGraph, DEFAULT_API_BASE};
pub use error::RemoteError;
pub use paging::{search_all, workspaces_all};
pub use types::{Credential, NodeLabel, NodeSummary, SearchQuery, DEFAULT_PAGE_SIZE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
