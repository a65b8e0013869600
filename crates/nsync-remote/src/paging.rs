//! Pagination helpers
//!
//! The client never pages on its own. These helpers loop by increasing `skip`
//! by the number of items already received until an empty page comes back.

use crate::client::RemoteGraph;
use crate::error::RemoteError;
use crate::types::{Credential, NodeSummary, SearchQuery};

/// Collect every page of `query`, starting at its `skip`
///
/// # Errors
/// The first error returned by any page; nothing collected so far is returned
pub async fn search_all<R>(
    remote: &R,
    credential: &Credential,
    query: SearchQuery,
) -> Result<Vec<NodeSummary>, RemoteError>
where
    R: RemoteGraph + ?Sized,
{
    let limit = query.limit.max(1);
    let mut query = query.with_limit(limit);
    let mut nodes = Vec::new();
    loop {
        let page = remote.search(credential, &query).await?;
        if page.is_empty() {
            break;
        }
        query.skip += page.len();
        nodes.extend(page);
    }
    Ok(nodes)
}

/// Collect every workspace visible to `credential`
///
/// # Errors
/// The first error returned by any page
pub async fn workspaces_all<R>(
    remote: &R,
    credential: &Credential,
    page_size: usize,
) -> Result<Vec<NodeSummary>, RemoteError>
where
    R: RemoteGraph + ?Sized,
{
    let page_size = page_size.max(1);
    let mut skip = 0;
    let mut nodes = Vec::new();
    loop {
        let page = remote.workspaces(credential, page_size, skip).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();
        nodes.extend(page);
    }
    Ok(nodes)
}
