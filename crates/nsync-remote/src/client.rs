//! Remote graph client
//!
//! [`RemoteGraph`] is the contract the sync engine depends on;
//! [`HttpRemoteGraph`] speaks it over HTTP.
//!
//! Requests authenticate with the `X-Auth-Token` / `X-User-Id` header pair.
//! Successful responses wrap their payload in a `{status, data}` envelope.
//! A 401 is reported as [`RemoteError::Unauthorized`] and never retried.

use crate::error::RemoteError;
use crate::types::{Credential, NodeSummary, SearchQuery};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Default API base
pub const DEFAULT_API_BASE: &str = "https://staging.nestr.io/api";

/// Field carrying a circle's purpose when it is not a top-level attribute
const PURPOSE_FIELD: &str = "circle.purpose";

/// Field set on a workspace once it is mirrored
const SYNCED_FIELD: &str = "discord.synced";

/// Scoped, paginated access to the remote organization graph
///
/// Implementations return one page per call; callers page by increasing
/// `skip` until an empty page comes back.
#[async_trait]
pub trait RemoteGraph: Send + Sync {
    /// One page of nodes matching `query`
    async fn search(
        &self,
        credential: &Credential,
        query: &SearchQuery,
    ) -> Result<Vec<NodeSummary>, RemoteError>;

    /// One page of workspaces visible to the credential
    async fn workspaces(
        &self,
        credential: &Credential,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<NodeSummary>, RemoteError>;

    /// Tell the remote side that `root_id` is now mirrored
    async fn mark_synced(&self, credential: &Credential, root_id: &str) -> Result<(), RemoteError>;

    /// Create a to-do item in the user's inbox
    async fn create_inbox_item(
        &self,
        credential: &Credential,
        title: &str,
        description: Option<&str>,
    ) -> Result<NodeSummary, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(rename = "parentId", default)]
    parent_id: Option<String>,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl From<WireNode> for NodeSummary {
    fn from(node: WireNode) -> Self {
        let purpose = node.purpose.filter(|p| !p.is_empty()).or_else(|| {
            node.fields
                .get(PURPOSE_FIELD)
                .and_then(|v| v.as_str())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        });
        Self {
            id: node.id,
            title: node.title,
            purpose,
            parent_id: node.parent_id,
        }
    }
}

/// HTTP implementation of [`RemoteGraph`]
#[derive(Debug, Clone)]
pub struct HttpRemoteGraph {
    http: reqwest::Client,
    api_base: String,
}

impl HttpRemoteGraph {
    /// Create client for `api_base`
    ///
    /// # Errors
    /// `Config` if the HTTP client cannot be built
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// API base without trailing slash
    #[inline]
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// URL of one node, with `id` escaped as a single path segment
    fn node_url(&self, id: &str) -> Result<reqwest::Url, RemoteError> {
        let mut url = reqwest::Url::parse(&self.url("n"))
            .map_err(|e| RemoteError::Config(format!("invalid api base {}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Config(format!("api base {} cannot carry a path", self.api_base)))?
            .push(id);
        Ok(url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder, credential: &Credential) -> reqwest::RequestBuilder {
        builder
            .header("X-Auth-Token", &credential.token)
            .header("X-User-Id", &credential.user_id)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, RemoteError> {
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!(operation, "remote rejected credentials");
            return Err(RemoteError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::unavailable(
                Some(status.as_u16()),
                format!("{operation} failed: {}", truncate(&body, 400)),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(format!("{operation}: {e}")))?;

        match envelope.status.as_deref() {
            None | Some("success") => Ok(envelope.data),
            Some(other) => Err(RemoteError::unavailable(
                Some(status.as_u16()),
                format!(
                    "{operation} returned status '{other}': {}",
                    envelope.message.unwrap_or_default()
                ),
            )),
        }
    }
}

#[async_trait]
impl RemoteGraph for HttpRemoteGraph {
    async fn search(
        &self,
        credential: &Credential,
        query: &SearchQuery,
    ) -> Result<Vec<NodeSummary>, RemoteError> {
        let mut params = vec![
            ("search", query.filter_expression()),
            ("limit", query.limit.to_string()),
            ("skip", query.skip.to_string()),
        ];
        if let Some(context) = &query.context_id {
            params.push(("contextId", context.clone()));
        }

        tracing::debug!(
            filter = %query.filter_expression(),
            context = query.context_id.as_deref().unwrap_or(""),
            skip = query.skip,
            "remote search"
        );

        let request = self.authed(self.http.get(self.url("search")).query(&params), credential);
        let nodes: Option<Vec<WireNode>> = self.send("search", request).await?;
        Ok(nodes.unwrap_or_default().into_iter().map(NodeSummary::from).collect())
    }

    async fn workspaces(
        &self,
        credential: &Credential,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<NodeSummary>, RemoteError> {
        let params = [("limit", limit.to_string()), ("skip", skip.to_string())];
        let request = self.authed(self.http.get(self.url("workspaces")).query(&params), credential);
        let nodes: Option<Vec<WireNode>> = self.send("workspaces", request).await?;
        Ok(nodes.unwrap_or_default().into_iter().map(NodeSummary::from).collect())
    }

    async fn mark_synced(&self, credential: &Credential, root_id: &str) -> Result<(), RemoteError> {
        let mut fields = serde_json::Map::new();
        fields.insert(SYNCED_FIELD.to_string(), serde_json::Value::Bool(true));
        let body = serde_json::json!({ "fields": fields });
        let request = self.authed(self.http.patch(self.node_url(root_id)?).json(&body), credential);
        let _: Option<serde_json::Value> = self.send("mark synced", request).await?;
        Ok(())
    }

    async fn create_inbox_item(
        &self,
        credential: &Credential,
        title: &str,
        description: Option<&str>,
    ) -> Result<NodeSummary, RemoteError> {
        let form = [
            ("parentId", "inbox"),
            ("title", title),
            ("description", description.unwrap_or("")),
        ];
        let request = self.authed(self.http.post(self.url("n/inbox")).form(&form), credential);
        let node: Option<WireNode> = self.send("create inbox item", request).await?;
        node.map(NodeSummary::from)
            .ok_or_else(|| RemoteError::Decode("create inbox item: empty response".to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
