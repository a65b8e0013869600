//! Subcommand implementations
//!
//! Each command writes its human-readable result to `out`; logs go through
//! `tracing` to stderr.

use crate::cli::{AuthArgs, Command};
use anyhow::{bail, Context, Result};
use nsync_core::{MemoryPlatform, PlatformOp, SyncConfig, SyncEngine, SyncRequest};
use nsync_remote::{Credential, HttpRemoteGraph, NodeLabel, RemoteGraph, SearchQuery};
use nsync_store::{
    CredentialRecord, CredentialStore, JsonMappingStore, MappingStore, MemoryMappingStore, Scope,
};
use std::io::Write;
use std::sync::Arc;

/// Environment lookup, injectable for tests
pub(crate) type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Run one subcommand
pub(crate) async fn execute(
    command: Command,
    config: &SyncConfig,
    env: EnvLookup<'_>,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Login {
            identity,
            user_id,
            token,
        } => login(config, identity, user_id, token, out).await,
        Command::Workspaces(auth) => workspaces(config, &auth, env, out).await,
        Command::Search {
            auth,
            label,
            context,
            depth,
        } => search(config, &auth, env, label.into(), context, depth, out).await,
        Command::Inbox {
            auth,
            title,
            description,
        } => inbox(config, &auth, env, &title, description.as_deref(), out).await,
        Command::Plan {
            auth,
            scope,
            workspace,
            name,
            prefix,
        } => {
            let mut request = SyncRequest::new(scope, workspace, name);
            if let Some(prefix) = prefix {
                request = request.with_prefix(prefix);
            }
            plan(config, &auth, env, &request, out).await
        }
        Command::Mappings { scope } => mappings(config, &Scope::new(scope), out).await,
    }
}

async fn login(config: &SyncConfig, identity: String, user_id: String, token: String, out: &mut dyn Write) -> Result<()> {
    let store = CredentialStore::open(&config.credentials_path)
        .await
        .with_context(|| format!("opening credential store {}", config.credentials_path.display()))?;
    store
        .upsert(CredentialRecord::new(identity.clone(), user_id, token))
        .await
        .context("storing credential")?;
    tracing::info!(%identity, "credential stored");
    writeln!(out, "stored credential for {identity}")?;
    Ok(())
}

async fn workspaces(config: &SyncConfig, auth: &AuthArgs, env: EnvLookup<'_>, out: &mut dyn Write) -> Result<()> {
    let credential = resolve_credential(config, auth, env).await?;
    let engine = SyncEngine::new(
        Arc::new(remote_client(config)?),
        Arc::new(MemoryPlatform::new()),
        Arc::new(MemoryMappingStore::new()),
        config.clone(),
    );
    for workspace in engine.list_workspaces(&credential).await? {
        writeln!(out, "{}\t{}", workspace.id, workspace.title)?;
    }
    Ok(())
}

async fn search(
    config: &SyncConfig,
    auth: &AuthArgs,
    env: EnvLookup<'_>,
    label: NodeLabel,
    context: String,
    depth: Option<u32>,
    out: &mut dyn Write,
) -> Result<()> {
    let credential = resolve_credential(config, auth, env).await?;
    let remote = remote_client(config)?;
    let mut query = SearchQuery::new(label)
        .with_context(context)
        .with_limit(config.page_size);
    if let Some(depth) = depth {
        query = query.with_depth(depth);
    }
    let nodes = nsync_remote::search_all(&remote, &credential, query).await?;
    for node in nodes {
        writeln!(out, "{}\t{}", node.id, node.title)?;
    }
    Ok(())
}

async fn inbox(
    config: &SyncConfig,
    auth: &AuthArgs,
    env: EnvLookup<'_>,
    title: &str,
    description: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    let credential = resolve_credential(config, auth, env).await?;
    let item = remote_client(config)?
        .create_inbox_item(&credential, title, description)
        .await
        .context("creating inbox item")?;
    writeln!(out, "created inbox item {}\t{}", item.id, item.title)?;
    Ok(())
}

/// Sync into an in-memory platform seeded with a copy of the mapping store
async fn plan(
    config: &SyncConfig,
    auth: &AuthArgs,
    env: EnvLookup<'_>,
    request: &SyncRequest,
    out: &mut dyn Write,
) -> Result<()> {
    let credential = resolve_credential(config, auth, env).await?;
    let persisted = JsonMappingStore::open(&config.store_path)
        .await
        .with_context(|| format!("opening mapping store {}", config.store_path.display()))?;

    let platform = Arc::new(MemoryPlatform::new());
    let engine = SyncEngine::new(
        Arc::new(remote_client(config)?),
        platform.clone(),
        Arc::new(MemoryMappingStore::with_index(persisted.snapshot())),
        config.clone().with_mark_synced(false),
    );
    let report = engine.sync_workspace(&credential, request).await?;

    for op in platform.operations() {
        if let PlatformOp::Created { kind, name } = op {
            writeln!(out, "would create {kind} {name}")?;
        }
    }
    writeln!(
        out,
        "{} objects, {} circles, {} new and {} existing mappings",
        report.objects_created(),
        report.circles_visited,
        report.records_inserted,
        report.records_updated
    )?;
    Ok(())
}

async fn mappings(config: &SyncConfig, scope: &Scope, out: &mut dyn Write) -> Result<()> {
    let store = JsonMappingStore::open(&config.store_path)
        .await
        .with_context(|| format!("opening mapping store {}", config.store_path.display()))?;
    for record in store.records(scope).await? {
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }
    Ok(())
}

fn remote_client(config: &SyncConfig) -> Result<HttpRemoteGraph> {
    HttpRemoteGraph::new(&config.api_base_url, config.request_timeout())
        .with_context(|| format!("building client for {}", config.api_base_url))
}

/// Credential for `--identity`, or the service credential from the environment
async fn resolve_credential(config: &SyncConfig, auth: &AuthArgs, env: EnvLookup<'_>) -> Result<Credential> {
    if let Some(identity) = &auth.identity {
        let store = CredentialStore::open(&config.credentials_path)
            .await
            .with_context(|| format!("opening credential store {}", config.credentials_path.display()))?;
        let Some(record) = store.lookup(identity)? else {
            bail!("no credential stored for {identity}; run `nsync login` first");
        };
        return Ok(Credential::new(record.auth_token, record.remote_user_id));
    }
    SyncConfig::service_credential(env)
        .context("no credential available: pass --identity or set NESTR_TOKEN and NESTR_USERID")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LabelArg;
    use nsync_store::{MappingRecord, PlatformId, WorkspaceMapping};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("NESTR_TOKEN", "service-token".to_string()),
            ("NESTR_USERID", "service-user".to_string()),
        ])
    }

    fn config_in(dir: &tempfile::TempDir, server: Option<&MockServer>) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.store_path = dir.path().join("db.json");
        config.credentials_path = dir.path().join("credentials.json");
        if let Some(server) = server {
            config.api_base_url = format!("{}/api", server.uri());
        }
        config
    }

    async fn run(command: Command, config: &SyncConfig, env: &HashMap<&'static str, String>) -> Result<String> {
        let lookup = |key: &str| env.get(key).cloned();
        let mut out = Vec::new();
        execute(command, config, &lookup, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    async fn empty_search(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success", "data": [] })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn login_makes_identity_usable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, None);

        let output = run(
            Command::Login {
                identity: "user#1".to_string(),
                user_id: "remote-1".to_string(),
                token: "secret".to_string(),
            },
            &config,
            &HashMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(output, "stored credential for user#1\n");

        let auth = AuthArgs {
            identity: Some("user#1".to_string()),
        };
        let lookup = |_: &str| None::<String>;
        let credential = resolve_credential(&config, &auth, &lookup).await.unwrap();
        assert_eq!(credential.user_id, "remote-1");
        assert_eq!(credential.token, "secret");
    }

    #[tokio::test]
    async fn unknown_identity_asks_for_login() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, None);
        let auth = AuthArgs {
            identity: Some("stranger".to_string()),
        };
        let lookup = |_: &str| None::<String>;

        let err = resolve_credential(&config, &auth, &lookup).await.unwrap_err();
        assert!(err.to_string().contains("nsync login"));
    }

    #[tokio::test]
    async fn service_credential_needs_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, None);
        let lookup = |_: &str| None::<String>;

        assert!(resolve_credential(&config, &AuthArgs::default(), &lookup).await.is_err());
    }

    #[tokio::test]
    async fn plan_lists_objects_without_persisting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(header("X-Auth-Token", "service-token"))
            .and(query_param("search", "label:circle depth:2"))
            .and(query_param("contextId", "W1"))
            .and(query_param("skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": [{ "_id": "C1", "title": "Ops", "parentId": "W1" }]
            })))
            .mount(&server)
            .await;
        empty_search(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, Some(&server));

        let output = run(
            Command::Plan {
                auth: AuthArgs::default(),
                scope: "g1".to_string(),
                workspace: "W1".to_string(),
                name: "Acme".to_string(),
                prefix: None,
            },
            &config,
            &service_env(),
        )
        .await
        .unwrap();

        assert_eq!(
            output,
            "would create container Acme circles\n\
             would create channel anchor-circle\n\
             would create channel ops-circle\n\
             3 objects, 2 circles, 2 new and 0 existing mappings\n"
        );
        assert!(!config.store_path.exists());
    }

    #[tokio::test]
    async fn plan_reports_expired_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, Some(&server));

        let err = run(
            Command::Plan {
                auth: AuthArgs::default(),
                scope: "g1".to_string(),
                workspace: "W1".to_string(),
                name: "Acme".to_string(),
                prefix: None,
            },
            &config,
            &service_env(),
        )
        .await
        .unwrap_err();

        let sync_err = err.downcast_ref::<nsync_core::SyncError>().unwrap();
        assert!(sync_err.is_reauth_required());
    }

    #[tokio::test]
    async fn search_pages_through_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("search", "label:role"))
            .and(query_param("skip", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": [{ "_id": "R1", "title": "Lead Link" }, { "_id": "R2", "title": "Scribe" }]
            })))
            .mount(&server)
            .await;
        empty_search(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, Some(&server));

        let output = run(
            Command::Search {
                auth: AuthArgs::default(),
                label: LabelArg::Role,
                context: "W1".to_string(),
                depth: None,
            },
            &config,
            &service_env(),
        )
        .await
        .unwrap();

        assert_eq!(output, "R1\tLead Link\nR2\tScribe\n");
    }

    #[tokio::test]
    async fn inbox_posts_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/n/inbox"))
            .and(body_string_contains("title=Fix+the+build"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": { "_id": "I1", "title": "Fix the build", "parentId": "inbox" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, Some(&server));

        let output = run(
            Command::Inbox {
                auth: AuthArgs::default(),
                title: "Fix the build".to_string(),
                description: None,
            },
            &config,
            &service_env(),
        )
        .await
        .unwrap();

        assert_eq!(output, "created inbox item I1\tFix the build\n");
    }

    #[tokio::test]
    async fn mappings_prints_scope_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, None);

        let store = JsonMappingStore::open(&config.store_path).await.unwrap();
        store
            .upsert(MappingRecord::Workspace(WorkspaceMapping {
                remote_id: "W1".to_string(),
                scope: Scope::new("g1"),
                display_name: "Acme".to_string(),
                channel_prefix: None,
                container_id: PlatformId::new("container-1"),
                last_synced_at: chrono::Utc::now(),
            }))
            .await
            .unwrap();
        store.flush().await.unwrap();

        let output = run(
            Command::Mappings {
                scope: "g1".to_string(),
            },
            &config,
            &HashMap::new(),
        )
        .await
        .unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["kind"], "workspace");
        assert_eq!(line["remote_id"], "W1");

        let other = run(
            Command::Mappings {
                scope: "g2".to_string(),
            },
            &config,
            &HashMap::new(),
        )
        .await
        .unwrap();
        assert!(other.is_empty());
    }
}
