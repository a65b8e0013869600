//! File-backed store tests
//!
//! Exercise persistence across reopen, scope isolation and the temp-file flush.

use chrono::Utc;
use nsync_store::{
    CircleMapping, CredentialRecord, CredentialStore, JsonMappingStore, MappingRecord,
    MappingStore, PlatformId, RecordKind, Scope, StoreError, WorkspaceMapping,
};
use pretty_assertions::assert_eq;

fn workspace(scope: &Scope) -> MappingRecord {
    MappingRecord::Workspace(WorkspaceMapping {
        remote_id: "W1".to_string(),
        scope: scope.clone(),
        display_name: "Acme".to_string(),
        channel_prefix: Some("acme".to_string()),
        container_id: PlatformId::new("cat-1"),
        last_synced_at: Utc::now(),
    })
}

fn circle(scope: &Scope, id: &str, parent: &str) -> MappingRecord {
    MappingRecord::Circle(CircleMapping {
        remote_id: id.to_string(),
        scope: scope.clone(),
        title: "Ops".to_string(),
        channel_id: PlatformId::new(format!("ch-{id}")),
        parent_remote_id: parent.to_string(),
        last_synced_at: Utc::now(),
    })
}

#[tokio::test]
async fn flushed_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let scope = Scope::new("guild-1");

    let store = JsonMappingStore::open(&path).await.unwrap();
    store.upsert(workspace(&scope)).await.unwrap();
    store.upsert(circle(&scope, "C1", "W1")).await.unwrap();
    store.flush().await.unwrap();
    drop(store);

    let reopened = JsonMappingStore::open(&path).await.unwrap();
    let records = reopened.records(&scope).await.unwrap();
    assert_eq!(records.len(), 2);

    let roots = reopened.find_roots(&scope).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].channel_prefix.as_deref(), Some("acme"));

    assert!(!dir.path().join("db.json.tmp").exists());
}

#[tokio::test]
async fn unflushed_writes_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let scope = Scope::new("guild-1");

    let store = JsonMappingStore::open(&path).await.unwrap();
    store.upsert(workspace(&scope)).await.unwrap();
    drop(store);

    let reopened = JsonMappingStore::open(&path).await.unwrap();
    assert!(reopened.records(&scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn scopes_do_not_leak() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonMappingStore::open(dir.path().join("db.json")).await.unwrap();
    let a = Scope::new("a");
    let b = Scope::new("b");

    store.upsert(workspace(&a)).await.unwrap();
    store.upsert(circle(&a, "C1", "W1")).await.unwrap();

    assert!(store.find(&b, RecordKind::Workspace, "W1").await.unwrap().is_none());
    assert!(store
        .find_by_parent(&b, RecordKind::Circle, "W1")
        .await
        .unwrap()
        .is_empty());

    assert!(!store.remove(&b, RecordKind::Circle, "C1").await.unwrap());
    assert!(store.find(&a, RecordKind::Circle, "C1").await.unwrap().is_some());
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let err = JsonMappingStore::open(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::Serialize { .. }));
}

#[tokio::test]
async fn credentials_persist_and_detect_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let store = CredentialStore::open(&path).await.unwrap();
    store
        .upsert(CredentialRecord::new("discord-1", "remote-1", "token-1"))
        .await
        .unwrap();
    drop(store);

    let reopened = CredentialStore::open(&path).await.unwrap();
    let record = reopened.lookup("discord-1").unwrap().unwrap();
    assert_eq!(record.remote_user_id, "remote-1");

    let duplicated = r#"{"credentials":[
        {"discord_identity":"d","remote_user_id":"r","auth_token":"a"},
        {"discord_identity":"d","remote_user_id":"r","auth_token":"b"}
    ]}"#;
    std::fs::write(&path, duplicated).unwrap();
    let corrupted = CredentialStore::open(&path).await.unwrap();
    assert!(corrupted.lookup("d").unwrap_err().is_consistency_violation());
}
