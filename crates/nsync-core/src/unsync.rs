//! Unsync algorithm
//!
//! Tears down what a sync created, walking the mapping store rather than the
//! remote graph. Every role and circle record linked to the workspace is
//! removed together with its platform object, then the anchor channel, the
//! container and finally the workspace record itself.
//!
//! A circle's record outlives its subtree, so a teardown that fails partway
//! can be rerun and still reach every remaining descendant.
//!
//! The remote side is not notified.

use crate::error::SyncError;
use crate::sync::SyncEngine;
use nsync_store::{MappingRecord, RecordKind, Scope};
use std::time::Instant;

/// Outcome of one unsync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsyncReport {
    pub root_id: String,
    pub channels_deleted: usize,
    pub labels_deleted: usize,
    pub containers_deleted: usize,
    pub records_removed: usize,
    /// Platform objects already gone when their deletion was attempted
    pub objects_missing: usize,
    pub execution_time_ms: u64,
}

enum Teardown {
    /// Remove role records and schedule circle records under a parent
    Children(String),
    /// Delete one circle's channel, then tear down its descendants
    Circle(MappingRecord),
    /// Remove a circle record once its descendants are gone
    CircleRecord(String),
}

impl SyncEngine {
    /// Remove every object and record created by syncing `root_id`
    ///
    /// # Errors
    /// `NotFound` if `scope` has no workspace record for `root_id`; platform
    /// and store failures abort with the teardown partially applied.
    #[tracing::instrument(skip(self), fields(scope = %scope))]
    pub async fn unsync_workspace(&self, scope: &Scope, root_id: &str) -> Result<UnsyncReport, SyncError> {
        let _guard = self.locks.acquire(scope).await;
        let start = Instant::now();

        let Some(MappingRecord::Workspace(workspace)) =
            self.store.find(scope, RecordKind::Workspace, root_id).await?
        else {
            return Err(SyncError::not_found(scope, RecordKind::Workspace, root_id));
        };
        tracing::info!(display_name = %workspace.display_name, "starting workspace unsync");

        let mut report = UnsyncReport {
            root_id: root_id.to_string(),
            ..UnsyncReport::default()
        };

        let mut stack = vec![Teardown::Children(root_id.to_string())];
        while let Some(step) = stack.pop() {
            match step {
                Teardown::Children(parent) => {
                    self.remove_roles(scope, &parent, &mut report).await?;
                    let circles = self
                        .store
                        .find_by_parent(scope, RecordKind::Circle, &parent)
                        .await?;
                    stack.extend(circles.into_iter().rev().map(Teardown::Circle));
                }
                Teardown::Circle(record) => {
                    let deleted = self.platform.delete_channel(record.platform_id()).await?;
                    count_delete(deleted, &mut report.channels_deleted, &mut report.objects_missing);
                    let remote_id = record.remote_id().to_string();
                    stack.push(Teardown::CircleRecord(remote_id.clone()));
                    stack.push(Teardown::Children(remote_id));
                }
                Teardown::CircleRecord(remote_id) => {
                    self.remove_record(scope, RecordKind::Circle, &remote_id, &mut report)
                        .await?;
                    tracing::debug!(circle = %remote_id, "removed circle");
                }
            }
        }

        if let Some(anchor) = self
            .platform
            .find_channel(scope, &workspace.container_id, &self.config.anchor_channel)
            .await?
        {
            let deleted = self.platform.delete_channel(&anchor).await?;
            count_delete(deleted, &mut report.channels_deleted, &mut report.objects_missing);
        }
        let deleted = self.platform.delete_container(&workspace.container_id).await?;
        count_delete(deleted, &mut report.containers_deleted, &mut report.objects_missing);

        self.remove_record(scope, RecordKind::Workspace, root_id, &mut report)
            .await?;

        report.execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            records = report.records_removed,
            missing = report.objects_missing,
            "workspace unsync completed"
        );
        Ok(report)
    }

    async fn remove_roles(&self, scope: &Scope, parent: &str, report: &mut UnsyncReport) -> Result<(), SyncError> {
        let roles = self.store.find_by_parent(scope, RecordKind::Role, parent).await?;
        for role in roles {
            let deleted = self.platform.delete_label(role.platform_id()).await?;
            count_delete(deleted, &mut report.labels_deleted, &mut report.objects_missing);
            self.remove_record(scope, RecordKind::Role, role.remote_id(), report)
                .await?;
        }
        Ok(())
    }

    async fn remove_record(
        &self,
        scope: &Scope,
        kind: RecordKind,
        remote_id: &str,
        report: &mut UnsyncReport,
    ) -> Result<(), SyncError> {
        if self.store.remove(scope, kind, remote_id).await? {
            report.records_removed += 1;
        }
        self.store.flush().await?;
        Ok(())
    }
}

fn count_delete(deleted: bool, counter: &mut usize, missing: &mut usize) {
    if deleted {
        *counter += 1;
    } else {
        *missing += 1;
    }
}
