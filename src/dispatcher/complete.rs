//! Complete handler: handle reassignment, plain completion and seed termination.

use crate::engine::DownloadSnapshot;
use crate::error::Result;
use crate::messaging::{SELECTION_PAUSED_TEXT, selection_controls};
use crate::policy::SeedStats;
use crate::registry::TaskRecord;
use crate::types::{Event, Gid, LifecycleState, NotificationKind};
use chrono::{DateTime, Utc};

use super::Dispatcher;

impl Dispatcher {
    /// Handle a transfer completion
    pub(crate) async fn on_download_complete(&self, gid: &Gid) -> Result<()> {
        let Some(snapshot) = self.fetch_snapshot(gid).await else {
            return Ok(());
        };
        if snapshot.opted_out() {
            tracing::debug!(gid = %gid, "transfer not followed, ignoring completion");
            return Ok(());
        }

        if let Some(next) = snapshot.successor() {
            tracing::info!(from = %gid, to = %next, "gid changed");
            self.offer_selection(gid, next).await;
        } else if snapshot.is_torrent {
            if let Some(record) = self.lookup_task(gid, NotificationKind::Complete).await
                && record.is_seeding()
            {
                tracing::info!(gid = %gid, name = %snapshot.name, "cancelling seed on completion");
                self.finish_seeding(&record, gid, &snapshot, record.seeding_started_at)
                    .await;
            }
        } else {
            tracing::info!(gid = %gid, name = %snapshot.name, "download complete");
            if let Some(record) = self.lookup_task(gid, NotificationKind::Complete).await {
                self.complete_download(&record, gid).await;
                if let Err(e) = self
                    .registry
                    .transition(record.task_id, LifecycleState::Completed)
                    .await
                {
                    tracing::debug!(task_id = %record.task_id, error = %e, "task not marked completed");
                }
                self.remove_transfer(gid).await;
                self.registry.remove(record.task_id).await;
            }
        }
        Ok(())
    }

    /// Track the successor handle and, if requested, pause it for file selection
    async fn offer_selection(&self, from: &Gid, next: &Gid) {
        self.follow_handle(from, next).await;

        let Some(record) = self.lookup_task(next, NotificationKind::Complete).await else {
            return;
        };
        let ctx = record.listener.context();
        let Some(base_url) = self.config.selection_base_url() else {
            return;
        };
        if !ctx.select {
            return;
        }

        if !record.queued
            && let Err(e) = self.collaborators.engine.force_pause(next).await
        {
            tracing::error!(gid = %next, error = %e, "failed to pause transfer for selection");
        }
        let controls = selection_controls(base_url, next, self.config.selection.web_pincode);
        if let Err(e) = self
            .collaborators
            .messenger
            .send_message(&ctx.origin, SELECTION_PAUSED_TEXT, Some(controls))
            .await
        {
            tracing::warn!(gid = %next, error = %e, "failed to send selection controls");
        }
        self.emit_event(Event::AwaitingSelection {
            task_id: record.task_id,
            gid: next.clone(),
        });
    }

    /// Deliver the download success to the task's listener
    pub(crate) async fn complete_download(&self, record: &TaskRecord, gid: &Gid) {
        if record.listener.download_complete().await {
            self.emit_event(Event::DownloadCompleted {
                task_id: record.task_id,
                gid: gid.clone(),
            });
        }
    }

    /// Report seed termination, remove the transfer and drop the task record
    pub(crate) async fn finish_seeding(
        &self,
        record: &TaskRecord,
        gid: &Gid,
        snapshot: &DownloadSnapshot,
        started_at: Option<DateTime<Utc>>,
    ) {
        let stats = SeedStats::new(snapshot, started_at, Utc::now());
        if record.listener.upload_error(&stats.message()).await {
            self.emit_event(Event::SeedingStopped {
                task_id: record.task_id,
                gid: gid.clone(),
                ratio: stats.ratio,
                seeding_secs: stats.seeding_secs,
            });
        }
        self.remove_transfer(gid).await;
        self.registry.remove(record.task_id).await;
    }
}
