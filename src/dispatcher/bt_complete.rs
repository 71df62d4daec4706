//! BitTorrent-complete handler: selection cleanup and the seed-or-stop decision.

use crate::engine::{DownloadSnapshot, TransferOptions};
use crate::error::Result;
use crate::policy::SeedDecision;
use crate::types::{Event, Gid, LifecycleState, NotificationKind};
use chrono::Utc;

use super::Dispatcher;

impl Dispatcher {
    /// Handle a torrent whose data transfer finished
    pub(crate) async fn on_bt_download_complete(&self, gid: &Gid) -> Result<()> {
        let seed_started_at = Utc::now();
        tokio::time::sleep(self.config.timing.bt_settle_delay).await;

        let Some(snapshot) = self.fetch_snapshot(gid).await else {
            return Ok(());
        };
        if snapshot.opted_out() {
            tracing::debug!(gid = %gid, "transfer not followed, ignoring bt completion");
            return Ok(());
        }
        tracing::info!(gid = %gid, name = %snapshot.name, "torrent download complete");

        let Some(record) = self.lookup_task(gid, NotificationKind::BtComplete).await else {
            tracing::warn!(gid = %gid, "no task for completed torrent");
            return Ok(());
        };
        let ctx = record.listener.context().clone();

        if ctx.select {
            self.discard_unselected(gid, &snapshot).await;
        }

        let decision = SeedDecision::for_listener(&ctx);
        match decision {
            SeedDecision::Seed => {
                if let Err(e) = self
                    .collaborators
                    .engine
                    .set_options(gid, &TransferOptions::unlimited_upload())
                    .await
                {
                    tracing::error!(
                        gid = %gid,
                        error = %e,
                        "cannot seed: global seed-time is zero and this torrent has no seed time of its own"
                    );
                }
            }
            SeedDecision::Stop => {
                if let Err(e) = self.collaborators.engine.force_pause(gid).await {
                    tracing::error!(gid = %gid, error = %e, "failed to pause completed torrent");
                }
            }
        }

        self.complete_download(&record, gid).await;
        if let Err(e) = self
            .registry
            .transition(record.task_id, LifecycleState::Completed)
            .await
        {
            tracing::debug!(task_id = %record.task_id, error = %e, "task not marked completed");
        }

        if decision == SeedDecision::Stop {
            self.remove_transfer(gid).await;
            self.registry.remove(record.task_id).await;
            return Ok(());
        }

        let Some(live) = self.fetch_snapshot(gid).await else {
            tracing::warn!(gid = %gid, task_id = %record.task_id, "transfer vanished before seeding, dropping task");
            self.registry.remove(record.task_id).await;
            return Ok(());
        };
        if live.is_complete() {
            // seed target already met
            if self.registry.contains(record.task_id).await {
                tracing::info!(gid = %gid, name = %live.name, "cancelling seed");
                self.finish_seeding(&record, gid, &live, Some(seed_started_at))
                    .await;
            }
            return Ok(());
        }

        match self
            .registry
            .begin_seeding(record.task_id, gid, seed_started_at)
            .await
        {
            Ok(true) => {
                tracing::info!(gid = %gid, name = %snapshot.name, "seeding started");
                self.emit_event(Event::SeedingStarted {
                    task_id: record.task_id,
                    gid: gid.clone(),
                });
                if let Err(e) = self.collaborators.messenger.update_all_messages().await {
                    tracing::warn!(gid = %gid, error = %e, "failed to refresh status messages");
                }
            }
            Ok(false) => {
                tracing::info!(gid = %gid, "task cancelled before seeding, removing transfer");
                self.remove_transfer(gid).await;
            }
            Err(e) => {
                tracing::warn!(gid = %gid, error = %e, "task cannot seed, removing transfer");
                self.remove_transfer(gid).await;
                self.registry.remove(record.task_id).await;
            }
        }
        Ok(())
    }

    /// Delete deselected files and clean partial artifacts out of the output directory
    async fn discard_unselected(&self, gid: &Gid, snapshot: &DownloadSnapshot) {
        let filesystem = &self.collaborators.filesystem;
        for file in snapshot.unselected_files() {
            match filesystem.delete_file_if_exists(&file.path).await {
                Ok(true) => tracing::debug!(gid = %gid, path = ?file.path, "deleted unselected file"),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(gid = %gid, path = ?file.path, error = %e, "failed to delete unselected file");
                }
            }
        }
        if let Err(e) = filesystem.clean_unwanted(&snapshot.dir).await {
            tracing::error!(gid = %gid, dir = ?snapshot.dir, error = %e, "failed to clean unwanted files");
        }
    }
}
