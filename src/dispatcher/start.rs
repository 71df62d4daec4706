//! Start handler: metadata resolution, admission limits and duplicate check.

use crate::engine::DownloadSnapshot;
use crate::error::Result;
use crate::messaging::{METADATA_WAIT_TEXT, MessageRef, stop_duplicate_text};
use crate::policy::TransferKind;
use crate::registry::TaskRecord;
use crate::types::{Event, Gid, NotificationKind};

use super::Dispatcher;

impl Dispatcher {
    /// Handle a transfer start
    pub(crate) async fn on_download_start(&self, gid: &Gid) -> Result<()> {
        let Some(snapshot) = self.fetch_snapshot(gid).await else {
            return Ok(());
        };
        if snapshot.opted_out() {
            tracing::debug!(gid = %gid, "transfer not followed, ignoring start");
            return Ok(());
        }

        if snapshot.is_metadata {
            tracing::info!(gid = %gid, "metadata download started");
            self.await_metadata(gid, snapshot).await;
            return Ok(());
        }
        tracing::info!(gid = %gid, name = %snapshot.name, "download started");

        let check_limits = self.policies.admission.enabled();
        let check_duplicates = self.config.duplicate.stop_duplicate;
        if !check_limits && !check_duplicates {
            return Ok(());
        }

        let Some(record) = self.lookup_task(gid, NotificationKind::Start).await else {
            tracing::warn!(
                gid = %gid,
                "admission checks skipped since download completed earlier"
            );
            return Ok(());
        };
        let ctx = record.listener.context().clone();
        if !check_limits && !ctx.wants_duplicate_check() {
            return Ok(());
        }

        let snapshot = self.settled_snapshot(gid, snapshot).await;
        if !self.registry.contains(record.task_id).await {
            tracing::debug!(gid = %gid, task_id = %record.task_id, "task finished while size settled");
            return Ok(());
        }

        if check_limits && self.enforce_limits(&record, gid, &snapshot).await {
            return Ok(());
        }
        if check_duplicates
            && ctx.wants_duplicate_check()
            && self.enforce_no_duplicate(&record, gid, &snapshot).await
        {
            return Ok(());
        }

        if check_limits
            && let Err(e) = self
                .collaborators
                .usage
                .record_admitted(ctx.user_id, ctx.is_leech, snapshot.total_length)
                .await
        {
            tracing::warn!(gid = %gid, user_id = %ctx.user_id, error = %e, "failed to record daily usage");
        }
        Ok(())
    }

    /// Wait until a metadata placeholder is removed or superseded
    ///
    /// This loop has no timeout: it only ends when the engine removes the
    /// placeholder or reports a successor handle. An engine that never
    /// resolves the metadata keeps this task alive indefinitely.
    async fn await_metadata(&self, gid: &Gid, mut snapshot: DownloadSnapshot) {
        tokio::time::sleep(self.config.timing.metadata_settle_delay).await;

        let Some(record) = self.lookup_task(gid, NotificationKind::Start).await else {
            return;
        };
        let ctx = record.listener.context();
        let notice = if ctx.select {
            self.send_notice(&ctx.origin, METADATA_WAIT_TEXT).await
        } else {
            None
        };

        loop {
            tokio::time::sleep(self.config.timing.metadata_poll_interval).await;
            if snapshot.is_removed() || snapshot.successor().is_some() {
                break;
            }
            match self.fetch_snapshot(gid).await {
                Some(live) => snapshot = live,
                None => {
                    tracing::debug!(gid = %gid, "metadata transfer vanished while resolving");
                    break;
                }
            }
        }

        if let Some(notice) = notice
            && let Err(e) = self.collaborators.messenger.delete_message(&notice).await
        {
            tracing::warn!(gid = %gid, error = %e, "failed to delete metadata notice");
        }

        if let Some(next) = snapshot.successor() {
            self.follow_handle(gid, next).await;
        }
    }

    /// Move task tracking from a metadata placeholder to its successor
    pub(crate) async fn follow_handle(&self, from: &Gid, to: &Gid) {
        match self.registry.reassign(from, to).await {
            Some(reassigned) if reassigned.moved => {
                self.emit_event(Event::MetadataResolved {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            Some(_) => {}
            None => tracing::debug!(from = %from, to = %to, "no task to reassign"),
        }
    }

    /// Re-read a direct transfer's snapshot once its size is likely known
    ///
    /// Torrents know their size at start; direct transfers may report 0 until
    /// the first response arrives.
    async fn settled_snapshot(&self, gid: &Gid, snapshot: DownloadSnapshot) -> DownloadSnapshot {
        if snapshot.is_torrent {
            return snapshot;
        }
        tokio::time::sleep(self.config.timing.size_settle_delay).await;
        self.fetch_snapshot(gid).await.unwrap_or(snapshot)
    }

    /// Apply the admission limits; returns true if the transfer was rejected
    async fn enforce_limits(&self, record: &TaskRecord, gid: &Gid, snapshot: &DownloadSnapshot) -> bool {
        let ctx = record.listener.context();
        let size = snapshot.total_length;
        tracing::info!(gid = %gid, size, "checking admission limits");

        let verdict = self
            .policies
            .admission
            .evaluate(
                size,
                TransferKind::from_torrent_flag(snapshot.is_torrent),
                ctx,
                self.collaborators.usage.as_ref(),
            )
            .await;
        let violation = match verdict {
            Ok(Some(violation)) => violation,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(gid = %gid, error = %e, "failed to read daily usage, skipping daily limits");
                return false;
            }
        };

        tracing::warn!(
            gid = %gid,
            task_id = %record.task_id,
            limit = ?violation.kind,
            "admission limit exceeded"
        );
        self.emit_event(Event::LimitExceeded {
            gid: gid.clone(),
            reason: violation.message.clone(),
        });
        self.fail_task(record, gid, &violation.message, None).await;
        self.remove_transfer(gid).await;
        true
    }

    /// Reject content already in remote storage; returns true if rejected
    async fn enforce_no_duplicate(
        &self,
        record: &TaskRecord,
        gid: &Gid,
        snapshot: &DownloadSnapshot,
    ) -> bool {
        let ctx = record.listener.context();
        let found = match self.policies.duplicates.check(&snapshot.name, ctx).await {
            Ok(Some(found)) => found,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(gid = %gid, error = %e, "duplicate lookup failed, allowing transfer");
                return false;
            }
        };

        tracing::warn!(
            gid = %gid,
            name = %found.name,
            matches = found.listing.count,
            "file/folder already in drive"
        );
        let controls = match self
            .collaborators
            .messenger
            .paginated_link(&found.listing.pages)
            .await
        {
            Ok(controls) => Some(controls),
            Err(e) => {
                tracing::warn!(gid = %gid, error = %e, "failed to publish duplicate list");
                None
            }
        };

        self.emit_event(Event::DuplicateFound {
            gid: gid.clone(),
            matches: found.listing.count,
        });
        let message = stop_duplicate_text(found.listing.count);
        self.fail_task(record, gid, &message, controls).await;
        self.remove_transfer(gid).await;
        true
    }

    /// Send a plain notice in reply to `origin`; failures are logged
    pub(crate) async fn send_notice(&self, origin: &MessageRef, text: &str) -> Option<MessageRef> {
        match self
            .collaborators
            .messenger
            .send_message(origin, text, None)
            .await
        {
            Ok(sent) => Some(sent),
            Err(e) => {
                tracing::warn!(chat_id = origin.chat_id, error = %e, "failed to send notice");
                None
            }
        }
    }
}
