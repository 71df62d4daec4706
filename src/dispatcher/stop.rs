//! Stop handler.

use crate::error::Result;
use crate::messaging::DEAD_TORRENT_TEXT;
use crate::types::{Gid, NotificationKind};

use super::Dispatcher;

impl Dispatcher {
    /// Handle a transfer stop
    ///
    /// Stops can be transient (engine restart), so the task is only reported
    /// dead if it is still registered after the grace period. The engine has
    /// already stopped the transfer; nothing is removed here.
    pub(crate) async fn on_download_stop(&self, gid: &Gid) -> Result<()> {
        tokio::time::sleep(self.config.timing.stop_grace_period).await;

        if let Some(record) = self.lookup_task(gid, NotificationKind::Stop).await {
            tracing::info!(gid = %gid, task_id = %record.task_id, "transfer stopped");
            self.fail_task(&record, gid, DEAD_TORRENT_TEXT, None).await;
        }
        Ok(())
    }
}
