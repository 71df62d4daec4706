//! Error handler.

use crate::error::Result;
use crate::types::{Gid, NotificationKind};

use super::Dispatcher;

/// Message reported when the engine's error text cannot be read
pub(crate) const UNKNOWN_ERROR_TEXT: &str = "none";

impl Dispatcher {
    /// Handle a transfer error
    ///
    /// Reading the engine's error message is best-effort; a transfer the engine
    /// no longer knows is still reported, with [`UNKNOWN_ERROR_TEXT`].
    pub(crate) async fn on_download_error(&self, gid: &Gid) -> Result<()> {
        tracing::info!(gid = %gid, "download error");

        let mut message = UNKNOWN_ERROR_TEXT.to_string();
        if let Some(snapshot) = self.fetch_snapshot(gid).await {
            if snapshot.opted_out() {
                tracing::debug!(gid = %gid, "transfer not followed, ignoring error");
                return Ok(());
            }
            if let Some(error) = snapshot.error_message {
                tracing::info!(gid = %gid, error = %error, "engine reported error");
                message = error;
            }
        }

        if let Some(record) = self.lookup_task(gid, NotificationKind::Error).await {
            self.fail_task(&record, gid, &message, None).await;
        }
        Ok(())
    }
}
