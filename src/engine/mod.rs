//! Download engine surface consumed by the dispatcher
//!
//! The engine itself (queueing, transfer, torrent metadata resolution) lives
//! outside this crate. An adapter implements [`DownloadEngine`] for queries and
//! commands, and feeds [`EngineNotification`]s into
//! [`Dispatcher::listen`](crate::dispatcher::Dispatcher::listen).

mod snapshot;

pub use snapshot::{DownloadSnapshot, FileEntry, TransferStatus};

use crate::error::Result;
use crate::types::{Gid, NotificationKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One notification pushed by the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineNotification {
    /// What happened
    pub kind: NotificationKind,
    /// Which transfer it happened to
    pub gid: Gid,
}

impl EngineNotification {
    /// Create a notification
    pub fn new(kind: NotificationKind, gid: impl Into<Gid>) -> Self {
        Self {
            kind,
            gid: gid.into(),
        }
    }
}

/// Per-transfer options the dispatcher may change
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Upload rate cap in bytes per second; `Some(0)` means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_limit: Option<u64>,
}

impl TransferOptions {
    /// Options that lift the upload cap so a finished torrent can seed
    pub fn unlimited_upload() -> Self {
        Self {
            max_upload_limit: Some(0),
        }
    }
}

/// How a transfer is removed from the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    /// Stop immediately instead of waiting for tracker announces
    pub force: bool,
    /// Delete downloaded files as well
    pub delete_files: bool,
}

impl RemoveOptions {
    /// Stop the transfer and delete its files
    pub const FORCE_WITH_FILES: RemoveOptions = RemoveOptions {
        force: true,
        delete_files: true,
    };
}

/// Query and command surface of the download engine
///
/// Implementations report a vanished transfer as
/// [`EngineError::NotFound`](crate::error::EngineError::NotFound) so handlers
/// can tell a lost race from a real failure.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Fetch the current snapshot of a transfer
    async fn get_download(&self, gid: &Gid) -> Result<DownloadSnapshot>;

    /// Change per-transfer options
    async fn set_options(&self, gid: &Gid, options: &TransferOptions) -> Result<()>;

    /// Pause a transfer without waiting for tracker/peer shutdown
    async fn force_pause(&self, gid: &Gid) -> Result<()>;

    /// Remove a transfer
    async fn remove(&self, gid: &Gid, options: RemoveOptions) -> Result<()>;
}
