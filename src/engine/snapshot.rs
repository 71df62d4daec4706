//! Point-in-time view of one engine transfer

use crate::types::Gid;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine-reported status of a transfer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Transferring (or seeding)
    #[default]
    Active,
    /// Queued behind other transfers
    Waiting,
    /// Paused
    Paused,
    /// Failed
    Error,
    /// Finished (for torrents: seeding finished too)
    Complete,
    /// Removed by a user or the dispatcher
    Removed,
}

/// One file inside a transfer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path the engine writes the file to
    pub path: PathBuf,
    /// Size in bytes
    pub length: u64,
    /// Whether the user selected this file for download
    pub selected: bool,
}

/// Snapshot of engine state for one handle
///
/// Immutable once read; call [`DownloadEngine::get_download`](super::DownloadEngine::get_download)
/// again for a fresher view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    /// Handle this snapshot describes
    pub gid: Gid,
    /// Display name (torrent name or file name)
    pub name: String,
    /// Output directory
    pub dir: PathBuf,
    /// Engine status
    pub status: TransferStatus,
    /// Total size in bytes (0 while unknown)
    pub total_length: u64,
    /// Bytes downloaded so far
    pub completed_length: u64,
    /// Bytes uploaded so far
    pub upload_length: u64,
    /// Engine error message, if the transfer failed
    pub error_message: Option<String>,
    /// Files with their selection flags
    pub files: Vec<FileEntry>,
    /// Whether this is a BitTorrent transfer
    pub is_torrent: bool,
    /// Whether this is a metadata-only placeholder (magnet link resolving)
    pub is_metadata: bool,
    /// Handles the engine created to continue this transfer
    pub followed_by: Vec<Gid>,
    /// Whether the engine follows metadata into a real transfer automatically
    ///
    /// `false` means the caller opted out; the dispatcher ignores such transfers.
    pub follow_torrent: bool,
}

impl DownloadSnapshot {
    /// Whether the engine reports the transfer as fully complete
    pub fn is_complete(&self) -> bool {
        self.status == TransferStatus::Complete
    }

    /// Whether the transfer has been removed
    pub fn is_removed(&self) -> bool {
        self.status == TransferStatus::Removed
    }

    /// Whether the transfer is waiting in the engine queue
    pub fn is_queued(&self) -> bool {
        self.status == TransferStatus::Waiting
    }

    /// First successor handle, if the engine reassigned this transfer
    pub fn successor(&self) -> Option<&Gid> {
        self.followed_by.first()
    }

    /// Whether the dispatcher should ignore this transfer entirely
    pub fn opted_out(&self) -> bool {
        !self.follow_torrent
    }

    /// Upload/download ratio rounded to three decimals (0 when nothing is downloaded)
    pub fn ratio(&self) -> f64 {
        if self.completed_length == 0 {
            return 0.0;
        }
        let ratio = self.upload_length as f64 / self.completed_length as f64;
        (ratio * 1000.0).round() / 1000.0
    }

    /// Files the user deselected
    pub fn unselected_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|file| !file.selected)
    }
}
