//! Core types for download-dispatcher

use serde::{Deserialize, Serialize};

/// Opaque transfer handle assigned by the download engine
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(pub String);

impl Gid {
    /// Create a new Gid
    pub fn new(gid: impl Into<String>) -> Self {
        Self(gid.into())
    }

    /// Borrow the raw handle
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Gid {
    fn from(gid: &str) -> Self {
        Self(gid.to_string())
    }
}

impl From<String> for Gid {
    fn from(gid: String) -> Self {
        Self(gid)
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one user-level task (stable across handle reassignment)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user that owns a task (daily limits are tracked per user)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a tracked task
///
/// ```text
/// MetadataResolving -> Active -> Completed -> Seeding
///                          \          \          /
///                           +-> Errored +-> Removed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Magnet/metadata placeholder, waiting for the engine to resolve a successor handle
    MetadataResolving,
    /// Real transfer in progress
    Active,
    /// Download portion finished and reported
    Completed,
    /// Torrent uploading after completion
    Seeding,
    /// Failed and reported
    Errored,
    /// Transfer removed from the engine
    Removed,
}

impl LifecycleState {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Re-entering the current state is always allowed and is a no-op.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (MetadataResolving, Active | Errored | Removed)
                | (Active, Completed | Seeding | Errored | Removed)
                | (Completed, Seeding | Removed)
                | (Seeding, Completed | Removed)
                | (Errored, Removed)
        )
    }

    /// Whether the task still owns a live transfer on the engine
    pub fn is_live(self) -> bool {
        !matches!(self, LifecycleState::Errored | LifecycleState::Removed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::MetadataResolving => "metadata-resolving",
            LifecycleState::Active => "active",
            LifecycleState::Completed => "completed",
            LifecycleState::Seeding => "seeding",
            LifecycleState::Errored => "errored",
            LifecycleState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Kind of notification emitted by the download engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Transfer started
    Start,
    /// Transfer failed
    Error,
    /// Transfer stopped (user or engine)
    Stop,
    /// Transfer complete (for torrents: including seeding)
    Complete,
    /// Torrent data complete; seeding may continue
    BtComplete,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NotificationKind::Start => "start",
            NotificationKind::Error => "error",
            NotificationKind::Stop => "stop",
            NotificationKind::Complete => "complete",
            NotificationKind::BtComplete => "bt_complete",
        };
        f.write_str(name)
    }
}

/// Event emitted by the dispatcher as it applies policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A metadata placeholder was superseded by a real transfer
    MetadataResolved {
        /// Placeholder handle
        from: Gid,
        /// Successor handle
        to: Gid,
    },

    /// Transfer paused until the user finishes selecting files
    AwaitingSelection {
        /// Task that owns the transfer
        task_id: TaskId,
        /// Paused handle
        gid: Gid,
    },

    /// Admission limit exceeded; transfer is being removed
    LimitExceeded {
        /// Rejected handle
        gid: Gid,
        /// Message reported to the user
        reason: String,
    },

    /// Content already present in remote storage; transfer is being removed
    DuplicateFound {
        /// Rejected handle
        gid: Gid,
        /// Number of matches listed by the storage index
        matches: usize,
    },

    /// Download portion finished and reported to the listener
    DownloadCompleted {
        /// Task that owns the transfer
        task_id: TaskId,
        /// Completed handle
        gid: Gid,
    },

    /// Download failed and was reported to the listener
    DownloadFailed {
        /// Task that owns the transfer
        task_id: TaskId,
        /// Failed handle
        gid: Gid,
        /// Error message reported to the user
        error: String,
    },

    /// Torrent entered its seeding phase
    SeedingStarted {
        /// Task that owns the transfer
        task_id: TaskId,
        /// Seeding handle
        gid: Gid,
    },

    /// Seeding ended and was reported to the listener
    SeedingStopped {
        /// Task that owns the transfer
        task_id: TaskId,
        /// Handle that stopped seeding
        gid: Gid,
        /// Upload/download ratio at the time seeding stopped
        ratio: f64,
        /// Seconds spent seeding
        seeding_secs: i64,
    },

    /// Transfer and its files were removed from the engine
    TransferRemoved {
        /// Removed handle
        gid: Gid,
    },

    /// Notification dropped because no task record was found in time
    NotificationDropped {
        /// Handle the notification referred to
        gid: Gid,
        /// Which notification was dropped
        kind: NotificationKind,
    },
}
