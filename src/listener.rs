//! Per-task listener contract
//!
//! A [`Listener`] is created together with its task and receives the task's
//! terminal outcomes. The dispatcher only reads its [`ListenerContext`] and
//! calls the three notification methods, always through [`TaskListener`] so
//! each outcome reaches the listener at most once.

use crate::messaging::{Controls, MessageRef};
use crate::types::{TaskId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where finished content is uploaded
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadDestination {
    /// The drive listed by the duplicate index
    #[default]
    Drive,
    /// An rclone remote path
    Rclone(String),
}

/// Read-only context a listener exposes to the dispatcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerContext {
    /// Task the listener belongs to
    pub task_id: TaskId,
    /// User that started the task
    pub user_id: UserId,
    /// Message that started the task; notices are sent as replies to it
    pub origin: MessageRef,
    /// Upload to chat instead of remote storage
    pub is_leech: bool,
    /// User asked to pick files before the transfer starts
    pub select: bool,
    /// Keep seeding after the torrent completes
    pub seed: bool,
    /// Archive content before upload
    pub compress: bool,
    /// Extract archives before upload
    pub extract: bool,
    /// Remote upload destination
    pub upload_destination: UploadDestination,
}

impl ListenerContext {
    /// Minimal context for a mirror task (drive upload, no options)
    pub fn new(task_id: TaskId, user_id: UserId, origin: MessageRef) -> Self {
        Self {
            task_id,
            user_id,
            origin,
            is_leech: false,
            select: false,
            seed: false,
            compress: false,
            extract: false,
            upload_destination: UploadDestination::Drive,
        }
    }

    /// Whether the remote-storage duplicate check applies to this task
    ///
    /// Leech uploads go to chat and selective downloads rarely match a stored
    /// folder, so only plain drive mirrors are checked.
    pub fn wants_duplicate_check(&self) -> bool {
        !self.is_leech && !self.select && self.upload_destination == UploadDestination::Drive
    }
}

/// Policy and notification contract bound to one task
///
/// Each method performs its own cleanup and forwarding. Implementations must
/// not block for long; they run inside the handler that reported the outcome.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Read-only task context
    fn context(&self) -> &ListenerContext;

    /// Download finished successfully
    async fn on_download_complete(&self);

    /// Download failed or was rejected by policy
    async fn on_download_error(&self, message: &str, controls: Option<Controls>);

    /// Post-download phase (seeding/upload) ended with a message for the user
    async fn on_upload_error(&self, message: &str);
}

/// Listener wrapper owned by a task record
///
/// Delivers the download outcome (complete or error) at most once and the
/// upload outcome at most once, whichever handlers race to report them.
pub struct TaskListener {
    inner: Arc<dyn Listener>,
    download_settled: AtomicBool,
    upload_settled: AtomicBool,
}

impl TaskListener {
    /// Wrap a listener
    pub fn new(inner: Arc<dyn Listener>) -> Self {
        Self {
            inner,
            download_settled: AtomicBool::new(false),
            upload_settled: AtomicBool::new(false),
        }
    }

    /// Read-only task context
    pub fn context(&self) -> &ListenerContext {
        self.inner.context()
    }

    /// Whether a download outcome has already been delivered
    pub fn download_settled(&self) -> bool {
        self.download_settled.load(Ordering::SeqCst)
    }

    /// Report success; returns false if an outcome was already delivered
    pub async fn download_complete(&self) -> bool {
        if self.download_settled.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                task_id = %self.context().task_id,
                "download outcome already delivered, skipping completion"
            );
            return false;
        }
        self.inner.on_download_complete().await;
        true
    }

    /// Report failure; returns false if an outcome was already delivered
    pub async fn download_error(&self, message: &str, controls: Option<Controls>) -> bool {
        if self.download_settled.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                task_id = %self.context().task_id,
                message,
                "download outcome already delivered, skipping error"
            );
            return false;
        }
        self.inner.on_download_error(message, controls).await;
        true
    }

    /// Report the end of the upload/seed phase; returns false if already reported
    pub async fn upload_error(&self, message: &str) -> bool {
        if self.upload_settled.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                task_id = %self.context().task_id,
                message,
                "upload outcome already delivered, skipping"
            );
            return false;
        }
        self.inner.on_upload_error(message).await;
        true
    }
}

impl std::fmt::Debug for TaskListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskListener")
            .field("context", self.context())
            .field("download_settled", &self.download_settled)
            .field("upload_settled", &self.upload_settled)
            .finish()
    }
}
