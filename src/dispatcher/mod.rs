//! Engine-notification dispatcher split into one submodule per handler.
//!
//! - [`start`] - admission limits, duplicate check, metadata resolution
//! - [`complete`] - handle reassignment, plain completion, seed termination
//! - [`bt_complete`] - selection cleanup and the seed-or-stop decision
//! - [`stop`] - dead-transfer reporting after a grace period
//! - [`errored`] - engine error forwarding
//! - [`listen`] - notification intake and per-notification spawning

mod bt_complete;
mod complete;
mod errored;
mod listen;
mod start;
mod stop;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use listen::DispatcherHandle;

use crate::config::Config;
use crate::engine::{DownloadEngine, DownloadSnapshot, EngineNotification, RemoveOptions};
use crate::error::Result;
use crate::fsops::{FileSystem, LocalFileSystem};
use crate::messaging::{Controls, Messenger};
use crate::policy::{AdmissionPolicy, DuplicateEvaluator, InMemoryUsage, UsageTracker};
use crate::registry::{TaskRecord, TaskRegistry};
use crate::storage::DuplicateIndex;
use crate::types::{Event, Gid, LifecycleState, NotificationKind};
use std::sync::Arc;

/// External collaborators the dispatcher orchestrates
#[derive(Clone)]
pub struct Collaborators {
    /// Download engine queries and commands
    pub engine: Arc<dyn DownloadEngine>,
    /// User-facing messaging channel
    pub messenger: Arc<dyn Messenger>,
    /// Remote-storage duplicate index
    pub duplicate_index: Arc<dyn DuplicateIndex>,
    /// On-disk cleanup routines
    pub filesystem: Arc<dyn FileSystem>,
    /// Per-user daily usage source for the daily limits
    pub usage: Arc<dyn UsageTracker>,
}

impl Collaborators {
    /// Collaborators with local-disk cleanup and in-memory usage tracking
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        messenger: Arc<dyn Messenger>,
        duplicate_index: Arc<dyn DuplicateIndex>,
    ) -> Self {
        Self {
            engine,
            messenger,
            duplicate_index,
            filesystem: Arc::new(LocalFileSystem),
            usage: Arc::new(InMemoryUsage::new()),
        }
    }

    /// Replace the filesystem collaborator
    pub fn with_filesystem(mut self, filesystem: Arc<dyn FileSystem>) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// Replace the usage tracker
    pub fn with_usage_tracker(mut self, usage: Arc<dyn UsageTracker>) -> Self {
        self.usage = usage;
        self
    }
}

/// Policy evaluators applied by the handlers
#[derive(Clone)]
pub(crate) struct Policies {
    pub(crate) admission: AdmissionPolicy,
    pub(crate) duplicates: DuplicateEvaluator,
}

/// Download-lifecycle dispatcher (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Dispatcher {
    /// Collaborators shared by every handler
    pub(crate) collaborators: Collaborators,
    /// In-flight task registry
    pub(crate) registry: TaskRegistry,
    /// Policy evaluators
    pub(crate) policies: Policies,
    /// Configuration (wrapped in Arc for sharing across handlers)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl Dispatcher {
    /// Create a dispatcher with its own empty task registry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` fails validation.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        Self::with_registry(config, collaborators, TaskRegistry::new())
    }

    /// Create a dispatcher over an existing task registry
    pub fn with_registry(
        config: Config,
        collaborators: Collaborators,
        registry: TaskRegistry,
    ) -> Result<Self> {
        config.validate()?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let policies = Policies {
            admission: AdmissionPolicy::new(&config),
            duplicates: DuplicateEvaluator::new(collaborators.duplicate_index.clone()),
        };

        tracing::info!(
            limits = policies.admission.enabled(),
            stop_duplicate = config.duplicate.stop_duplicate,
            selection_ui = config.selection_base_url().is_some(),
            "dispatcher initialized"
        );

        Ok(Self {
            collaborators,
            registry,
            policies,
            config: Arc::new(config),
            event_tx,
        })
    }

    /// Task registry shared with the code that creates tasks
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Subscribe to dispatcher events
    ///
    /// Each subscriber receives every event; one that falls more than 1000
    /// events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run the handler for one notification to completion
    ///
    /// [`dispatch`](Self::dispatch) and [`listen`](Self::listen) call this on a
    /// spawned task; call it directly to handle a notification inline.
    pub async fn handle(&self, notification: EngineNotification) -> Result<()> {
        let gid = &notification.gid;
        match notification.kind {
            NotificationKind::Start => self.on_download_start(gid).await,
            NotificationKind::Error => self.on_download_error(gid).await,
            NotificationKind::Stop => self.on_download_stop(gid).await,
            NotificationKind::Complete => self.on_download_complete(gid).await,
            NotificationKind::BtComplete => self.on_bt_download_complete(gid).await,
        }
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Snapshot of `gid`, or `None` if the engine no longer knows it
    ///
    /// The query is bounded by the lookup timeout. Any failure is treated as
    /// the transfer being gone.
    pub(crate) async fn fetch_snapshot(&self, gid: &Gid) -> Option<DownloadSnapshot> {
        let timeout = self.config.timing.lookup_timeout;
        match tokio::time::timeout(timeout, self.collaborators.engine.get_download(gid)).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) if e.is_gone() => {
                tracing::debug!(gid = %gid, "transfer no longer known to engine");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(gid = %gid, error = %e, "failed to fetch transfer, treating as gone");
                None
            }
            Err(_) => {
                tracing::warn!(gid = %gid, ?timeout, "timed out fetching transfer, treating as gone");
                None
            }
        }
    }

    /// Bounded registry lookup; an absent record drops the notification
    pub(crate) async fn lookup_task(&self, gid: &Gid, kind: NotificationKind) -> Option<TaskRecord> {
        let record = self
            .registry
            .lookup(gid, self.config.timing.lookup_timeout)
            .await;
        if record.is_none() {
            tracing::debug!(gid = %gid, %kind, "no task for notification, dropping");
            self.emit_event(Event::NotificationDropped {
                gid: gid.clone(),
                kind,
            });
        }
        record
    }

    /// Stop the transfer and delete its files
    pub(crate) async fn remove_transfer(&self, gid: &Gid) {
        match self
            .collaborators
            .engine
            .remove(gid, RemoveOptions::FORCE_WITH_FILES)
            .await
        {
            Ok(()) => {
                tracing::debug!(gid = %gid, "transfer removed");
                self.emit_event(Event::TransferRemoved { gid: gid.clone() });
            }
            Err(e) if e.is_gone() => {
                tracing::debug!(gid = %gid, "transfer already removed");
            }
            Err(e) => {
                tracing::error!(gid = %gid, error = %e, "failed to remove transfer");
            }
        }
    }

    /// Report a failure to the task's listener and drop the task record
    ///
    /// A task whose download already succeeded gets the message as its upload
    /// outcome instead.
    pub(crate) async fn fail_task(
        &self,
        record: &TaskRecord,
        gid: &Gid,
        message: &str,
        controls: Option<Controls>,
    ) {
        if record.listener.download_error(message, controls).await {
            self.emit_event(Event::DownloadFailed {
                task_id: record.task_id,
                gid: gid.clone(),
                error: message.to_string(),
            });
        } else if record.is_seeding() {
            record.listener.upload_error(message).await;
        }

        if let Err(e) = self
            .registry
            .transition(record.task_id, LifecycleState::Errored)
            .await
        {
            tracing::debug!(task_id = %record.task_id, error = %e, "task not marked errored");
        }
        self.registry.remove(record.task_id).await;
    }
}
