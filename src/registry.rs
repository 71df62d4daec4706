//! In-flight task registry
//!
//! Single source of truth for "is this task still active". All access goes
//! through one `tokio::sync::Mutex` around the map, and every method releases
//! the lock before returning, so callers never hold it across an engine call
//! or a delay.

use crate::error::{Error, Result};
use crate::listener::{Listener, TaskListener};
use crate::types::{Gid, LifecycleState, TaskId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How often a bounded lookup re-checks the map while waiting for a record
const LOOKUP_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Registry entry for one task
#[derive(Clone, Debug)]
pub struct TaskRecord {
    /// Task identifier (key in the registry)
    pub task_id: TaskId,
    /// Engine handle currently carrying the task
    pub gid: Gid,
    /// Listener owned by this task
    pub listener: Arc<TaskListener>,
    /// Lifecycle state
    pub state: LifecycleState,
    /// Whether the engine had the transfer queued when the task was registered
    pub queued: bool,
    /// When the task was registered
    pub started_at: DateTime<Utc>,
    /// When seeding began, once the task entered [`LifecycleState::Seeding`]
    pub seeding_started_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Record for a transfer that is already a real download
    pub fn new(gid: Gid, listener: Arc<dyn Listener>) -> Self {
        let task_id = listener.context().task_id;
        Self {
            task_id,
            gid,
            listener: Arc::new(TaskListener::new(listener)),
            state: LifecycleState::Active,
            queued: false,
            started_at: Utc::now(),
            seeding_started_at: None,
        }
    }

    /// Mark the record as a metadata placeholder awaiting its successor handle
    pub fn resolving_metadata(mut self) -> Self {
        self.state = LifecycleState::MetadataResolving;
        self
    }

    /// Mark the record as queued behind other transfers
    pub fn queued(mut self, queued: bool) -> Self {
        self.queued = queued;
        self
    }

    /// Whether the task is seeding
    pub fn is_seeding(&self) -> bool {
        self.state == LifecycleState::Seeding
    }

    /// Time spent seeding so far (zero when not seeding)
    pub fn seeding_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.seeding_started_at
            .map(|started| now - started)
            .filter(|elapsed| *elapsed > chrono::Duration::zero())
            .unwrap_or_else(chrono::Duration::zero)
    }
}

/// Outcome of [`TaskRegistry::reassign`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reassignment {
    /// Task now carried by the successor handle
    pub task_id: TaskId,
    /// False when the successor was already tracked
    pub moved: bool,
}

/// Shared mapping from task id to in-flight task state
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TaskId, TaskRecord>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task
    ///
    /// Re-inserting the same task id replaces its record. A handle may only be
    /// carried by one task at a time.
    pub async fn insert(&self, record: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks
            .values()
            .any(|existing| existing.gid == record.gid && existing.task_id != record.task_id)
        {
            return Err(Error::DuplicateGid(record.gid));
        }
        tracing::debug!(task_id = %record.task_id, gid = %record.gid, "task registered");
        tasks.insert(record.task_id, record);
        Ok(())
    }

    /// Remove a task, returning its final record
    pub async fn remove(&self, task_id: TaskId) -> Option<TaskRecord> {
        let removed = self.tasks.lock().await.remove(&task_id);
        removed.map(|mut record| {
            tracing::debug!(task_id = %task_id, gid = %record.gid, "task unregistered");
            record.state = LifecycleState::Removed;
            record
        })
    }

    /// Current record of a task
    pub async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.lock().await.get(&task_id).cloned()
    }

    /// Whether a task is still registered
    pub async fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.lock().await.contains_key(&task_id)
    }

    /// Number of registered tasks
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether no task is registered
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Find the task carried by `gid` right now
    pub async fn find(&self, gid: &Gid) -> Option<TaskRecord> {
        self.tasks
            .lock()
            .await
            .values()
            .find(|record| &record.gid == gid)
            .cloned()
    }

    /// Find the task carried by `gid`, waiting up to `timeout` for it to appear
    ///
    /// The engine can notify before the task that owns a transfer has been
    /// registered, and a task can finish before a late notification is handled.
    /// Running out of time yields `None`; callers treat that as "already
    /// finished elsewhere" and drop the notification.
    pub async fn lookup(&self, gid: &Gid, timeout: Duration) -> Option<TaskRecord> {
        let found = tokio::time::timeout(timeout, async {
            loop {
                if let Some(record) = self.find(gid).await {
                    return record;
                }
                tokio::time::sleep(LOOKUP_RETRY_INTERVAL).await;
            }
        })
        .await;

        if found.is_err() {
            tracing::debug!(gid = %gid, ?timeout, "no task record within lookup timeout");
        }
        found.ok()
    }

    /// Move a task to a new lifecycle state
    ///
    /// Returns `Ok(false)` when the task is no longer registered.
    pub async fn transition(&self, task_id: TaskId, next: LifecycleState) -> Result<bool> {
        let mut tasks = self.tasks.lock().await;
        let Some(record) = tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        apply_transition(record, next)?;
        Ok(true)
    }

    /// Point the task carried by `from` at its successor handle `to`
    ///
    /// A metadata placeholder becomes an active transfer. Returns `None` if
    /// neither handle is tracked.
    pub async fn reassign(&self, from: &Gid, to: &Gid) -> Option<Reassignment> {
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.values().find(|record| &record.gid == to) {
            return Some(Reassignment {
                task_id: existing.task_id,
                moved: false,
            });
        }
        let record = tasks.values_mut().find(|record| &record.gid == from)?;
        record.gid = to.clone();
        if record.state == LifecycleState::MetadataResolving {
            record.state = LifecycleState::Active;
        }
        tracing::info!(task_id = %record.task_id, from = %from, to = %to, "task handle reassigned");
        Some(Reassignment {
            task_id: record.task_id,
            moved: true,
        })
    }

    /// Move a still-registered task into its seeding phase
    ///
    /// Checks presence and transitions under one lock acquisition, so a task
    /// cancelled concurrently is never resurrected. Returns `Ok(false)` when the
    /// task is gone.
    pub async fn begin_seeding(
        &self,
        task_id: TaskId,
        gid: &Gid,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().await;
        let Some(record) = tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        apply_transition(record, LifecycleState::Seeding)?;
        record.gid = gid.clone();
        record.seeding_started_at = Some(started_at);
        Ok(true)
    }
}

fn apply_transition(record: &mut TaskRecord, next: LifecycleState) -> Result<()> {
    if !record.state.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            task_id: record.task_id,
            from: record.state,
            to: next,
        });
    }
    if record.state != next {
        tracing::debug!(
            task_id = %record.task_id,
            from = %record.state,
            to = %next,
            "task state changed"
        );
        record.state = next;
    }
    Ok(())
}
