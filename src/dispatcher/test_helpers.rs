//! Recording fakes for the dispatcher's collaborators.

use crate::config::{Config, TimingConfig};
use crate::dispatcher::{Collaborators, Dispatcher};
use crate::engine::{
    DownloadEngine, DownloadSnapshot, EngineNotification, FileEntry, RemoveOptions, TransferOptions,
};
use crate::error::{EngineError, Error, Result};
use crate::fsops::{CleanupSummary, FileSystem};
use crate::listener::{Listener, ListenerContext};
use crate::messaging::{Button, Controls, MessageRef, Messenger};
use crate::policy::InMemoryUsage;
use crate::registry::TaskRecord;
use crate::storage::{DriveListing, DuplicateIndex};
use crate::types::{Event, Gid, NotificationKind, TaskId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Millisecond timings so handler tests finish quickly
pub(crate) fn fast_timing() -> TimingConfig {
    TimingConfig {
        lookup_timeout: Duration::from_millis(150),
        metadata_poll_interval: Duration::from_millis(10),
        metadata_settle_delay: Duration::from_millis(10),
        size_settle_delay: Duration::from_millis(10),
        stop_grace_period: Duration::from_millis(20),
        bt_settle_delay: Duration::from_millis(10),
        notification_idle_timeout: Duration::from_millis(50),
    }
}

/// Default config with fast timings
pub(crate) fn test_config() -> Config {
    Config {
        timing: fast_timing(),
        ..Default::default()
    }
}

/// Command issued to the fake engine
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EngineCall {
    SetOptions(Gid, TransferOptions),
    ForcePause(Gid),
    Remove(Gid, RemoveOptions),
}

/// Engine serving scripted snapshots and recording commands
#[derive(Default)]
pub(crate) struct MockEngine {
    /// Per-handle snapshot queue; the last one is served repeatedly
    snapshots: Mutex<HashMap<Gid, VecDeque<DownloadSnapshot>>>,
    calls: Mutex<Vec<EngineCall>>,
    fetches: Mutex<Vec<Gid>>,
    failing: Mutex<HashSet<&'static str>>,
    /// Handles the engine forgets after this many fetches
    vanishing: Mutex<HashMap<Gid, usize>>,
}

impl MockEngine {
    pub(crate) fn set(&self, snapshot: DownloadSnapshot) {
        self.script(vec![snapshot]);
    }

    /// Serve `snapshots` in order for their handle
    pub(crate) fn script(&self, snapshots: Vec<DownloadSnapshot>) {
        let Some(gid) = snapshots.first().map(|s| s.gid.clone()) else {
            return;
        };
        self.snapshots
            .lock()
            .unwrap()
            .insert(gid, snapshots.into_iter().collect());
    }

    /// Make an operation (`get_download`, `set_options`, `force_pause`, `remove`) fail
    pub(crate) fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    /// Report `gid` as unknown once it has been fetched `fetches` times
    pub(crate) fn vanish_after(&self, gid: &str, fetches: usize) {
        self.vanishing
            .lock()
            .unwrap()
            .insert(Gid::from(gid), fetches);
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fetch_count(&self, gid: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.as_str() == gid)
            .count()
    }

    pub(crate) fn removed(&self) -> Vec<Gid> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Remove(gid, _) => Some(gid),
                _ => None,
            })
            .collect()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::Engine(EngineError::Rpc(format!("{operation} failed"))));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadEngine for MockEngine {
    async fn get_download(&self, gid: &Gid) -> Result<DownloadSnapshot> {
        self.fetches.lock().unwrap().push(gid.clone());
        self.check("get_download")?;
        if let Some(&limit) = self.vanishing.lock().unwrap().get(gid)
            && self.fetch_count(gid.as_str()) > limit
        {
            return Err(EngineError::NotFound { gid: gid.clone() }.into());
        }
        let mut snapshots = self.snapshots.lock().unwrap();
        let queue = snapshots
            .get_mut(gid)
            .ok_or_else(|| EngineError::NotFound { gid: gid.clone() })?;
        let snapshot = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        snapshot.ok_or_else(|| EngineError::NotFound { gid: gid.clone() }.into())
    }

    async fn set_options(&self, gid: &Gid, options: &TransferOptions) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(EngineCall::SetOptions(gid.clone(), options.clone()));
        self.check("set_options")
    }

    async fn force_pause(&self, gid: &Gid) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(EngineCall::ForcePause(gid.clone()));
        self.check("force_pause")
    }

    async fn remove(&self, gid: &Gid, options: RemoveOptions) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(EngineCall::Remove(gid.clone(), options));
        self.check("remove")
    }
}

/// Message sent through the fake messenger
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SentMessage {
    pub(crate) to: MessageRef,
    pub(crate) text: String,
    pub(crate) controls: Option<Controls>,
    pub(crate) sent: MessageRef,
}

/// Messenger recording every call
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<MessageRef>>,
    refreshes: Mutex<usize>,
    published: Mutex<Vec<Vec<String>>>,
}

impl RecordingMessenger {
    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    pub(crate) fn published(&self) -> Vec<Vec<String>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        to: &MessageRef,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<MessageRef> {
        let mut sent = self.sent.lock().unwrap();
        let reply = MessageRef {
            chat_id: to.chat_id,
            message_id: 1000 + sent.len() as i64,
        };
        sent.push(SentMessage {
            to: to.clone(),
            text: text.to_string(),
            controls,
            sent: reply.clone(),
        });
        Ok(reply)
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn update_all_messages(&self) -> Result<()> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(())
    }

    async fn paginated_link(&self, pages: &[String]) -> Result<Controls> {
        self.published.lock().unwrap().push(pages.to_vec());
        Ok(Controls::from_buttons(
            vec![Button::url("View", "https://telegra.ph/results")],
            1,
        ))
    }
}

/// Duplicate index with a fixed set of stored names
#[derive(Default)]
pub(crate) struct MockDriveIndex {
    stored: Mutex<HashMap<String, usize>>,
    queries: Mutex<Vec<String>>,
}

impl MockDriveIndex {
    pub(crate) fn store(&self, name: &str, count: usize) {
        self.stored.lock().unwrap().insert(name.to_string(), count);
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DuplicateIndex for MockDriveIndex {
    async fn list_by_name(&self, name: &str, _summarize: bool) -> Result<DriveListing> {
        self.queries.lock().unwrap().push(name.to_string());
        let count = self.stored.lock().unwrap().get(name).copied().unwrap_or(0);
        if count == 0 {
            return Ok(DriveListing::default());
        }
        Ok(DriveListing {
            pages: vec![format!("{count} results for {name}")],
            count,
        })
    }
}

/// Filesystem with an in-memory set of existing files
#[derive(Default)]
pub(crate) struct RecordingFs {
    existing: Mutex<HashSet<PathBuf>>,
    deleted: Mutex<Vec<PathBuf>>,
    cleaned: Mutex<Vec<PathBuf>>,
}

impl RecordingFs {
    pub(crate) fn touch(&self, path: impl Into<PathBuf>) {
        self.existing.lock().unwrap().insert(path.into());
    }

    pub(crate) fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn cleaned(&self) -> Vec<PathBuf> {
        self.cleaned.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSystem for RecordingFs {
    async fn delete_file_if_exists(&self, path: &Path) -> Result<bool> {
        if !self.existing.lock().unwrap().remove(path) {
            return Ok(false);
        }
        self.deleted.lock().unwrap().push(path.to_path_buf());
        Ok(true)
    }

    async fn clean_unwanted(&self, dir: &Path) -> Result<CleanupSummary> {
        self.cleaned.lock().unwrap().push(dir.to_path_buf());
        Ok(CleanupSummary::default())
    }
}

/// Outcome delivered to a listener
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ListenerCall {
    Complete,
    Error(String, Option<Controls>),
    UploadError(String),
}

/// Listener recording every outcome it receives
pub(crate) struct RecordingListener {
    context: ListenerContext,
    calls: Mutex<Vec<ListenerCall>>,
}

impl RecordingListener {
    pub(crate) fn calls(&self) -> Vec<ListenerCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for RecordingListener {
    fn context(&self) -> &ListenerContext {
        &self.context
    }

    async fn on_download_complete(&self) {
        self.calls.lock().unwrap().push(ListenerCall::Complete);
    }

    async fn on_download_error(&self, message: &str, controls: Option<Controls>) {
        self.calls
            .lock()
            .unwrap()
            .push(ListenerCall::Error(message.to_string(), controls));
    }

    async fn on_upload_error(&self, message: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(ListenerCall::UploadError(message.to_string()));
    }
}

/// Context of a plain mirror task
pub(crate) fn context(task: u64) -> ListenerContext {
    ListenerContext::new(
        TaskId(task),
        UserId(500),
        MessageRef {
            chat_id: -1001,
            message_id: task as i64,
        },
    )
}

/// Dispatcher wired to recording fakes
pub(crate) struct Harness {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) engine: Arc<MockEngine>,
    pub(crate) messenger: Arc<RecordingMessenger>,
    pub(crate) index: Arc<MockDriveIndex>,
    pub(crate) filesystem: Arc<RecordingFs>,
    pub(crate) usage: Arc<InMemoryUsage>,
}

impl Harness {
    pub(crate) fn new(config: Config) -> Self {
        let engine = Arc::new(MockEngine::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let index = Arc::new(MockDriveIndex::default());
        let filesystem = Arc::new(RecordingFs::default());
        let usage = Arc::new(InMemoryUsage::new());

        let collaborators = Collaborators::new(engine.clone(), messenger.clone(), index.clone())
            .with_filesystem(filesystem.clone())
            .with_usage_tracker(usage.clone());
        let dispatcher = Dispatcher::new(config, collaborators).unwrap();

        Self {
            dispatcher,
            engine,
            messenger,
            index,
            filesystem,
            usage,
        }
    }

    /// Register a task on `gid`, returning its listener
    pub(crate) async fn register(&self, gid: &str, ctx: ListenerContext) -> Arc<RecordingListener> {
        self.register_record(gid, ctx, |record| record).await
    }

    /// Register a task after adjusting its record
    pub(crate) async fn register_record(
        &self,
        gid: &str,
        ctx: ListenerContext,
        adjust: impl FnOnce(TaskRecord) -> TaskRecord,
    ) -> Arc<RecordingListener> {
        let listener = Arc::new(RecordingListener {
            context: ctx,
            calls: Mutex::new(Vec::new()),
        });
        let record = adjust(TaskRecord::new(Gid::from(gid), listener.clone()));
        self.dispatcher.registry().insert(record).await.unwrap();
        listener
    }

    /// Run the handler for one notification inline
    pub(crate) async fn notify(&self, kind: NotificationKind, gid: &str) {
        self.dispatcher
            .handle(EngineNotification::new(kind, gid))
            .await
            .unwrap();
    }

    /// Events emitted so far on a receiver subscribed before the action
    pub(crate) fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Direct (HTTP) transfer snapshot
pub(crate) fn direct(gid: &str, name: &str, size: u64) -> DownloadSnapshot {
    DownloadSnapshot {
        gid: Gid::from(gid),
        name: name.to_string(),
        dir: PathBuf::from("/downloads").join(gid),
        total_length: size,
        follow_torrent: true,
        ..Default::default()
    }
}

/// Torrent transfer snapshot
pub(crate) fn torrent(gid: &str, name: &str, size: u64) -> DownloadSnapshot {
    DownloadSnapshot {
        is_torrent: true,
        ..direct(gid, name, size)
    }
}

/// Metadata placeholder snapshot
pub(crate) fn metadata(gid: &str) -> DownloadSnapshot {
    DownloadSnapshot {
        is_metadata: true,
        ..torrent(gid, &format!("[METADATA]{gid}"), 0)
    }
}

/// File entry below the snapshot's output directory
pub(crate) fn file(snapshot: &DownloadSnapshot, name: &str, selected: bool) -> FileEntry {
    FileEntry {
        path: snapshot.dir.join(name),
        length: 1024,
        selected,
    }
}
