//! In-memory collaborators standing in for the engine, chat and drive

use async_trait::async_trait;
use download_dispatcher::engine::{RemoveOptions, TransferOptions};
use download_dispatcher::messaging::Button;
use download_dispatcher::storage::{DriveListing, DuplicateIndex};
use download_dispatcher::{
    Controls, DownloadEngine, DownloadSnapshot, EngineError, Gid, Listener, ListenerContext,
    MessageRef, Messenger, Result,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Engine whose transfers are edited directly by the test
#[derive(Default)]
pub struct FakeEngine {
    transfers: Mutex<HashMap<Gid, DownloadSnapshot>>,
    paused: Mutex<Vec<Gid>>,
    removed: Mutex<Vec<Gid>>,
    options: Mutex<Vec<(Gid, TransferOptions)>>,
}

impl FakeEngine {
    pub fn put(&self, snapshot: DownloadSnapshot) {
        self.transfers
            .lock()
            .unwrap()
            .insert(snapshot.gid.clone(), snapshot);
    }

    pub fn update(&self, gid: &str, change: impl FnOnce(&mut DownloadSnapshot)) {
        if let Some(snapshot) = self.transfers.lock().unwrap().get_mut(&Gid::from(gid)) {
            change(snapshot);
        }
    }

    pub fn paused(&self) -> Vec<Gid> {
        self.paused.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<Gid> {
        self.removed.lock().unwrap().clone()
    }

    pub fn options(&self) -> Vec<(Gid, TransferOptions)> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadEngine for FakeEngine {
    async fn get_download(&self, gid: &Gid) -> Result<DownloadSnapshot> {
        self.transfers
            .lock()
            .unwrap()
            .get(gid)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { gid: gid.clone() }.into())
    }

    async fn set_options(&self, gid: &Gid, options: &TransferOptions) -> Result<()> {
        self.options
            .lock()
            .unwrap()
            .push((gid.clone(), options.clone()));
        Ok(())
    }

    async fn force_pause(&self, gid: &Gid) -> Result<()> {
        self.paused.lock().unwrap().push(gid.clone());
        Ok(())
    }

    async fn remove(&self, gid: &Gid, _options: RemoveOptions) -> Result<()> {
        self.transfers.lock().unwrap().remove(gid);
        self.removed.lock().unwrap().push(gid.clone());
        Ok(())
    }
}

/// Chat that keeps every message it was asked to send
#[derive(Default)]
pub struct FakeChat {
    messages: Mutex<Vec<(String, Option<Controls>)>>,
    deleted: Mutex<usize>,
    refreshes: Mutex<usize>,
}

impl FakeChat {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn deleted(&self) -> usize {
        *self.deleted.lock().unwrap()
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }
}

#[async_trait]
impl Messenger for FakeChat {
    async fn send_message(
        &self,
        to: &MessageRef,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<MessageRef> {
        let mut messages = self.messages.lock().unwrap();
        messages.push((text.to_string(), controls));
        Ok(MessageRef {
            chat_id: to.chat_id,
            message_id: messages.len() as i64,
        })
    }

    async fn delete_message(&self, _message: &MessageRef) -> Result<()> {
        *self.deleted.lock().unwrap() += 1;
        Ok(())
    }

    async fn update_all_messages(&self) -> Result<()> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(())
    }

    async fn paginated_link(&self, pages: &[String]) -> Result<Controls> {
        Ok(Controls::from_buttons(
            vec![Button::url(format!("{} pages", pages.len()), "https://telegra.ph/x")],
            1,
        ))
    }
}

/// Drive holding a fixed set of names
#[derive(Default)]
pub struct FakeDrive {
    names: Vec<String>,
}

impl FakeDrive {
    pub fn with(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DuplicateIndex for FakeDrive {
    async fn list_by_name(&self, name: &str, _summarize: bool) -> Result<DriveListing> {
        let count = self.names.iter().filter(|n| n.as_str() == name).count();
        Ok(DriveListing {
            pages: (0..count).map(|i| format!("{name} #{i}")).collect(),
            count,
        })
    }
}

/// Listener logging outcomes as strings
pub struct LoggingListener {
    pub context: ListenerContext,
    pub log: Mutex<Vec<String>>,
}

impl LoggingListener {
    pub fn new(context: ListenerContext) -> Self {
        Self {
            context,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for LoggingListener {
    fn context(&self) -> &ListenerContext {
        &self.context
    }

    async fn on_download_complete(&self) {
        self.log.lock().unwrap().push("complete".into());
    }

    async fn on_download_error(&self, message: &str, _controls: Option<Controls>) {
        self.log.lock().unwrap().push(format!("error: {message}"));
    }

    async fn on_upload_error(&self, message: &str) {
        self.log.lock().unwrap().push(format!("upload: {message}"));
    }
}
