//! Messaging collaborator: sending, deleting and refreshing user-facing messages
//!
//! Rendering and delivery belong to the embedding bot. This module only
//! defines the seam plus the handful of fixed texts and control layouts the
//! dispatcher sends on its own.

use crate::error::Result;
use crate::types::Gid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text shown while a magnet link resolves for a task that wants file selection
pub const METADATA_WAIT_TEXT: &str =
    "Downloading Metadata, wait then you can select files. Use torrent file to avoid this wait.";

/// Text sent with the selection controls once the real transfer is paused
pub const SELECTION_PAUSED_TEXT: &str =
    "Your download paused. Choose files then press Done Selecting button to start downloading.";

/// Error reported when a transfer stops and never comes back
pub const DEAD_TORRENT_TEXT: &str = "Dead torrent!";

/// Reference to a message previously sent (or the message that started a task)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat the message lives in
    pub chat_id: i64,
    /// Message id inside the chat
    pub message_id: i64,
}

/// What pressing a button does
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ButtonAction {
    /// Open a URL
    Url(String),
    /// Send callback data back to the bot
    Callback(String),
}

/// One inline button
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Label shown to the user
    pub label: String,
    /// Action triggered on press
    pub action: ButtonAction,
}

impl Button {
    /// URL button
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    /// Callback button
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }
}

/// Inline controls attached to a message, laid out in rows
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    /// Button rows, top to bottom
    pub rows: Vec<Vec<Button>>,
}

impl Controls {
    /// Lay buttons out `per_row` to a row
    pub fn from_buttons(buttons: Vec<Button>, per_row: usize) -> Self {
        let per_row = per_row.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(per_row);
        for button in buttons {
            row.push(button);
            if row.len() == per_row {
                rows.push(std::mem::replace(&mut row, Vec::with_capacity(per_row)));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    /// All buttons in reading order
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Messaging collaborator
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` as a reply to `to`, returning the new message
    async fn send_message(
        &self,
        to: &MessageRef,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<MessageRef>;

    /// Delete a message sent earlier
    async fn delete_message(&self, message: &MessageRef) -> Result<()>;

    /// Refresh every live status message
    async fn update_all_messages(&self) -> Result<()>;

    /// Publish `pages` somewhere browsable and return controls linking to them
    async fn paginated_link(&self, pages: &[String]) -> Result<Controls>;
}

/// Text reported when remote storage already holds the content
pub fn stop_duplicate_text(matches: usize) -> String {
    format!("File/Folder is already available in Drive.\nHere are {matches} list results:")
}

/// Text reported when a seeding torrent stops
pub fn seeding_stopped_text(ratio: f64, seeding_time: &str) -> String {
    format!("Seeding stopped with Ratio: {ratio} and Time: {seeding_time}")
}

/// Controls that let the user pick files of a paused torrent in the web UI
///
/// Long handles are shortened to 12 characters in callback data; the pincode
/// is the first four digits found in the handle.
pub fn selection_controls(base_url: &str, gid: &Gid, web_pincode: bool) -> Controls {
    let id = gid.as_str();
    let short = if id.chars().count() > 20 {
        id.chars().take(12).collect::<String>()
    } else {
        id.to_string()
    };
    let pincode: String = id.chars().filter(char::is_ascii_digit).take(4).collect();
    let base_url = base_url.trim_end_matches('/');

    let mut buttons = Vec::with_capacity(3);
    if web_pincode {
        buttons.push(Button::url("Select Files", format!("{base_url}/app/files/{id}")));
        buttons.push(Button::callback(
            "Pincode",
            format!("btsel pin {short} {pincode}"),
        ));
    } else {
        buttons.push(Button::url(
            "Select Files",
            format!("{base_url}/app/files/{id}?pin_code={pincode}"),
        ));
    }
    buttons.push(Button::callback(
        "Done Selecting",
        format!("btsel done {short} {id}"),
    ));

    Controls::from_buttons(buttons, 2)
}
