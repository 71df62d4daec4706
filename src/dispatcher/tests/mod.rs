use super::test_helpers::*;
use super::*;
use crate::config::{LimitsConfig, SelectionConfig};
use crate::engine::{TransferOptions, TransferStatus};
use crate::listener::UploadDestination;
use crate::messaging::{ButtonAction, DEAD_TORRENT_TEXT, METADATA_WAIT_TEXT, SELECTION_PAUSED_TEXT};
use crate::types::TaskId;
