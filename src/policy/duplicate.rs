//! Duplicate evaluator: name-based lookup against remote storage

use crate::error::Result;
use crate::fsops::archive_base_name;
use crate::listener::ListenerContext;
use crate::storage::{DriveListing, DuplicateIndex};
use std::sync::Arc;

/// Name the content will have once it lands in remote storage
///
/// Compressed uploads gain a `.zip` suffix and extracted uploads lose their
/// archive extension. Returns `None` when the post-extraction name cannot be
/// determined, in which case the check is skipped.
pub fn candidate_name(name: &str, ctx: &ListenerContext) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if ctx.compress {
        Some(format!("{name}.zip"))
    } else if ctx.extract {
        archive_base_name(name)
    } else {
        Some(name.to_string())
    }
}

/// Content already present in remote storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateMatch {
    /// Name that was looked up
    pub name: String,
    /// Matching entries
    pub listing: DriveListing,
}

/// Looks up candidate names in the remote-storage index
#[derive(Clone)]
pub struct DuplicateEvaluator {
    index: Arc<dyn DuplicateIndex>,
}

impl DuplicateEvaluator {
    /// Evaluate against `index`
    pub fn new(index: Arc<dyn DuplicateIndex>) -> Self {
        Self { index }
    }

    /// Look up the upload name of `name` for a task with context `ctx`
    ///
    /// `Ok(None)` means the transfer may proceed: either no candidate name
    /// exists or the index listed nothing.
    pub async fn check(&self, name: &str, ctx: &ListenerContext) -> Result<Option<DuplicateMatch>> {
        let Some(candidate) = candidate_name(name, ctx) else {
            tracing::debug!(name, "no upload name for extracted content, skipping duplicate check");
            return Ok(None);
        };

        tracing::info!(name = %candidate, "checking if file/folder is already in drive");
        let listing = self.index.list_by_name(&candidate, true).await?;
        if listing.is_empty() {
            return Ok(None);
        }
        Ok(Some(DuplicateMatch {
            name: candidate,
            listing,
        }))
    }
}
