//! Admission-limit evaluator
//!
//! Checks run in a fixed order and the first violation wins: category size
//! cap, leech cap, storage threshold, then the per-user daily limits.

use crate::config::{Config, LimitsConfig, gib_to_bytes};
use crate::error::{Error, Result};
use crate::listener::ListenerContext;
use crate::types::UserId;
use crate::utils::{get_available_space, readable_size};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Category a transfer's size cap is taken from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Plain HTTP/FTP transfer
    Direct,
    /// BitTorrent transfer
    Torrent,
}

impl TransferKind {
    /// Kind of a transfer given the engine's torrent flag
    pub fn from_torrent_flag(is_torrent: bool) -> Self {
        if is_torrent {
            TransferKind::Torrent
        } else {
            TransferKind::Direct
        }
    }
}

/// Which limit rejected a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Direct transfer size cap
    Direct,
    /// Torrent size cap
    Torrent,
    /// Leech size cap
    Leech,
    /// Free-space threshold of the download directory
    StorageThreshold,
    /// Daily task count
    DailyTasks,
    /// Daily mirror volume
    DailyMirror,
    /// Daily leech volume
    DailyLeech,
}

/// A failed admission check with the message reported to the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitViolation {
    /// Limit that was exceeded
    pub kind: LimitKind,
    /// User-facing explanation
    pub message: String,
}

/// One user's usage for one day
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Tasks started
    pub tasks: u32,
    /// Bytes mirrored to remote storage
    pub mirror_bytes: u64,
    /// Bytes leeched to chat
    pub leech_bytes: u64,
}

/// Source of per-user daily usage
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Usage of `user` for the current day
    async fn usage_today(&self, user: UserId) -> Result<DailyUsage>;

    /// Account for a transfer that passed admission
    async fn record_admitted(&self, user: UserId, is_leech: bool, size: u64) -> Result<()>;
}

/// [`UsageTracker`] keeping usage in memory, bucketed by UTC date
#[derive(Debug, Default)]
pub struct InMemoryUsage {
    days: Mutex<HashMap<(UserId, NaiveDate), DailyUsage>>,
}

impl InMemoryUsage {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage of `user` on a specific date
    pub async fn usage_on(&self, user: UserId, day: NaiveDate) -> DailyUsage {
        self.days
            .lock()
            .await
            .get(&(user, day))
            .copied()
            .unwrap_or_default()
    }

    /// Add usage for `user` on a specific date
    pub async fn add_on(&self, user: UserId, day: NaiveDate, is_leech: bool, size: u64) {
        let mut days = self.days.lock().await;
        // keep only today's bucket per user
        days.retain(|(u, d), _| *u != user || *d == day);
        let usage = days.entry((user, day)).or_default();
        usage.tasks = usage.tasks.saturating_add(1);
        if is_leech {
            usage.leech_bytes = usage.leech_bytes.saturating_add(size);
        } else {
            usage.mirror_bytes = usage.mirror_bytes.saturating_add(size);
        }
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsage {
    async fn usage_today(&self, user: UserId) -> Result<DailyUsage> {
        Ok(self.usage_on(user, Utc::now().date_naive()).await)
    }

    async fn record_admitted(&self, user: UserId, is_leech: bool, size: u64) -> Result<()> {
        self.add_on(user, Utc::now().date_naive(), is_leech, size)
            .await;
        Ok(())
    }
}

/// Stateless admission-limit evaluator
#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    limits: LimitsConfig,
    download_dir: PathBuf,
}

impl AdmissionPolicy {
    /// Build the evaluator from configuration
    pub fn new(config: &Config) -> Self {
        Self {
            limits: config.limits.clone(),
            download_dir: config.download_dir.clone(),
        }
    }

    /// Whether any check is configured
    pub fn enabled(&self) -> bool {
        self.limits.any_enabled()
    }

    /// Run every configured check against a transfer of `size` bytes
    ///
    /// A failed free-space probe skips the storage check rather than rejecting
    /// the transfer. A failing usage tracker is returned as an error.
    pub async fn evaluate(
        &self,
        size: u64,
        kind: TransferKind,
        ctx: &ListenerContext,
        usage: &dyn UsageTracker,
    ) -> Result<Option<LimitViolation>> {
        let available = if self.limits.storage_threshold_gb.is_some() {
            match get_available_space(&self.download_dir)
                .map_err(|e| Error::DiskSpaceCheckFailed(e.to_string()))
            {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(
                        dir = ?self.download_dir,
                        error = %e,
                        "could not probe free space, skipping storage threshold"
                    );
                    None
                }
            }
        } else {
            None
        };

        if let Some(violation) = self.check_size(size, kind, ctx, available) {
            return Ok(Some(violation));
        }

        if self.limits.daily_task_limit.is_none()
            && self.limits.daily_mirror_limit_gb.is_none()
            && self.limits.daily_leech_limit_gb.is_none()
        {
            return Ok(None);
        }
        let today = usage.usage_today(ctx.user_id).await?;
        Ok(self.check_daily(size, ctx, today))
    }

    /// Size caps and storage threshold
    ///
    /// `available` is the free space of the download directory; `None` skips
    /// the threshold check.
    pub fn check_size(
        &self,
        size: u64,
        kind: TransferKind,
        ctx: &ListenerContext,
        available: Option<u64>,
    ) -> Option<LimitViolation> {
        let violation = self
            .category_cap(size, kind)
            .or_else(|| self.leech_cap(size, ctx))
            .or_else(|| self.storage_threshold(size, ctx, available?))?;

        let message = if size > 0 {
            format!(
                "{}.\nYour File/Folder size is {}",
                violation.message,
                readable_size(size)
            )
        } else {
            violation.message
        };
        Some(LimitViolation {
            kind: violation.kind,
            message,
        })
    }

    /// Per-user daily task count and volume
    pub fn check_daily(
        &self,
        size: u64,
        ctx: &ListenerContext,
        today: DailyUsage,
    ) -> Option<LimitViolation> {
        if let Some(max_tasks) = self.limits.daily_task_limit
            && today.tasks >= max_tasks
        {
            return Some(LimitViolation {
                kind: LimitKind::DailyTasks,
                message: format!(
                    "Daily Total Task Limit: {max_tasks}\nYou have exhausted all your Daily Task Limits"
                ),
            });
        }

        let (limit_gb, used, kind, label) = if ctx.is_leech {
            (
                self.limits.daily_leech_limit_gb,
                today.leech_bytes,
                LimitKind::DailyLeech,
                "Leech",
            )
        } else {
            (
                self.limits.daily_mirror_limit_gb,
                today.mirror_bytes,
                LimitKind::DailyMirror,
                "Mirror",
            )
        };
        let limit = gib_to_bytes(limit_gb?);
        if used.saturating_add(size) >= limit {
            return Some(LimitViolation {
                kind,
                message: format!(
                    "Daily {label} Limit is {}\nYou have exhausted all your Daily {label} Limit",
                    readable_size(limit)
                ),
            });
        }
        None
    }

    fn category_cap(&self, size: u64, kind: TransferKind) -> Option<LimitViolation> {
        let (limit_gb, limit_kind, label) = match kind {
            TransferKind::Direct => (self.limits.direct_limit_gb, LimitKind::Direct, "Direct"),
            TransferKind::Torrent => (self.limits.torrent_limit_gb, LimitKind::Torrent, "Torrent"),
        };
        let limit = gib_to_bytes(limit_gb?);
        (size > limit).then(|| LimitViolation {
            kind: limit_kind,
            message: format!("{label} limit is {}", readable_size(limit)),
        })
    }

    fn leech_cap(&self, size: u64, ctx: &ListenerContext) -> Option<LimitViolation> {
        if !ctx.is_leech {
            return None;
        }
        let limit = gib_to_bytes(self.limits.leech_limit_gb?);
        (size > limit).then(|| LimitViolation {
            kind: LimitKind::Leech,
            message: format!("Leech limit is {}", readable_size(limit)),
        })
    }

    fn storage_threshold(
        &self,
        size: u64,
        ctx: &ListenerContext,
        available: u64,
    ) -> Option<LimitViolation> {
        let threshold = gib_to_bytes(self.limits.storage_threshold_gb?);
        // archiving needs room for the source and the archive at once
        let needed = if ctx.compress || ctx.extract {
            size.saturating_mul(2)
        } else {
            size
        };
        let remaining = available.checked_sub(needed);
        if remaining.is_some_and(|left| left >= threshold) {
            return None;
        }
        Some(LimitViolation {
            kind: LimitKind::StorageThreshold,
            message: format!("You must leave {} free storage", readable_size(threshold)),
        })
    }
}
