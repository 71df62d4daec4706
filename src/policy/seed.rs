//! Seed evaluator: seed-or-stop decision and seed termination stats

use crate::engine::DownloadSnapshot;
use crate::listener::ListenerContext;
use crate::messaging::seeding_stopped_text;
use crate::utils::readable_time;
use chrono::{DateTime, Utc};

/// What to do with a torrent once its data is complete
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedDecision {
    /// Lift the upload cap and keep the transfer alive
    Seed,
    /// Pause now; the transfer is removed once the listener is told
    Stop,
}

impl SeedDecision {
    /// Decision for a task with context `ctx`
    pub fn for_listener(ctx: &ListenerContext) -> Self {
        if ctx.seed {
            SeedDecision::Seed
        } else {
            SeedDecision::Stop
        }
    }
}

/// Ratio and time reported when seeding ends
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeedStats {
    /// Upload/download ratio, three decimals
    pub ratio: f64,
    /// Whole seconds spent seeding
    pub seeding_secs: i64,
}

impl SeedStats {
    /// Stats of `snapshot` for a seed that began at `started_at`
    pub fn new(
        snapshot: &DownloadSnapshot,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let seeding_secs = started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0);
        Self {
            ratio: snapshot.ratio(),
            seeding_secs,
        }
    }

    /// Seeding time as `1d2h3m4s`
    pub fn seeding_time(&self) -> String {
        readable_time(self.seeding_secs)
    }

    /// Seed termination notice
    pub fn message(&self) -> String {
        seeding_stopped_text(self.ratio, &self.seeding_time())
    }
}
