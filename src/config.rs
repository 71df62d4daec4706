//! Configuration types for download-dispatcher

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Bytes in one gibibyte, the unit every size limit is configured in
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Admission limits checked when a transfer starts
///
/// Every limit is optional; `None` disables that check. Sizes are in GiB.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of a direct (non-torrent) transfer
    #[serde(default)]
    pub direct_limit_gb: Option<f64>,

    /// Maximum size of a torrent transfer
    #[serde(default)]
    pub torrent_limit_gb: Option<f64>,

    /// Maximum size of a transfer uploaded to chat (leech mode)
    #[serde(default)]
    pub leech_limit_gb: Option<f64>,

    /// Free space that must remain in the download directory after the transfer
    #[serde(default)]
    pub storage_threshold_gb: Option<f64>,

    /// Maximum number of tasks a user may start per day
    #[serde(default)]
    pub daily_task_limit: Option<u32>,

    /// Maximum volume a user may mirror to remote storage per day
    #[serde(default)]
    pub daily_mirror_limit_gb: Option<f64>,

    /// Maximum volume a user may leech to chat per day
    #[serde(default)]
    pub daily_leech_limit_gb: Option<f64>,
}

impl LimitsConfig {
    /// Whether any admission check is configured
    pub fn any_enabled(&self) -> bool {
        self.direct_limit_gb.is_some()
            || self.torrent_limit_gb.is_some()
            || self.leech_limit_gb.is_some()
            || self.storage_threshold_gb.is_some()
            || self.daily_task_limit.is_some()
            || self.daily_mirror_limit_gb.is_some()
            || self.daily_leech_limit_gb.is_some()
    }

    fn gb_limits(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("direct_limit_gb", self.direct_limit_gb),
            ("torrent_limit_gb", self.torrent_limit_gb),
            ("leech_limit_gb", self.leech_limit_gb),
            ("storage_threshold_gb", self.storage_threshold_gb),
            ("daily_mirror_limit_gb", self.daily_mirror_limit_gb),
            ("daily_leech_limit_gb", self.daily_leech_limit_gb),
        ]
    }
}

/// Duplicate detection against remote storage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// Reject transfers whose name already exists in remote storage (default: false)
    #[serde(default)]
    pub stop_duplicate: bool,
}

/// Interactive file-selection UI
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Public base URL of the file-selection web UI (None disables pause-and-select)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Require a separate pincode instead of embedding it in the selection link
    #[serde(default)]
    pub web_pincode: bool,
}

/// Delays and timeouts used by the handlers
///
/// Serialized as milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Bounded wait for a task record to appear in the registry (default: 1s)
    #[serde(default = "default_lookup_timeout", with = "millis_serde")]
    pub lookup_timeout: Duration,

    /// Poll interval while a metadata placeholder resolves (default: 500ms)
    #[serde(default = "default_metadata_poll_interval", with = "millis_serde")]
    pub metadata_poll_interval: Duration,

    /// Delay before a metadata placeholder's task record is looked up (default: 1s)
    #[serde(default = "default_settle_delay", with = "millis_serde")]
    pub metadata_settle_delay: Duration,

    /// Delay before re-reading the size of a direct transfer (default: 3s)
    #[serde(default = "default_size_settle_delay", with = "millis_serde")]
    pub size_settle_delay: Duration,

    /// Grace period before a stop is treated as a dead transfer (default: 6s)
    #[serde(default = "default_stop_grace_period", with = "millis_serde")]
    pub stop_grace_period: Duration,

    /// Delay before acting on a torrent's data completion (default: 1s)
    #[serde(default = "default_settle_delay", with = "millis_serde")]
    pub bt_settle_delay: Duration,

    /// Idle period on the notification stream before logging a heartbeat (default: 60s)
    #[serde(default = "default_notification_idle_timeout", with = "millis_serde")]
    pub notification_idle_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: default_lookup_timeout(),
            metadata_poll_interval: default_metadata_poll_interval(),
            metadata_settle_delay: default_settle_delay(),
            size_settle_delay: default_size_settle_delay(),
            stop_grace_period: default_stop_grace_period(),
            bt_settle_delay: default_settle_delay(),
            notification_idle_timeout: default_notification_idle_timeout(),
        }
    }
}

/// Main configuration for the dispatcher
///
/// - [`limits`](LimitsConfig) - admission limits
/// - [`duplicate`](DuplicateConfig) - remote-storage duplicate detection
/// - [`selection`](SelectionConfig) - interactive file selection
/// - [`timing`](TimingConfig) - handler delays and timeouts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory transfers are written to; probed for the storage threshold
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Admission limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Duplicate detection
    #[serde(default)]
    pub duplicate: DuplicateConfig,

    /// Interactive selection UI
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Handler timing
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            limits: LimitsConfig::default(),
            duplicate: DuplicateConfig::default(),
            selection: SelectionConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        for (key, value) in self.limits.gb_limits() {
            if let Some(gb) = value
                && (!gb.is_finite() || gb < 0.0)
            {
                return Err(Error::config(
                    key,
                    format!("limit must be a non-negative number of GiB, got {gb}"),
                ));
            }
        }

        if self.timing.metadata_poll_interval.is_zero() {
            return Err(Error::config(
                "metadata_poll_interval",
                "poll interval must be greater than zero",
            ));
        }

        if let Some(base_url) = &self.selection.base_url {
            let parsed = url::Url::parse(base_url)
                .map_err(|e| Error::config("base_url", format!("invalid URL: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::config(
                    "base_url",
                    format!("expected an http(s) URL, got scheme '{}'", parsed.scheme()),
                ));
            }
        }

        Ok(())
    }

    /// Base URL of the selection UI, without a trailing slash
    pub fn selection_base_url(&self) -> Option<&str> {
        self.selection
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }
}

/// Convert a GiB limit to bytes
pub fn gib_to_bytes(gb: f64) -> u64 {
    (gb * GIB) as u64
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_metadata_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_size_settle_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_stop_grace_period() -> Duration {
    Duration::from_secs(6)
}

fn default_notification_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
