//! Queue engine configuration.
//!
//! All knobs the broker exposes through `HARAQA_*` environment variables land
//! here. The serde defaults keep hand-written config files short; `FromStr`
//! on [`SyncPolicy`] parses the `off` / `batch` / `interval=Nms` forms the
//! `HARAQA_FSYNC` variable uses.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Data directory. Topics live under `<root>/topics`, consumer-group
    /// cursors under `<root>/groups`.
    pub root: PathBuf,

    /// Segment rollover threshold in index entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Segment rollover threshold in log bytes.
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,

    /// Durability policy applied after each produce batch.
    #[serde(default)]
    pub sync: SyncPolicy,

    /// Create a topic implicitly on first produce instead of rejecting it.
    #[serde(default)]
    pub create_on_produce: bool,

    /// Capacity of the segment-name cache, in topics.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl QueueConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_entries: default_max_entries(),
            max_segment_bytes: default_max_segment_bytes(),
            sync: SyncPolicy::default(),
            create_on_produce: false,
            cache_size: default_cache_size(),
        }
    }
}

/// When to fsync the active segment files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Never fsync; leave flushing to the OS (fastest, least safe).
    Off,

    /// Fsync after every produce batch (safest, slowest).
    Batch,

    /// Fsync at most once per interval (balanced).
    Interval {
        #[serde(with = "duration_ms")]
        interval: Duration,
    },
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Batch
    }
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(SyncPolicy::Off),
            "batch" => Ok(SyncPolicy::Batch),
            _ => {
                let ms = s
                    .strip_prefix("interval=")
                    .and_then(|rest| rest.strip_suffix("ms"))
                    .and_then(|n| n.parse::<u64>().ok())
                    .ok_or_else(|| format!("invalid sync policy {s:?}"))?;
                Ok(SyncPolicy::Interval {
                    interval: Duration::from_millis(ms),
                })
            }
        }
    }
}

mod duration_ms {
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
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

fn default_max_entries() -> u64 {
    5000
}

fn default_max_segment_bytes() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_cache_size() -> usize {
    1024
}
