//! The file queue engine.
//!
//! [`FileQueue`] owns the broker's data directory and every operation the
//! HTTP layer exposes: topic lifecycle, batched appends, ranged reads, and
//! consumer-group cursors. Handlers consume it through the [`Queue`] trait so
//! tests can substitute a fake.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   topics/<topic>/<base>.dat|.log     segment pairs, see crate::segment
//!   groups/<group>/<topic>             8-byte next-offset cursors
//! ```
//!
//! ## Locking
//!
//! One `tokio::sync::Mutex` per topic serializes produce, rollover, and
//! truncation. Consume never takes the topic lock: it resolves a segment
//! from the name cache (or a fresh directory scan) and reads files the OS
//! already guarantees a consistent view of. Consumer-group cursors have
//! their own per-(group, topic) locks inside [`GroupStore`].

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use haraqa_core::types::valid_name;
use haraqa_core::TopicInfo;

use crate::cache::SegmentNameCache;
use crate::config::{QueueConfig, SyncPolicy};
use crate::error::{Error, Result};
use crate::groups::GroupStore;
use crate::segment::{self, ActiveSegment, IndexEntry, INDEX_ENTRY_LEN};

/// Filters applied by `list_topics`. All present filters must match.
#[derive(Debug, Default, Clone)]
pub struct TopicFilter {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub regex: Option<Regex>,
}

impl TopicFilter {
    pub fn matches(&self, name: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(suffix) = &self.suffix {
            if !name.ends_with(suffix.as_str()) {
                return false;
            }
        }
        if let Some(regex) = &self.regex {
            if !regex.is_match(name) {
                return false;
            }
        }
        true
    }
}

/// A resolved consume: everything the HTTP layer needs to answer with
/// headers plus a ranged read of the segment's `.log` file.
#[derive(Debug, Clone)]
pub struct ConsumeBatch {
    /// Absolute path of the `.log` file to serve from.
    pub log_path: PathBuf,
    /// Bare file name, e.g. `0000000000000000.log`.
    pub file_name: String,
    /// First byte of the batch inside the log.
    pub start_byte: u64,
    /// Total payload bytes across the batch.
    pub total_bytes: u64,
    /// Per-message sizes, in offset order.
    pub sizes: Vec<u64>,
    /// Append time of the first message.
    pub first_timestamp_ns: u64,
    /// Append time of the last message.
    pub last_timestamp_ns: u64,
}

impl ConsumeBatch {
    /// Number of messages in the batch.
    pub fn count(&self) -> u64 {
        self.sizes.len() as u64
    }

    /// Last byte of the batch, inclusive, for the `Range` header.
    pub fn end_byte(&self) -> u64 {
        self.start_byte + self.total_bytes.saturating_sub(1)
    }
}

/// Capability set the HTTP handlers are written against.
///
/// `limit <= 0` on consume means "all available from `id`"; a negative `id`
/// means "oldest available". A consume past the end of the topic resolves to
/// `Ok(None)`, the no-content signal.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn create_topic(&self, topic: &str) -> Result<()>;
    async fn delete_topic(&self, topic: &str) -> Result<()>;
    async fn list_topics(&self, filter: &TopicFilter) -> Result<Vec<String>>;
    async fn modify_topic(&self, topic: &str, truncate: Option<u64>) -> Result<TopicInfo>;
    async fn produce(&self, topic: &str, sizes: &[u64], body: Bytes) -> Result<()>;
    async fn consume(
        &self,
        group: Option<&str>,
        topic: &str,
        id: i64,
        limit: i64,
    ) -> Result<Option<ConsumeBatch>>;
    async fn offsets(&self, topic: &str) -> Result<TopicInfo>;
    async fn group_offset(&self, group: &str, topic: &str) -> Result<u64>;
    async fn commit_group_offset(&self, group: &str, topic: &str, next: u64) -> Result<()>;
    fn root_dir(&self) -> &Path;
    async fn close(&self);
}

#[derive(Debug)]
struct TopicState {
    dir: PathBuf,
    active: Option<ActiveSegment>,
    last_sync: Instant,
}

impl TopicState {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            active: None,
            last_sync: Instant::now(),
        }
    }
}

/// Disk-backed queue engine rooted at `config.root`.
pub struct FileQueue {
    config: QueueConfig,
    topics_dir: PathBuf,
    topics: RwLock<HashMap<String, Arc<Mutex<TopicState>>>>,
    cache: SegmentNameCache,
    groups: GroupStore,
}

impl FileQueue {
    /// Open the queue, creating the directory skeleton and repairing the
    /// active segment of every existing topic.
    pub async fn open(config: QueueConfig) -> Result<Self> {
        let topics_dir = config.root.join("topics");
        let groups_dir = config.root.join("groups");
        fs::create_dir_all(&topics_dir).await?;
        fs::create_dir_all(&groups_dir).await?;

        let mut topics = HashMap::new();
        let mut entries = fs::read_dir(&topics_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(path = %entry.path().display(), "skipping non-utf8 topic directory");
                continue;
            };
            let dir = entry.path();
            let mut state = TopicState::new(dir.clone());
            let bases = scan_bases(&dir).await?;
            if let Some(&head) = bases.first() {
                // open runs tail repair on the segment that was receiving
                // appends when the process last stopped
                state.active = Some(ActiveSegment::open(&dir, head).await?);
            }
            topics.insert(name.to_string(), Arc::new(Mutex::new(state)));
        }

        info!(
            root = %config.root.display(),
            topics = topics.len(),
            "file queue opened"
        );

        Ok(Self {
            topics_dir,
            topics: RwLock::new(topics),
            cache: SegmentNameCache::new(config.cache_size),
            groups: GroupStore::new(groups_dir),
            config,
        })
    }

    async fn topic_state(&self, topic: &str) -> Option<Arc<Mutex<TopicState>>> {
        self.topics.read().await.get(topic).cloned()
    }

    /// Get-or-create used by produce when `create_on_produce` is on.
    async fn ensure_topic_state(&self, topic: &str) -> Result<Arc<Mutex<TopicState>>> {
        let mut topics = self.topics.write().await;
        if let Some(state) = topics.get(topic) {
            return Ok(state.clone());
        }
        let dir = self.topics_dir.join(topic);
        fs::create_dir_all(&dir).await?;
        let state = Arc::new(Mutex::new(TopicState::new(dir)));
        topics.insert(topic.to_string(), state.clone());
        info!(topic, "topic created on produce");
        Ok(state)
    }

    /// Scan the topic directory and replace its cache entry.
    async fn refresh_bases(&self, topic: &str, dir: &Path) -> Result<Arc<Vec<u64>>> {
        let bases = Arc::new(scan_bases_checked(dir).await?);
        self.cache.store(topic, bases.clone()).await;
        Ok(bases)
    }

    /// Attempt one ranged read against a (possibly stale) segment listing.
    /// `Ok(None)` means the listing did not cover `start_id`.
    async fn try_read(
        &self,
        dir: &Path,
        bases: &[u64],
        start_id: u64,
        limit: i64,
    ) -> Result<Option<ConsumeBatch>> {
        // listing is sorted descending: first base at or below the id wins
        let Some(base) = bases.iter().copied().find(|b| *b <= start_id) else {
            return Ok(None);
        };

        let mut dat = match File::open(segment::dat_path(dir, base)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let total_entries = dat.metadata().await?.len() / INDEX_ENTRY_LEN;
        let rel = start_id - base;
        if rel >= total_entries {
            return Ok(None);
        }

        let avail = total_entries - rel;
        let take = if limit <= 0 {
            avail
        } else {
            (limit as u64).min(avail)
        };

        dat.seek(SeekFrom::Start(rel * INDEX_ENTRY_LEN)).await?;
        let mut raw = vec![0u8; (take * INDEX_ENTRY_LEN) as usize];
        dat.read_exact(&mut raw).await?;

        let entries: Vec<IndexEntry> = raw
            .chunks_exact(INDEX_ENTRY_LEN as usize)
            .map(IndexEntry::decode)
            .collect();
        let sizes: Vec<u64> = entries.iter().map(|e| e.size).collect();
        let total_bytes = sizes.iter().sum();

        Ok(Some(ConsumeBatch {
            log_path: segment::log_path(dir, base),
            file_name: format!("{}.{}", segment::base_name(base), segment::LOG_EXT),
            start_byte: entries[0].position,
            total_bytes,
            sizes,
            first_timestamp_ns: entries[0].timestamp_ns,
            last_timestamp_ns: entries[entries.len() - 1].timestamp_ns,
        }))
    }

    /// `{min, max}` computed from a descending base listing.
    async fn topic_info(&self, dir: &Path, bases: &[u64]) -> Result<TopicInfo> {
        let Some(&head) = bases.first() else {
            return Ok(TopicInfo {
                min_offset: 0,
                max_offset: 0,
            });
        };
        let entries = match fs::metadata(segment::dat_path(dir, head)).await {
            Ok(meta) => meta.len() / INDEX_ENTRY_LEN,
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        Ok(TopicInfo {
            min_offset: bases[bases.len() - 1],
            max_offset: head + entries,
        })
    }
}

#[async_trait]
impl Queue for FileQueue {
    async fn create_topic(&self, topic: &str) -> Result<()> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        let mut topics = self.topics.write().await;
        let dir = self.topics_dir.join(topic);
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::TopicAlreadyExists)
            }
            Err(err) => return Err(err.into()),
        }
        topics.insert(topic.to_string(), Arc::new(Mutex::new(TopicState::new(dir))));
        info!(topic, "topic created");
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        let state = {
            let mut topics = self.topics.write().await;
            topics.remove(topic)
        };
        if let Some(state) = state {
            // close the active handle before the files go away
            state.lock().await.active = None;
        }
        match fs::remove_dir_all(self.topics_dir.join(topic)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::TopicDoesNotExist)
            }
            Err(err) => return Err(err.into()),
        }
        self.cache.invalidate(topic).await;
        self.groups.remove_topic(topic).await;
        info!(topic, "topic deleted");
        Ok(())
    }

    async fn list_topics(&self, filter: &TopicFilter) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.topics_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if filter.matches(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    async fn modify_topic(&self, topic: &str, truncate: Option<u64>) -> Result<TopicInfo> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        let dir = self.topics_dir.join(topic);

        // hold the topic lock so truncation cannot race a rollover
        let state = self.topic_state(topic).await;
        let _guard = match &state {
            Some(state) => Some(state.lock().await),
            None => None,
        };

        if let Some(target) = truncate {
            let bases = scan_bases_checked(&dir).await?;
            // the head segment keeps receiving appends and is never deleted,
            // so max_offset survives any truncation target
            for &base in bases.iter().skip(1) {
                let entries = match fs::metadata(segment::dat_path(&dir, base)).await {
                    Ok(meta) => meta.len() / INDEX_ENTRY_LEN,
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(err.into()),
                };
                if base + entries <= target {
                    fs::remove_file(segment::dat_path(&dir, base)).await?;
                    fs::remove_file(segment::log_path(&dir, base)).await?;
                    info!(topic, base, target, "segment removed by truncate");
                }
            }
            self.cache.invalidate(topic).await;
        }

        let bases = scan_bases_checked(&dir).await?;
        self.topic_info(&dir, &bases).await
    }

    async fn produce(&self, topic: &str, sizes: &[u64], body: Bytes) -> Result<()> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        let total: u64 = sizes.iter().sum();
        if total != body.len() as u64 {
            return Err(Error::SizeMismatch);
        }
        if sizes.is_empty() {
            return Ok(());
        }

        let state = match self.topic_state(topic).await {
            Some(state) => state,
            None if self.config.create_on_produce => self.ensure_topic_state(topic).await?,
            None => return Err(Error::TopicDoesNotExist),
        };
        let mut state = state.lock().await;

        let mut active = match state.active.take() {
            Some(active) => active,
            None => {
                let bases = scan_bases_checked(&state.dir).await?;
                let base = bases.first().copied().unwrap_or(0);
                let active = ActiveSegment::open(&state.dir, base).await?;
                if bases.is_empty() {
                    // first segment of the topic just appeared on disk
                    self.cache.invalidate(topic).await;
                }
                active
            }
        };

        let over_entries = active.entries() + sizes.len() as u64 > self.config.max_entries;
        let over_bytes = active.log_len() + body.len() as u64 > self.config.max_segment_bytes;
        if active.entries() > 0 && (over_entries || over_bytes) {
            active.sync().await?;
            let next_base = active.next_offset();
            info!(topic, base = next_base, "rolling segment");
            active = ActiveSegment::open(&state.dir, next_base).await?;
            self.cache.invalidate(topic).await;
        }

        active.append(sizes, &body, unix_nanos()).await?;

        match self.config.sync {
            SyncPolicy::Batch => active.sync().await?,
            SyncPolicy::Interval { interval } => {
                if state.last_sync.elapsed() >= interval {
                    active.sync().await?;
                    state.last_sync = Instant::now();
                }
            }
            SyncPolicy::Off => {}
        }

        state.active = Some(active);
        Ok(())
    }

    async fn consume(
        &self,
        group: Option<&str>,
        topic: &str,
        id: i64,
        limit: i64,
    ) -> Result<Option<ConsumeBatch>> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        if let Some(group) = group {
            if !valid_name(group) {
                return Err(Error::InvalidName);
            }
        }
        let dir = self.topics_dir.join(topic);

        let (mut bases, mut fresh) = match self.cache.get(topic).await {
            Some(bases) => (bases, false),
            None => (self.refresh_bases(topic, &dir).await?, true),
        };

        loop {
            let start_id = if id < 0 {
                bases.last().copied().unwrap_or(0)
            } else {
                id as u64
            };

            if let Some(batch) = self.try_read(&dir, &bases, start_id, limit).await? {
                if let Some(group) = group {
                    self.groups
                        .commit(group, topic, start_id + batch.count())
                        .await?;
                }
                return Ok(Some(batch));
            }
            if fresh {
                return Ok(None);
            }
            // cached listing may predate a rollover; rescan once
            bases = self.refresh_bases(topic, &dir).await?;
            fresh = true;
        }
    }

    async fn offsets(&self, topic: &str) -> Result<TopicInfo> {
        if !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        let dir = self.topics_dir.join(topic);
        let bases = scan_bases_checked(&dir).await?;
        self.topic_info(&dir, &bases).await
    }

    async fn group_offset(&self, group: &str, topic: &str) -> Result<u64> {
        if !valid_name(group) || !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        Ok(self.groups.get(group, topic).await?)
    }

    async fn commit_group_offset(&self, group: &str, topic: &str, next: u64) -> Result<()> {
        if !valid_name(group) || !valid_name(topic) {
            return Err(Error::InvalidName);
        }
        Ok(self.groups.commit(group, topic, next).await?)
    }

    fn root_dir(&self) -> &Path {
        &self.config.root
    }

    async fn close(&self) {
        let topics = self.topics.write().await;
        for (name, state) in topics.iter() {
            let mut state = state.lock().await;
            if let Some(active) = state.active.as_mut() {
                if let Err(err) = active.sync().await {
                    warn!(topic = %name, error = %err, "sync on close failed");
                }
            }
            state.active = None;
        }
        info!("file queue closed");
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

/// Descending list of segment base offsets in `dir`.
async fn scan_bases(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut bases = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if let Some(base) = segment::parse_dat_name(name) {
                bases.push(base);
            }
        }
    }
    bases.sort_unstable_by(|a, b| b.cmp(a));
    Ok(bases)
}

/// Like [`scan_bases`], mapping a missing directory to `TopicDoesNotExist`.
async fn scan_bases_checked(dir: &Path) -> Result<Vec<u64>> {
    match scan_bases(dir).await {
        Ok(bases) => Ok(bases),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::TopicDoesNotExist),
        Err(err) => Err(err.into()),
    }
}
