//! Segment files: the on-disk unit of a topic.
//!
//! A segment is a pair of sibling files named by the zero-padded starting
//! offset of their first message:
//!
//! ```text
//! 0000000000000000.dat      fixed-width index, one 32-byte entry per message
//! 0000000000000000.log      raw message bodies, concatenated in append order
//! ```
//!
//! ## Index entry layout (32 bytes, little-endian)
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────┐
//! │ base offset  │ append time  │ log position │ message size │
//! │ (8 bytes)    │ (unix nanos) │ (8 bytes)    │ (8 bytes)    │
//! └──────────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! Positions are relative to the start of the sibling `.log` file, so entry
//! `i+1` always starts at `position[i] + size[i]`. The 16-digit name width
//! makes lexicographic order equal numeric order, which is what segment
//! discovery relies on when it sorts a directory listing.
//!
//! ## Recovery
//!
//! [`ActiveSegment::open`] repairs torn tails before accepting appends: a
//! `.dat` whose length is not a multiple of 32 is cut back to the last whole
//! entry, entries pointing past the end of the `.log` are dropped, and `.log`
//! bytes beyond the last surviving entry are truncated away.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Size of one index entry in the `.dat` file.
pub const INDEX_ENTRY_LEN: u64 = 32;

/// Decimal digits in a segment base name, supporting 10^16 offsets per topic.
pub const SEGMENT_NAME_WIDTH: usize = 16;

pub const DAT_EXT: &str = "dat";
pub const LOG_EXT: &str = "log";

/// Zero-padded base name shared by a segment's `.dat` and `.log` files.
pub fn base_name(base_offset: u64) -> String {
    format!("{base_offset:0width$}", width = SEGMENT_NAME_WIDTH)
}

pub fn dat_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{DAT_EXT}", base_name(base_offset)))
}

pub fn log_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{LOG_EXT}", base_name(base_offset)))
}

/// Parse `0000000000000042.dat` back into `42`. Anything that is not a
/// 16-digit `.dat` name is ignored by segment discovery.
pub fn parse_dat_name(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".dat")?;
    if stem.len() != SEGMENT_NAME_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// One decoded `.dat` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Starting offset of the owning segment (marker field).
    pub base_offset: u64,
    /// Append time in unix nanoseconds, stamped once per batch.
    pub timestamp_ns: u64,
    /// Byte position of the message inside the sibling `.log`.
    pub position: u64,
    /// Message length in bytes.
    pub size: u64,
}

impl IndexEntry {
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.base_offset);
        buf.put_u64_le(self.timestamp_ns);
        buf.put_u64_le(self.position);
        buf.put_u64_le(self.size);
    }

    /// Decode one entry from a 32-byte chunk.
    pub fn decode(chunk: &[u8]) -> IndexEntry {
        debug_assert_eq!(chunk.len(), INDEX_ENTRY_LEN as usize);
        let u64_at = |at: usize| u64::from_le_bytes(chunk[at..at + 8].try_into().unwrap());
        IndexEntry {
            base_offset: u64_at(0),
            timestamp_ns: u64_at(8),
            position: u64_at(16),
            size: u64_at(24),
        }
    }
}

/// The segment currently receiving appends for one topic.
///
/// Not thread-safe on its own; the queue serializes access through the
/// per-topic lock.
#[derive(Debug)]
pub(crate) struct ActiveSegment {
    base_offset: u64,
    entries: u64,
    log_len: u64,
    dat: File,
    log: File,
}

impl ActiveSegment {
    /// Open (or create) the segment starting at `base_offset` inside `dir`,
    /// repairing any torn tail left by a crash or cancelled append.
    pub async fn open(dir: &Path, base_offset: u64) -> std::io::Result<Self> {
        let dat_path = dat_path(dir, base_offset);
        let log_path = log_path(dir, base_offset);

        let mut dat = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&dat_path)
            .await?;
        let log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&log_path)
            .await?;

        let dat_len = dat.metadata().await?.len();
        let log_len = log.metadata().await?.len();

        // Whole entries only.
        let mut usable = dat_len - dat_len % INDEX_ENTRY_LEN;

        let mut raw = vec![0u8; usable as usize];
        dat.seek(SeekFrom::Start(0)).await?;
        dat.read_exact(&mut raw).await?;

        // Keep the longest entry prefix fully covered by the log.
        let mut entries = 0u64;
        let mut covered = 0u64;
        for chunk in raw.chunks_exact(INDEX_ENTRY_LEN as usize) {
            let entry = IndexEntry::decode(chunk);
            let end = entry.position + entry.size;
            if end > log_len {
                break;
            }
            entries += 1;
            covered = end;
        }
        usable = entries * INDEX_ENTRY_LEN;

        if usable < dat_len {
            warn!(
                segment = %base_name(base_offset),
                dat_len,
                repaired = usable,
                "truncating torn index tail"
            );
            dat.set_len(usable).await?;
        }
        if covered < log_len {
            warn!(
                segment = %base_name(base_offset),
                log_len,
                repaired = covered,
                "truncating torn log tail"
            );
            log.set_len(covered).await?;
        }

        debug!(
            segment = %base_name(base_offset),
            entries,
            log_len = covered,
            "segment opened"
        );

        Ok(Self {
            base_offset,
            entries,
            log_len: covered,
            dat,
            log,
        })
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Number of index entries, which is also the message count.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn log_len(&self) -> u64 {
        self.log_len
    }

    /// Offset the next appended message will receive.
    pub fn next_offset(&self) -> u64 {
        self.base_offset + self.entries
    }

    /// Append one batch: an index entry per message, then the raw bodies.
    ///
    /// On any write failure both files are cut back to their pre-batch
    /// lengths before the error is returned, so a failed batch leaves no
    /// trace on disk.
    pub async fn append(
        &mut self,
        sizes: &[u64],
        body: &[u8],
        timestamp_ns: u64,
    ) -> std::io::Result<()> {
        // Drop any torn tail a cancelled append may have left behind the
        // tracked lengths.
        self.dat.set_len(self.entries * INDEX_ENTRY_LEN).await?;
        self.log.set_len(self.log_len).await?;

        let mut index = BytesMut::with_capacity(sizes.len() * INDEX_ENTRY_LEN as usize);
        let mut position = self.log_len;
        for &size in sizes {
            IndexEntry {
                base_offset: self.base_offset,
                timestamp_ns,
                position,
                size,
            }
            .encode_into(&mut index);
            position += size;
        }

        let result = async {
            self.dat.write_all(&index).await?;
            self.log.write_all(body).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(err) = result {
            if let Err(rollback) = self.rollback().await {
                warn!(
                    segment = %base_name(self.base_offset),
                    error = %rollback,
                    "rollback after failed append also failed"
                );
            }
            return Err(err);
        }

        self.entries += sizes.len() as u64;
        self.log_len += body.len() as u64;
        Ok(())
    }

    async fn rollback(&mut self) -> std::io::Result<()> {
        self.dat.set_len(self.entries * INDEX_ENTRY_LEN).await?;
        self.log.set_len(self.log_len).await
    }

    /// Flush both files to stable storage.
    pub async fn sync(&mut self) -> std::io::Result<()> {
        self.dat.sync_all().await?;
        self.log.sync_all().await
    }
}
