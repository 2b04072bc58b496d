//! Integration tests for the file queue engine against a real (temporary)
//! data directory: produce/consume round trips, rollover, truncation,
//! recovery, and consumer-group cursors.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use haraqa_storage::segment::INDEX_ENTRY_LEN;
use haraqa_storage::{
    ConsumeBatch, Error, FileQueue, IndexEntry, Queue, QueueConfig, SyncPolicy, TopicFilter,
};

fn config(dir: &TempDir) -> QueueConfig {
    QueueConfig::new(dir.path())
}

fn small_segments(dir: &TempDir, max_entries: u64) -> QueueConfig {
    let mut config = config(dir);
    config.max_entries = max_entries;
    config
}

/// Read the payload bytes a batch points at, the way the HTTP layer serves
/// them.
async fn batch_bytes(batch: &ConsumeBatch) -> Vec<u8> {
    let mut file = tokio::fs::File::open(&batch.log_path).await.unwrap();
    file.seek(SeekFrom::Start(batch.start_byte)).await.unwrap();
    let mut buf = vec![0u8; batch.total_bytes as usize];
    file.read_exact(&mut buf).await.unwrap();
    buf
}

/// Split batch payload back into individual messages.
async fn batch_messages(batch: &ConsumeBatch) -> Vec<Vec<u8>> {
    let raw = batch_bytes(batch).await;
    let mut messages = Vec::with_capacity(batch.sizes.len());
    let mut at = 0usize;
    for &size in &batch.sizes {
        messages.push(raw[at..at + size as usize].to_vec());
        at += size as usize;
    }
    messages
}

async fn produce_strs(queue: &FileQueue, topic: &str, msgs: &[&str]) {
    let sizes: Vec<u64> = msgs.iter().map(|m| m.len() as u64).collect();
    let body: Vec<u8> = msgs.iter().flat_map(|m| m.bytes()).collect();
    queue.produce(topic, &sizes, Bytes::from(body)).await.unwrap();
}

// ---------------------------------------------------------------
// Topic lifecycle
// ---------------------------------------------------------------

#[tokio::test]
async fn create_delete_round_trip() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();

    queue.create_topic("orders").await.unwrap();
    assert!(matches!(
        queue.create_topic("orders").await,
        Err(Error::TopicAlreadyExists)
    ));

    queue.delete_topic("orders").await.unwrap();
    assert!(matches!(
        queue.delete_topic("orders").await,
        Err(Error::TopicDoesNotExist)
    ));
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();

    for bad in ["", "..", "a/b", "a b"] {
        assert!(matches!(
            queue.create_topic(bad).await,
            Err(Error::InvalidName)
        ));
    }
    assert!(matches!(
        queue.consume(Some("bad group"), "t", 0, -1).await,
        Err(Error::InvalidName)
    ));
}

#[tokio::test]
async fn list_topics_filters() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();

    for name in ["orders", "orders-dlq", "billing", "billing-dlq"] {
        queue.create_topic(name).await.unwrap();
    }

    let all = queue.list_topics(&TopicFilter::default()).await.unwrap();
    assert_eq!(all, vec!["billing", "billing-dlq", "orders", "orders-dlq"]);

    let filter = TopicFilter {
        prefix: Some("orders".to_string()),
        ..Default::default()
    };
    assert_eq!(
        queue.list_topics(&filter).await.unwrap(),
        vec!["orders", "orders-dlq"]
    );

    let filter = TopicFilter {
        suffix: Some("-dlq".to_string()),
        ..Default::default()
    };
    assert_eq!(
        queue.list_topics(&filter).await.unwrap(),
        vec!["billing-dlq", "orders-dlq"]
    );

    let filter = TopicFilter {
        regex: Some(regex::Regex::new("^bill").unwrap()),
        ..Default::default()
    };
    assert_eq!(
        queue.list_topics(&filter).await.unwrap(),
        vec!["billing", "billing-dlq"]
    );

    let filter = TopicFilter {
        prefix: Some("orders".to_string()),
        suffix: Some("-dlq".to_string()),
        ..Default::default()
    };
    assert_eq!(queue.list_topics(&filter).await.unwrap(), vec!["orders-dlq"]);
}

// ---------------------------------------------------------------
// Produce / consume round trips
// ---------------------------------------------------------------

#[tokio::test]
async fn append_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["a", "bb", "ccc"]).await;

    let batch = queue.consume(None, "t", 0, 3).await.unwrap().unwrap();
    assert_eq!(batch.sizes, vec![1, 2, 3]);
    assert_eq!(batch.start_byte, 0);
    assert_eq!(batch.end_byte(), 5);
    assert_eq!(batch.file_name, "0000000000000000.log");
    assert_eq!(batch_bytes(&batch).await, b"abbccc");
}

#[tokio::test]
async fn consume_from_middle_with_limit() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["m0", "m1", "m2", "m3", "m4"]).await;

    let batch = queue.consume(None, "t", 1, 2).await.unwrap().unwrap();
    assert_eq!(
        batch_messages(&batch).await,
        vec![b"m1".to_vec(), b"m2".to_vec()]
    );

    // limit past the end clamps to what exists
    let batch = queue.consume(None, "t", 3, 100).await.unwrap().unwrap();
    assert_eq!(
        batch_messages(&batch).await,
        vec![b"m3".to_vec(), b"m4".to_vec()]
    );

    // limit <= 0 means everything
    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch.count(), 5);
}

#[tokio::test]
async fn consume_past_end_is_no_content() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    // empty topic
    assert!(queue.consume(None, "t", 0, -1).await.unwrap().is_none());

    produce_strs(&queue, "t", &["a", "b", "c"]).await;
    assert!(queue.consume(None, "t", 3, -1).await.unwrap().is_none());
    assert!(queue.consume(None, "t", 1000, -1).await.unwrap().is_none());
}

#[tokio::test]
async fn consume_missing_topic_fails() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    assert!(matches!(
        queue.consume(None, "ghost", 0, -1).await,
        Err(Error::TopicDoesNotExist)
    ));
}

#[tokio::test]
async fn produce_validates_sizes_against_body() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    assert!(matches!(
        queue.produce("t", &[1, 2], Bytes::from_static(b"toolong")).await,
        Err(Error::SizeMismatch)
    ));
    // empty batch is a no-op
    queue.produce("t", &[], Bytes::new()).await.unwrap();
    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 0));
}

#[tokio::test]
async fn produce_missing_topic_respects_create_flag() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    assert!(matches!(
        queue.produce("ghost", &[1], Bytes::from_static(b"x")).await,
        Err(Error::TopicDoesNotExist)
    ));

    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir);
    cfg.create_on_produce = true;
    let queue = FileQueue::open(cfg).await.unwrap();
    queue.produce("ghost", &[1], Bytes::from_static(b"x")).await.unwrap();
    let batch = queue.consume(None, "ghost", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch_bytes(&batch).await, b"x");
}

// ---------------------------------------------------------------
// Offsets, rollover, contiguity
// ---------------------------------------------------------------

#[tokio::test]
async fn offsets_track_appends() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 0));

    produce_strs(&queue, "t", &["a", "b", "c"]).await;
    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 3));

    assert!(matches!(
        queue.offsets("ghost").await,
        Err(Error::TopicDoesNotExist)
    ));
}

#[tokio::test]
async fn rollover_starts_contiguous_segments() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(small_segments(&dir, 2)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    for msg in ["m0", "m1", "m2", "m3", "m4"] {
        produce_strs(&queue, "t", &[msg]).await;
    }

    let topic_dir = dir.path().join("topics/t");
    let mut dats: Vec<String> = std::fs::read_dir(&topic_dir)
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|n| n.ends_with(".dat"))
        .collect();
    dats.sort();
    assert_eq!(
        dats,
        vec![
            "0000000000000000.dat",
            "0000000000000002.dat",
            "0000000000000004.dat"
        ]
    );

    // starting offsets are contiguous: start(S+1) == start(S) + entries(S)
    let mut expected_start = 0u64;
    for name in &dats {
        let base: u64 = name.trim_end_matches(".dat").parse().unwrap();
        assert_eq!(base, expected_start);
        let entries =
            std::fs::metadata(topic_dir.join(name)).unwrap().len() / INDEX_ENTRY_LEN;
        expected_start += entries;
    }

    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 5));

    // reads spanning the rollover still resolve
    let batch = queue.consume(None, "t", 2, 1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m2".to_vec()]);
    let batch = queue.consume(None, "t", 4, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m4".to_vec()]);
}

#[tokio::test]
async fn rollover_on_byte_threshold() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir);
    cfg.max_segment_bytes = 8;
    let queue = FileQueue::open(cfg).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["aaaaa"]).await; // 5 bytes
    produce_strs(&queue, "t", &["bbbbb"]).await; // would exceed 8, rolls

    let topic_dir = dir.path().join("topics/t");
    assert!(topic_dir.join("0000000000000001.dat").exists());

    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 2));
}

#[tokio::test]
async fn index_entries_are_contiguous_within_each_segment() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(small_segments(&dir, 3)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["a", "bb"]).await;
    produce_strs(&queue, "t", &["ccc"]).await;
    produce_strs(&queue, "t", &["dddd", "e"]).await;

    let topic_dir = dir.path().join("topics/t");
    for entry in std::fs::read_dir(&topic_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("dat") {
            continue;
        }
        let raw = std::fs::read(&path).unwrap();
        let entries: Vec<IndexEntry> = raw
            .chunks_exact(INDEX_ENTRY_LEN as usize)
            .map(IndexEntry::decode)
            .collect();
        for pair in entries.windows(2) {
            assert_eq!(pair[1].position, pair[0].position + pair[0].size);
        }
        // log length equals the sum of recorded sizes
        let log = path.with_extension("log");
        let total: u64 = entries.iter().map(|e| e.size).sum();
        assert_eq!(std::fs::metadata(log).unwrap().len(), total);
    }
}

// ---------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------

#[tokio::test]
async fn truncate_removes_whole_old_segments() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(small_segments(&dir, 1)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    for msg in ["m0", "m1", "m2"] {
        produce_strs(&queue, "t", &[msg]).await;
    }

    let info = queue.modify_topic("t", Some(2)).await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (2, 3));

    // reads below the new min offset are no-content
    assert!(queue.consume(None, "t", 0, -1).await.unwrap().is_none());
    assert!(queue.consume(None, "t", 1, -1).await.unwrap().is_none());

    // retained data still reads back
    let batch = queue.consume(None, "t", 2, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m2".to_vec()]);

    // id = -1 resolves to the new oldest message
    let batch = queue.consume(None, "t", -1, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m2".to_vec()]);
}

#[tokio::test]
async fn truncate_never_deletes_the_active_segment() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["a", "b", "c"]).await;

    // all three messages live in one segment: truncation keeps it whole
    let info = queue.modify_topic("t", Some(2)).await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 3));

    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch.count(), 3);
}

#[tokio::test]
async fn truncate_then_append_keeps_growing() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(small_segments(&dir, 1)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    for msg in ["m0", "m1", "m2"] {
        produce_strs(&queue, "t", &[msg]).await;
    }
    queue.modify_topic("t", Some(3)).await.unwrap();

    produce_strs(&queue, "t", &["m3"]).await;
    let info = queue.offsets("t").await.unwrap();
    // max offset keeps climbing, untouched by the truncate
    assert_eq!((info.min_offset, info.max_offset), (2, 4));

    let batch = queue.consume(None, "t", 3, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m3".to_vec()]);
}

#[tokio::test]
async fn modify_without_truncate_reports_offsets() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();
    produce_strs(&queue, "t", &["a", "b"]).await;

    let info = queue.modify_topic("t", None).await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 2));

    assert!(matches!(
        queue.modify_topic("ghost", Some(1)).await,
        Err(Error::TopicDoesNotExist)
    ));
}

// ---------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------

#[tokio::test]
async fn concurrent_producers_serialize_whole_batches() {
    let dir = TempDir::new().unwrap();
    let queue = Arc::new(FileQueue::open(config(&dir)).await.unwrap());
    queue.create_topic("t").await.unwrap();

    let mut tasks = Vec::new();
    for producer in 0u8..8 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            // batch of three messages, all tagged with the producer id
            let msgs: Vec<Vec<u8>> = (0..3).map(|i| vec![producer, i, producer]).collect();
            let sizes: Vec<u64> = msgs.iter().map(|m| m.len() as u64).collect();
            let body: Vec<u8> = msgs.concat();
            queue.produce("t", &sizes, Bytes::from(body)).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch.count(), 24);
    let messages = batch_messages(&batch).await;

    // batches never interleave: each producer's three messages are adjacent
    for window in messages.chunks(3) {
        let tag = window[0][0];
        for (i, msg) in window.iter().enumerate() {
            assert_eq!(msg, &vec![tag, i as u8, tag]);
        }
    }

    // and every producer's batch is present exactly once
    let mut tags: Vec<u8> = messages.chunks(3).map(|w| w[0][0]).collect();
    tags.sort_unstable();
    assert_eq!(tags, (0u8..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn consume_after_rollover_resolves_new_segment() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(small_segments(&dir, 2)).await.unwrap();
    queue.create_topic("t").await.unwrap();

    produce_strs(&queue, "t", &["m0", "m1"]).await;
    // populate the cache with the single-segment listing
    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch.count(), 2);

    // roll to a second segment, then read an offset only the new one covers
    produce_strs(&queue, "t", &["m2"]).await;
    let batch = queue.consume(None, "t", 2, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"m2".to_vec()]);
}

// ---------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------

#[tokio::test]
async fn reopen_recovers_torn_log_tail() {
    let dir = TempDir::new().unwrap();
    {
        let queue = FileQueue::open(config(&dir)).await.unwrap();
        queue.create_topic("t").await.unwrap();
        produce_strs(&queue, "t", &["aaa", "bbb"]).await;
        queue.close().await;
    }

    // torn write past the last recorded size
    let log = dir.path().join("topics/t/0000000000000000.log");
    let mut raw = std::fs::read(&log).unwrap();
    raw.extend_from_slice(b"torn");
    std::fs::write(&log, &raw).unwrap();

    let queue = FileQueue::open(config(&dir)).await.unwrap();
    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 2));
    assert_eq!(std::fs::metadata(&log).unwrap().len(), 6);

    produce_strs(&queue, "t", &["ccc"]).await;
    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(
        batch_messages(&batch).await,
        vec![b"aaa".to_vec(), b"bbb".to_vec(), b"ccc".to_vec()]
    );
}

#[tokio::test]
async fn reopen_recovers_torn_index() {
    let dir = TempDir::new().unwrap();
    {
        let queue = FileQueue::open(config(&dir)).await.unwrap();
        queue.create_topic("t").await.unwrap();
        produce_strs(&queue, "t", &["aaa", "bbb"]).await;
        queue.close().await;
    }

    // .dat length no longer a multiple of the entry size
    let dat = dir.path().join("topics/t/0000000000000000.dat");
    let mut raw = std::fs::read(&dat).unwrap();
    raw.truncate(raw.len() - 7);
    std::fs::write(&dat, &raw).unwrap();

    let queue = FileQueue::open(config(&dir)).await.unwrap();
    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 1));

    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(batch_messages(&batch).await, vec![b"aaa".to_vec()]);
}

// ---------------------------------------------------------------
// Consumer groups
// ---------------------------------------------------------------

#[tokio::test]
async fn consume_with_group_advances_cursor() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();
    produce_strs(&queue, "t", &["a", "b", "c", "d"]).await;

    assert_eq!(queue.group_offset("g", "t").await.unwrap(), 0);

    let batch = queue.consume(Some("g"), "t", 0, 2).await.unwrap().unwrap();
    assert_eq!(batch.count(), 2);
    assert_eq!(queue.group_offset("g", "t").await.unwrap(), 2);

    let batch = queue.consume(Some("g"), "t", 2, -1).await.unwrap().unwrap();
    assert_eq!(batch.count(), 2);
    assert_eq!(queue.group_offset("g", "t").await.unwrap(), 4);

    // a consume with no data does not move the cursor
    assert!(queue.consume(Some("g"), "t", 4, -1).await.unwrap().is_none());
    assert_eq!(queue.group_offset("g", "t").await.unwrap(), 4);
}

#[tokio::test]
async fn explicit_commit_overrides_cursor() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();
    produce_strs(&queue, "t", &["a", "b", "c"]).await;

    queue.commit_group_offset("g", "t", 1).await.unwrap();
    assert_eq!(queue.group_offset("g", "t").await.unwrap(), 1);
}

#[tokio::test]
async fn delete_topic_drops_group_cursors() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    queue.create_topic("t").await.unwrap();
    produce_strs(&queue, "t", &["a"]).await;

    queue.consume(Some("g"), "t", 0, -1).await.unwrap().unwrap();
    assert!(dir.path().join("groups/g/t").exists());

    queue.delete_topic("t").await.unwrap();
    assert!(!dir.path().join("groups/g/t").exists());
}

// ---------------------------------------------------------------
// Durability policies
// ---------------------------------------------------------------

#[tokio::test]
async fn sync_policies_all_accept_appends() {
    for sync in [
        SyncPolicy::Off,
        SyncPolicy::Batch,
        SyncPolicy::Interval {
            interval: std::time::Duration::from_millis(50),
        },
    ] {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.sync = sync;
        let queue = FileQueue::open(cfg).await.unwrap();
        queue.create_topic("t").await.unwrap();
        produce_strs(&queue, "t", &["x", "yy"]).await;
        let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
        assert_eq!(batch_bytes(&batch).await, b"xyy");
    }
}

#[tokio::test]
async fn restart_preserves_data_across_open() {
    let dir = TempDir::new().unwrap();
    {
        let queue = FileQueue::open(config(&dir)).await.unwrap();
        queue.create_topic("t").await.unwrap();
        produce_strs(&queue, "t", &["one", "two"]).await;
        queue.close().await;
    }
    let queue = FileQueue::open(config(&dir)).await.unwrap();
    produce_strs(&queue, "t", &["three"]).await;

    let batch = queue.consume(None, "t", 0, -1).await.unwrap().unwrap();
    assert_eq!(
        batch_messages(&batch).await,
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
    let info = queue.offsets("t").await.unwrap();
    assert_eq!((info.min_offset, info.max_offset), (0, 3));
}
