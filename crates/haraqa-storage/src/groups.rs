//! Consumer-group cursors.
//!
//! Each (group, topic) pair owns one file under `<root>/groups/<group>/<topic>`
//! holding the group's next offset to consume as 8 little-endian bytes. An
//! absent file means "start at 0". Writes to the same cursor are serialized
//! through a per-pair lock; different pairs never contend.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug)]
pub(crate) struct GroupStore {
    root: PathBuf,
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl GroupStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, group: &str, topic: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((group.to_string(), topic.to_string()))
            .or_default()
            .clone()
    }

    fn cursor_path(&self, group: &str, topic: &str) -> PathBuf {
        self.root.join(group).join(topic)
    }

    /// Next offset the group should consume from; 0 when never committed.
    pub async fn get(&self, group: &str, topic: &str) -> std::io::Result<u64> {
        let guard = self.lock_for(group, topic).await;
        let _held = guard.lock().await;

        match fs::read(self.cursor_path(group, topic)).await {
            Ok(raw) if raw.len() == 8 => Ok(u64::from_le_bytes(raw.try_into().unwrap())),
            Ok(raw) => {
                warn!(group, topic, len = raw.len(), "malformed cursor file, resetting to 0");
                Ok(0)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Store `next` as the group's cursor for `topic`.
    pub async fn commit(&self, group: &str, topic: &str, next: u64) -> std::io::Result<()> {
        let guard = self.lock_for(group, topic).await;
        let _held = guard.lock().await;

        fs::create_dir_all(self.root.join(group)).await?;
        fs::write(self.cursor_path(group, topic), next.to_le_bytes()).await
    }

    /// Drop every group's cursor for a deleted topic. Best effort; failures
    /// are logged and swallowed so topic deletion itself still succeeds.
    pub async fn remove_topic(&self, topic: &str) {
        let mut groups = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return,
            Err(err) => {
                warn!(topic, error = %err, "listing groups dir failed");
                return;
            }
        };
        while let Ok(Some(entry)) = groups.next_entry().await {
            let cursor = entry.path().join(topic);
            match fs::remove_file(&cursor).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(topic, path = %cursor.display(), error = %err, "removing cursor failed"),
            }
        }
        self.locks
            .lock()
            .await
            .retain(|(_, cursor_topic), _| cursor_topic != topic);
    }
}
