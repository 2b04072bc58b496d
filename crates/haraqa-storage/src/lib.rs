//! File-backed queue engine for the haraqa broker.
//!
//! Topics are append-only logs laid out on disk as segmented `.dat`/`.log`
//! file pairs; consumer groups keep an 8-byte cursor file per topic. The
//! [`FileQueue`] engine owns the data directory and exposes every broker
//! operation through the [`Queue`] trait the HTTP layer is written against.
//!
//! ```ignore
//! use haraqa_storage::{FileQueue, Queue, QueueConfig};
//!
//! let queue = FileQueue::open(QueueConfig::new("./data")).await?;
//! queue.create_topic("orders").await?;
//! queue.produce("orders", &[5, 5], body).await?;
//! let batch = queue.consume(None, "orders", 0, -1).await?;
//! ```

mod cache;
pub mod config;
pub mod error;
mod groups;
pub mod queue;
pub mod segment;

pub use config::{QueueConfig, SyncPolicy};
pub use error::{Error, Result};
pub use queue::{ConsumeBatch, FileQueue, Queue, TopicFilter};
pub use segment::{IndexEntry, INDEX_ENTRY_LEN};
