//! haraqa broker binary.
//!
//! Configuration is environment variables only:
//!
//! - `HARAQA_ROOT`: data directory (default: ./data)
//! - `HARAQA_HTTP_ADDR`: bind address (default: 0.0.0.0:4353)
//! - `HARAQA_MAX_ENTRIES`: segment rollover threshold in messages
//! - `HARAQA_MAX_SIZE`: segment rollover threshold in bytes
//! - `HARAQA_FSYNC`: durability policy, one of `off`, `batch`, `interval=Nms`
//! - `HARAQA_CREATE_ON_PRODUCE`: create topics implicitly on first produce
//! - `HARAQA_CACHE_SIZE`: segment-name cache capacity in topics
//!
//! Logging is controlled via `RUST_LOG` (default: info). The process exits
//! non-zero when the data directory cannot be opened or the address cannot
//! be bound.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use haraqa_server::{create_router, AppState};
use haraqa_storage::{FileQueue, Queue, QueueConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let root = std::env::var("HARAQA_ROOT").unwrap_or_else(|_| "./data".to_string());
    let addr =
        std::env::var("HARAQA_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:4353".to_string());

    let mut config = QueueConfig::new(root);
    if let Ok(raw) = std::env::var("HARAQA_MAX_ENTRIES") {
        config.max_entries = raw.parse().context("parsing HARAQA_MAX_ENTRIES")?;
    }
    if let Ok(raw) = std::env::var("HARAQA_MAX_SIZE") {
        config.max_segment_bytes = raw.parse().context("parsing HARAQA_MAX_SIZE")?;
    }
    if let Ok(raw) = std::env::var("HARAQA_FSYNC") {
        config.sync = raw
            .parse()
            .map_err(|err: String| anyhow::anyhow!(err))
            .context("parsing HARAQA_FSYNC")?;
    }
    if let Ok(raw) = std::env::var("HARAQA_CREATE_ON_PRODUCE") {
        config.create_on_produce = raw.parse().context("parsing HARAQA_CREATE_ON_PRODUCE")?;
    }
    if let Ok(raw) = std::env::var("HARAQA_CACHE_SIZE") {
        config.cache_size = raw.parse().context("parsing HARAQA_CACHE_SIZE")?;
    }

    let queue: Arc<dyn Queue> = Arc::new(
        FileQueue::open(config)
            .await
            .context("opening file queue")?,
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let router = create_router(AppState {
        queue: queue.clone(),
    });
    haraqa_server::serve(router, listener)
        .await
        .context("serving http")?;

    queue.close().await;
    Ok(())
}
