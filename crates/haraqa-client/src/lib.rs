//! HTTP client for the haraqa broker.
//!
//! A thin facade over `reqwest`: every method maps 1:1 to a broker route,
//! request bodies stream (produce never buffers twice), and consume hands
//! back the raw response body stream plus the decoded per-message sizes.
//!
//! ```ignore
//! use haraqa_client::Client;
//!
//! let client = Client::new("http://localhost:4353")?;
//! client.create_topic("orders").await?;
//! client.produce_msgs("orders", &[b"one", b"two"]).await?;
//!
//! if let Some(batch) = client.consume("orders", 0, -1, None).await? {
//!     for msg in batch.into_messages().await? {
//!         println!("{} bytes", msg.len());
//!     }
//! }
//! ```

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use url::Url;

use haraqa_core::{headers, GroupOffset, ModifyTopicRequest, TopicInfo, TopicList};

pub mod error;

pub use error::{ClientError, Result};

/// Connection to one haraqa broker.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a client bound to `base_url`, e.g. `http://localhost:4353`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let raw = base_url.into();
        let parsed =
            Url::parse(&raw).map_err(|_| ClientError::InvalidUrl(raw.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err(ClientError::InvalidUrl(raw));
        }
        Ok(Self {
            base_url: raw.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// Replace the HTTP transport, e.g. to set timeouts or TLS options.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{topic}", self.base_url)
    }

    fn group_url(&self, group: &str, topic: &str) -> String {
        format!("{}/groups/{group}/topics/{topic}", self.base_url)
    }

    /// `PUT /topics/{topic}`
    pub async fn create_topic(&self, topic: &str) -> Result<()> {
        let response = self.http.put(self.topic_url(topic)).send().await?;
        check(response).await?;
        Ok(())
    }

    /// `DELETE /topics/{topic}`
    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        let response = self.http.delete(self.topic_url(topic)).send().await?;
        check(response).await?;
        Ok(())
    }

    /// `GET /topics` with optional name filters.
    pub async fn list_topics(
        &self,
        prefix: Option<&str>,
        suffix: Option<&str>,
        regex: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        if let Some(suffix) = suffix {
            query.push(("suffix", suffix));
        }
        if let Some(regex) = regex {
            query.push(("regex", regex));
        }
        let response = self
            .http
            .get(format!("{}/topics", self.base_url))
            .query(&query)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json::<TopicList>().await?.topics)
    }

    /// `GET /topics/{topic}`: the topic's `(min, max)` offset window.
    pub async fn offsets(&self, topic: &str) -> Result<(u64, u64)> {
        let response = self.http.get(self.topic_url(topic)).send().await?;
        let response = check(response).await?;
        let info = response.json::<TopicInfo>().await?;
        Ok((info.min_offset, info.max_offset))
    }

    /// `PATCH /topics/{topic}` truncating the topic to `offset`. Returns the
    /// resulting offset window.
    pub async fn modify_topic(&self, topic: &str, truncate: u64) -> Result<TopicInfo> {
        let response = self
            .http
            .patch(self.topic_url(topic))
            .json(&ModifyTopicRequest {
                truncate: Some(truncate),
            })
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `POST /topics/{topic}`: append one batch. `body` must be exactly the
    /// concatenation of `sizes` bytes; streaming bodies are not buffered.
    pub async fn produce(
        &self,
        topic: &str,
        sizes: &[u64],
        body: impl Into<reqwest::Body>,
    ) -> Result<()> {
        let mut header_map = HeaderMap::new();
        headers::set_sizes(sizes, &mut header_map);
        let response = self
            .http
            .post(self.topic_url(topic))
            .headers(header_map)
            .body(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Batch convenience over [`Client::produce`]: computes the sizes header
    /// and concatenates the messages.
    pub async fn produce_msgs(
        &self,
        topic: &str,
        msgs: &[impl AsRef<[u8]>],
    ) -> Result<()> {
        if msgs.is_empty() {
            return Ok(());
        }
        let sizes: Vec<u64> = msgs.iter().map(|m| m.as_ref().len() as u64).collect();
        let mut body = Vec::with_capacity(sizes.iter().sum::<u64>() as usize);
        for msg in msgs {
            body.extend_from_slice(msg.as_ref());
        }
        self.produce(topic, &sizes, body).await
    }

    /// `GET /topics/{topic}?id=&limit=`: read up to `limit` messages from
    /// offset `id` (`limit <= 0` for all, `id < 0` for oldest). `Ok(None)`
    /// when the broker answers no-content. When `group` is set the broker
    /// advances that group's cursor past the returned batch.
    pub async fn consume(
        &self,
        topic: &str,
        id: i64,
        limit: i64,
        group: Option<&str>,
    ) -> Result<Option<ConsumeBatch>> {
        let mut request = self
            .http
            .get(self.topic_url(topic))
            .query(&[("id", id.to_string()), ("limit", limit.to_string())]);
        if let Some(group) = group {
            request = request.header(
                headers::HEADER_CONSUMER_GROUP,
                HeaderValue::from_str(group)
                    .map_err(|_| haraqa_core::Error::InvalidTopic)
                    .map_err(ClientError::Broker)?,
            );
        }
        let response = check(request.send().await?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let sizes = headers::parse_sizes(response.headers()).map_err(ClientError::Broker)?;
        Ok(Some(ConsumeBatch { sizes, response }))
    }

    /// Like [`Client::consume`], but reads the whole body and splits it into
    /// owned messages.
    pub async fn consume_msgs(
        &self,
        topic: &str,
        id: i64,
        limit: i64,
        group: Option<&str>,
    ) -> Result<Vec<Bytes>> {
        match self.consume(topic, id, limit, group).await? {
            Some(batch) => batch.into_messages().await,
            None => Ok(Vec::new()),
        }
    }

    /// `GET /groups/{group}/topics/{topic}`: the group's next offset.
    pub async fn group_offset(&self, group: &str, topic: &str) -> Result<u64> {
        let response = self.http.get(self.group_url(group, topic)).send().await?;
        let response = check(response).await?;
        Ok(response.json::<GroupOffset>().await?.next_offset)
    }

    /// `PUT /groups/{group}/topics/{topic}`: explicit cursor commit.
    pub async fn commit_offset(&self, group: &str, topic: &str, next: u64) -> Result<()> {
        let response = self
            .http
            .put(self.group_url(group, topic))
            .json(&GroupOffset { next_offset: next })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// One consumed batch: decoded sizes plus the still-streaming body.
#[derive(Debug)]
pub struct ConsumeBatch {
    sizes: Vec<u64>,
    response: reqwest::Response,
}

impl ConsumeBatch {
    /// Per-message sizes from the `X-Sizes` header, in offset order.
    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Number of messages in the batch.
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Segment log file name the broker served from, when present.
    pub fn file_name(&self) -> Option<&str> {
        self.response
            .headers()
            .get(headers::HEADER_FILE_NAME)
            .and_then(|v| v.to_str().ok())
    }

    /// The raw body stream; the caller splits it by [`ConsumeBatch::sizes`].
    pub fn into_body(self) -> (Vec<u64>, reqwest::Response) {
        (self.sizes, self.response)
    }

    /// Buffer the body and split it into one `Bytes` per message.
    pub async fn into_messages(self) -> Result<Vec<Bytes>> {
        let raw = self.response.bytes().await?;
        Ok(split_messages(raw, &self.sizes))
    }
}

/// Slice `raw` into consecutive chunks of `sizes` lengths. Slices share the
/// underlying buffer, so no payload bytes are copied.
fn split_messages(raw: Bytes, sizes: &[u64]) -> Vec<Bytes> {
    let mut messages = Vec::with_capacity(sizes.len());
    let mut at = 0usize;
    for &size in sizes {
        let end = (at + size as usize).min(raw.len());
        messages.push(raw.slice(at..end));
        at = end;
    }
    messages
}

/// Surface broker errors: non-success statuses decode `X-Error` into the
/// shared taxonomy, everything else stays a transport error.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let header_map = response.headers().clone();
    let text = response.text().await.unwrap_or_default();
    match headers::parse_error(&header_map, &text) {
        Some(err) => Err(ClientError::Broker(err)),
        None => Err(ClientError::UnexpectedStatus(status)),
    }
}
