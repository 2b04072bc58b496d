//! JSON bodies exchanged with the broker, plus topic-name validation.

use serde::{Deserialize, Serialize};

/// Offset window of a topic: `min_offset` is the oldest retained message,
/// `max_offset` is the next offset to be assigned (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    #[serde(rename = "MinOffset")]
    pub min_offset: u64,

    #[serde(rename = "MaxOffset")]
    pub max_offset: u64,
}

/// Response body of `GET /topics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicList {
    #[serde(rename = "Topics")]
    pub topics: Vec<String>,
}

/// Request body of `PATCH /topics/{topic}`. An empty object requests no
/// changes and yields a 204.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyTopicRequest {
    #[serde(rename = "truncate", skip_serializing_if = "Option::is_none")]
    pub truncate: Option<u64>,
}

/// Stored cursor of a consumer group for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOffset {
    #[serde(rename = "NextOffset")]
    pub next_offset: u64,
}

/// Whether `name` is a legal topic or consumer-group identifier.
///
/// Identifiers become directory and file names under the broker root, so the
/// alphabet is restricted to letters, digits, `-`, `_` and `.`, and the
/// dot-only names that alias the current/parent directory are rejected.
pub fn valid_name(name: &str) -> bool {
    if name.is_empty() || name.bytes().all(|b| b == b'.') {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}
