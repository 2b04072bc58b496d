//! Shared wire protocol for the haraqa broker.
//!
//! Both the server and the client crate speak the same HTTP dialect: message
//! sizes, consumer groups, timestamps and errors travel in headers, payloads
//! travel as raw bytes. This crate owns that contract so the two sides can
//! never drift apart:
//!
//! - [`error`]: the stable error taxonomy carried in the `X-Error` header,
//!   with its HTTP status mapping
//! - [`headers`]: canonical header names and the codecs for sizes, times and
//!   byte ranges
//! - [`types`]: the JSON request/response bodies and topic-name validation

pub mod error;
pub mod headers;
pub mod types;

pub use error::{Error, Result};
pub use types::{GroupOffset, ModifyTopicRequest, TopicInfo, TopicList};
