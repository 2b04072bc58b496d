//! Engine error types.
//!
//! The storage layer keeps its own error enum rather than reusing the wire
//! taxonomy: the engine does not know about HTTP, and an `Io` failure here
//! carries the underlying `std::io::Error` instead of a flattened string.
//! The server crate maps these onto `haraqa_core::Error` at the boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("topic already exists")]
    TopicAlreadyExists,

    #[error("topic does not exist")]
    TopicDoesNotExist,

    #[error("invalid topic or group name")]
    InvalidName,

    #[error("declared sizes do not match body length")]
    SizeMismatch,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
