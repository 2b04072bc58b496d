//! Error taxonomy for the haraqa wire protocol.
//!
//! Every error the broker can surface to a client has a stable,
//! machine-readable code string sent in the `X-Error` header, plus a fixed
//! HTTP status. The client decodes the code back into the same enum, so a
//! `TopicAlreadyExists` raised in the storage engine is a
//! `TopicAlreadyExists` in the caller's match arm three processes away.
//!
//! Codes are part of the protocol: renaming one is a breaking change.

use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("topic name is empty or contains invalid characters")]
    InvalidTopic,

    #[error("message id is missing or not an integer")]
    InvalidMessageId,

    #[error("message limit is not an integer")]
    InvalidMessageLimit,

    #[error("sizes header is missing or malformed")]
    InvalidHeaderSizes,

    #[error("required request body is missing")]
    InvalidBodyMissing,

    #[error("request body is not valid json")]
    InvalidBodyJson,

    #[error("topic already exists")]
    TopicAlreadyExists,

    #[error("topic does not exist")]
    TopicDoesNotExist,

    #[error("no content")]
    NoContent,

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// Stable code string carried in the `X-Error` header.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTopic => "InvalidTopic",
            Error::InvalidMessageId => "InvalidMessageID",
            Error::InvalidMessageLimit => "InvalidMessageLimit",
            Error::InvalidHeaderSizes => "InvalidHeaderSizes",
            Error::InvalidBodyMissing => "InvalidBodyMissing",
            Error::InvalidBodyJson => "InvalidBodyJSON",
            Error::TopicAlreadyExists => "TopicAlreadyExists",
            Error::TopicDoesNotExist => "TopicDoesNotExist",
            Error::NoContent => "NoContent",
            Error::Unknown(_) => "Unknown",
        }
    }

    /// Reconstruct an error from its wire code. `detail` is the
    /// human-readable body text, kept only for `Unknown`.
    pub fn from_code(code: &str, detail: &str) -> Self {
        match code {
            "InvalidTopic" => Error::InvalidTopic,
            "InvalidMessageID" => Error::InvalidMessageId,
            "InvalidMessageLimit" => Error::InvalidMessageLimit,
            "InvalidHeaderSizes" => Error::InvalidHeaderSizes,
            "InvalidBodyMissing" => Error::InvalidBodyMissing,
            "InvalidBodyJSON" => Error::InvalidBodyJson,
            "TopicAlreadyExists" => Error::TopicAlreadyExists,
            "TopicDoesNotExist" => Error::TopicDoesNotExist,
            "NoContent" => Error::NoContent,
            _ => Error::Unknown(detail.to_string()),
        }
    }

    /// HTTP status the broker responds with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidTopic
            | Error::InvalidMessageId
            | Error::InvalidMessageLimit
            | Error::InvalidHeaderSizes
            | Error::InvalidBodyMissing
            | Error::InvalidBodyJson => StatusCode::BAD_REQUEST,
            Error::TopicAlreadyExists | Error::TopicDoesNotExist => {
                StatusCode::PRECONDITION_FAILED
            }
            Error::NoContent => StatusCode::NO_CONTENT,
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
