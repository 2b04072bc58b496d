//! Client error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url {0:?}")]
    InvalidUrl(String),

    /// A typed error the broker reported through the `X-Error` header.
    #[error("broker error: {0}")]
    Broker(#[from] haraqa_core::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    UnexpectedStatus(http::StatusCode),
}

impl ClientError {
    /// The broker-side error, when this is one.
    pub fn broker_error(&self) -> Option<&haraqa_core::Error> {
        match self {
            ClientError::Broker(err) => Some(err),
            _ => None,
        }
    }
}
