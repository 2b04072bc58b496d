//! Error responder: one type every handler returns on failure.
//!
//! Wraps the wire taxonomy from `haraqa_core` and renders it as
//! `(status, X-Error header, plain-text body)`. Engine errors convert
//! through [`From`], so handlers stay `?`-only.

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use haraqa_core::headers;

#[derive(Debug)]
pub struct ApiError(pub haraqa_core::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let mut response = if status == StatusCode::NO_CONTENT {
            // a 204 carries no body; the code rides in the header alone
            status.into_response()
        } else {
            (status, self.0.to_string()).into_response()
        };
        headers::set_error(&self.0, response.headers_mut());
        response
    }
}

impl From<haraqa_core::Error> for ApiError {
    fn from(err: haraqa_core::Error) -> Self {
        ApiError(err)
    }
}

impl From<haraqa_storage::Error> for ApiError {
    fn from(err: haraqa_storage::Error) -> Self {
        use haraqa_storage::Error as Engine;
        let mapped = match err {
            Engine::TopicAlreadyExists => haraqa_core::Error::TopicAlreadyExists,
            Engine::TopicDoesNotExist => haraqa_core::Error::TopicDoesNotExist,
            Engine::InvalidName => haraqa_core::Error::InvalidTopic,
            Engine::SizeMismatch => haraqa_core::Error::InvalidHeaderSizes,
            Engine::Io(err) => {
                tracing::error!(error = %err, "engine io failure");
                haraqa_core::Error::Unknown(err.to_string())
            }
        };
        ApiError(mapped)
    }
}
