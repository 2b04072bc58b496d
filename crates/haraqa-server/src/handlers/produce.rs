//! Message produce endpoint.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use bytes::Bytes;

use haraqa_core::headers;

use crate::{ApiError, AppState};

pub async fn produce(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let sizes = headers::parse_sizes(&request_headers)?;
    if body.is_empty() && sizes.iter().sum::<u64>() > 0 {
        return Err(haraqa_core::Error::InvalidBodyMissing.into());
    }
    state.queue.produce(&topic, &sizes, body).await?;
    Ok(StatusCode::OK)
}
