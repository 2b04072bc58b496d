//! Consumer-group cursor endpoints.
//!
//! The broker advances a group's cursor implicitly when a consume carries
//! `X-Consumer-Group`; these endpoints let clients inspect the cursor and
//! commit explicitly instead.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;

use haraqa_core::GroupOffset;

use crate::{ApiError, AppState};

pub async fn get_group_offset(
    State(state): State<AppState>,
    Path((group, topic)): Path<(String, String)>,
) -> Result<Json<GroupOffset>, ApiError> {
    let next_offset = state.queue.group_offset(&group, &topic).await?;
    Ok(Json(GroupOffset { next_offset }))
}

/// Accepts the cursor either as 8 little-endian bytes (the on-disk form) or
/// as the JSON body `{"NextOffset": n}`.
pub async fn commit_group_offset(
    State(state): State<AppState>,
    Path((group, topic)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if body.is_empty() {
        return Err(haraqa_core::Error::InvalidBodyMissing.into());
    }
    let next = if body.len() == 8 {
        u64::from_le_bytes(body.as_ref().try_into().unwrap())
    } else {
        serde_json::from_slice::<GroupOffset>(&body)
            .map_err(|_| haraqa_core::Error::InvalidBodyJson)?
            .next_offset
    };
    state.queue.commit_group_offset(&group, &topic, next).await?;
    Ok(StatusCode::OK)
}
