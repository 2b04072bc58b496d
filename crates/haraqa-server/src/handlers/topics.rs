//! Topic lifecycle endpoints: list, create, delete, offsets, modify.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use regex::Regex;
use serde::Deserialize;

use haraqa_core::{ModifyTopicRequest, TopicList};
use haraqa_storage::TopicFilter;

use crate::{handlers::consume, ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub regex: Option<String>,
}

pub async fn list_topics(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TopicList>, ApiError> {
    let regex = match params.regex.as_deref() {
        // the pattern describes topic names, so a bad pattern is an
        // invalid-topic request
        Some(raw) => Some(Regex::new(raw).map_err(|_| haraqa_core::Error::InvalidTopic)?),
        None => None,
    };
    let filter = TopicFilter {
        prefix: params.prefix,
        suffix: params.suffix,
        regex,
    };
    let topics = state.queue.list_topics(&filter).await?;
    Ok(Json(TopicList { topics }))
}

pub async fn create_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.queue.create_topic(&topic).await?;
    Ok(StatusCode::CREATED)
}

pub async fn delete_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.queue.delete_topic(&topic).await?;
    Ok(StatusCode::OK)
}

/// Raw query strings so malformed integers map onto the wire codes instead
/// of axum's generic rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    pub id: Option<String>,
    pub limit: Option<String>,
}

/// `GET /topics/{topic}` serves two operations: with an `id` parameter it is
/// a consume, without one it reports the topic's offset window.
pub async fn get_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(params): Query<ReadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    match params.id {
        Some(raw_id) => consume::consume(state, topic, raw_id, params.limit, headers).await,
        None => {
            let info = state.queue.offsets(&topic).await?;
            Ok(Json(info).into_response())
        }
    }
}

pub async fn modify_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(haraqa_core::Error::InvalidBodyMissing.into());
    }
    let request: ModifyTopicRequest =
        serde_json::from_slice(&body).map_err(|_| haraqa_core::Error::InvalidBodyJson)?;

    match request.truncate {
        None => {
            // nothing requested; still 412 when the topic is missing
            state.queue.modify_topic(&topic, None).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Some(target) => {
            let info = state.queue.modify_topic(&topic, Some(target)).await?;
            Ok(Json(info).into_response())
        }
    }
}
