//! Message consume endpoint.
//!
//! Resolves the batch through the engine, then answers 206 with the batch
//! metadata in headers and the `.log` byte range streamed straight off disk,
//! so payload bytes are never re-encoded in user space.

use std::io::SeekFrom;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use haraqa_core::headers;

use crate::{ApiError, AppState};

pub(crate) async fn consume(
    state: AppState,
    topic: String,
    raw_id: String,
    raw_limit: Option<String>,
    request_headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| haraqa_core::Error::InvalidMessageId)?;
    let limit: i64 = match raw_limit.as_deref() {
        None => -1,
        Some(raw) => raw
            .parse()
            .map_err(|_| haraqa_core::Error::InvalidMessageLimit)?,
    };
    // limit 0 means "no limit", same as -1
    let limit = if limit == 0 { -1 } else { limit };

    let group = headers::consumer_group(&request_headers);
    let batch = state
        .queue
        .consume(group, &topic, id, limit)
        .await?
        .ok_or(haraqa_core::Error::NoContent)?;

    let mut file = tokio::fs::File::open(&batch.log_path)
        .await
        .map_err(io_error)?;
    file.seek(SeekFrom::Start(batch.start_byte))
        .await
        .map_err(io_error)?;
    let body = Body::from_stream(ReaderStream::new(file.take(batch.total_bytes)));

    let mut response = (StatusCode::PARTIAL_CONTENT, body).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(headers::CONTENT_TYPE_OCTET_STREAM),
    );
    response_headers.insert(
        header::RANGE,
        // digits and punctuation only, always a valid header value
        HeaderValue::from_str(&headers::format_range(batch.start_byte, batch.end_byte()))
            .unwrap(),
    );
    response_headers.insert(
        headers::HEADER_FILE_NAME,
        HeaderValue::from_str(&batch.file_name).unwrap(),
    );
    response_headers.insert(
        headers::HEADER_START_TIME,
        HeaderValue::from_str(&headers::format_time(batch.first_timestamp_ns)).unwrap(),
    );
    response_headers.insert(
        headers::HEADER_END_TIME,
        HeaderValue::from_str(&headers::format_time(batch.last_timestamp_ns)).unwrap(),
    );
    headers::set_sizes(&batch.sizes, response_headers);

    Ok(response)
}

fn io_error(err: std::io::Error) -> ApiError {
    ApiError::from(haraqa_storage::Error::Io(err))
}
