//! Canonical header names and codecs.
//!
//! Protocol metadata rides in HTTP headers so message bodies stay raw bytes
//! end to end:
//!
//! | Header | Direction | Value |
//! |---|---|---|
//! | `X-Sizes` | produce req / consume resp | comma-separated decimal u64 list |
//! | `X-Consumer-Group` | consume req | group identifier |
//! | `X-File-Name` | consume resp | segment log file name |
//! | `X-Start-Time` / `X-End-Time` | consume resp | ANSI-C timestamps |
//! | `X-Error` | error resp | stable error code |
//! | `Range` | consume resp | `bytes=<start>-<end>` (inclusive) |
//!
//! Everything here works on `http::HeaderMap`, which both axum (server) and
//! reqwest (client) expose, so the codec is written once.

use chrono::{DateTime, TimeZone, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};

pub const HEADER_SIZES: HeaderName = HeaderName::from_static("x-sizes");
pub const HEADER_CONSUMER_GROUP: HeaderName = HeaderName::from_static("x-consumer-group");
pub const HEADER_FILE_NAME: HeaderName = HeaderName::from_static("x-file-name");
pub const HEADER_START_TIME: HeaderName = HeaderName::from_static("x-start-time");
pub const HEADER_END_TIME: HeaderName = HeaderName::from_static("x-end-time");
pub const HEADER_ERROR: HeaderName = HeaderName::from_static("x-error");

pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// ANSI C `asctime` layout, e.g. `Mon Jan  2 15:04:05 2006`.
const ANSI_C: &str = "%a %b %e %H:%M:%S %Y";

/// Encode message sizes into the `X-Sizes` header.
pub fn set_sizes(sizes: &[u64], headers: &mut HeaderMap) {
    let joined = sizes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",");
    // digits and commas only, always a valid header value
    headers.insert(HEADER_SIZES, HeaderValue::from_str(&joined).unwrap());
}

/// Decode the `X-Sizes` header into a list of message sizes.
///
/// A missing, empty, or non-numeric header is `InvalidHeaderSizes`.
pub fn parse_sizes(headers: &HeaderMap) -> Result<Vec<u64>> {
    let raw = headers
        .get(&HEADER_SIZES)
        .ok_or(Error::InvalidHeaderSizes)?
        .to_str()
        .map_err(|_| Error::InvalidHeaderSizes)?;
    if raw.is_empty() {
        return Err(Error::InvalidHeaderSizes);
    }
    raw.split(',')
        .map(|part| part.trim().parse::<u64>().map_err(|_| Error::InvalidHeaderSizes))
        .collect()
}

/// Consumer group from the `X-Consumer-Group` header, if present.
pub fn consumer_group(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(&HEADER_CONSUMER_GROUP)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// Stamp an error onto a response header map.
pub fn set_error(err: &Error, headers: &mut HeaderMap) {
    headers.insert(HEADER_ERROR, HeaderValue::from_static(err.code()));
}

/// Recover the typed error from a response, if the broker set one.
pub fn parse_error(headers: &HeaderMap, body_text: &str) -> Option<Error> {
    let code = headers.get(&HEADER_ERROR)?.to_str().ok()?;
    Some(Error::from_code(code, body_text))
}

/// Format unix nanoseconds as an ANSI-C timestamp header value.
pub fn format_time(unix_nanos: u64) -> String {
    let ts: DateTime<Utc> = Utc.timestamp_nanos(unix_nanos as i64);
    ts.format(ANSI_C).to_string()
}

/// `Range: bytes=<start>-<end>` with inclusive bounds.
pub fn format_range(start: u64, end: u64) -> String {
    format!("bytes={start}-{end}")
}
