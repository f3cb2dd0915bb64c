use std::collections::BTreeMap;

use crate::config::StreamConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_CACHE_CONTROL: &str = "cache-control";
pub const HEADER_CONNECTION: &str = "connection";
pub const HEADER_USER_AGENT: &str = "user-agent";
pub const HEADER_ACCEL_BUFFERING: &str = "x-accel-buffering";

pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Build a deterministic header map for stream-opening requests.
pub fn build_request_headers(config: &StreamConfig) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), EVENT_STREAM_MIME.to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(HEADER_CACHE_CONTROL.to_owned(), "no-cache".to_owned());

    let ua = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}

/// Headers a producer should attach to a stream response so intermediaries
/// neither cache nor buffer it.
pub fn stream_response_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (HEADER_CONTENT_TYPE.to_owned(), EVENT_STREAM_MIME.to_owned()),
        (
            HEADER_CACHE_CONTROL.to_owned(),
            "no-cache, no-transform".to_owned(),
        ),
        (HEADER_CONNECTION.to_owned(), "keep-alive".to_owned()),
        (HEADER_ACCEL_BUFFERING.to_owned(), "no".to_owned()),
    ])
}

fn default_user_agent() -> String {
    format!("campaign-stream/{}", env!("CARGO_PKG_VERSION"))
}
