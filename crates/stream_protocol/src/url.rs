/// Default producer origin for local development.
pub const DEFAULT_STREAM_BASE_URL: &str = "http://127.0.0.1:3000";

/// Path of the campaign generation stream route.
pub const STREAM_ROUTE: &str = "/api/campaign/stream";

/// Normalize a base URL to the campaign stream endpoint.
///
/// Normalization rules:
/// 1) keep a URL already ending in `/api/campaign/stream` unchanged
/// 2) append `/campaign/stream` when the path ends in `/api`
/// 3) append `/api/campaign/stream` otherwise
pub fn normalize_stream_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_STREAM_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(STREAM_ROUTE) {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/api") {
        return format!("{trimmed}/campaign/stream");
    }
    format!("{trimmed}{STREAM_ROUTE}")
}
