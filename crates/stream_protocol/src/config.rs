use std::collections::BTreeMap;
use std::time::Duration;

use crate::sse::{DEFAULT_LIVENESS_WINDOW, DEFAULT_PING_INTERVAL};
use crate::url::DEFAULT_STREAM_BASE_URL;

/// Transport configuration for campaign stream requests.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Producer origin or full stream endpoint.
    pub base_url: String,
    /// Longest silence tolerated between two frames.
    pub liveness_window: Duration,
    /// Optional bound on establishing the connection and receiving headers.
    pub connect_timeout: Option<Duration>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STREAM_BASE_URL.to_string(),
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            connect_timeout: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl StreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Windows shorter than two ping intervals are raised to that floor so a
    /// single delayed ping never stalls a healthy stream.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window.max(DEFAULT_PING_INTERVAL * 2);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    /// Test-only escape hatch for windows below the ping floor.
    #[doc(hidden)]
    pub fn with_unchecked_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }
}
