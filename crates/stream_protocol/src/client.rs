use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::{parse_error_message, ProtocolError};
use crate::headers::build_request_headers;
use crate::payload::StartRequest;
use crate::sse::{DecodedFrame, FrameDecoder};
use crate::url::normalize_stream_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Progress reported while a stream is being consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The producer answered with a 2xx status; the body is about to be read.
    Opened { status: u16 },
    Frame(DecodedFrame),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: usize,
    pub bytes: usize,
    /// Bytes of an unterminated frame left when the body ended.
    pub trailing_bytes: usize,
}

#[derive(Debug)]
pub struct StreamClient {
    http: Client,
    config: StreamConfig,
}

impl StreamClient {
    pub fn new(config: StreamConfig) -> Result<Self, ProtocolError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Result<Url, ProtocolError> {
        let normalized = normalize_stream_url(&self.config.base_url);
        let url = Url::parse(&normalized)
            .map_err(|error| ProtocolError::InvalidEndpoint(format!("{normalized}: {error}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProtocolError::InvalidEndpoint(format!(
                "{normalized}: unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ProtocolError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_request_headers(&self.config) {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|error| {
                ProtocolError::InvalidHeader {
                    name: key.clone(),
                    reason: error.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(&value).map_err(|error| {
                ProtocolError::InvalidHeader {
                    name: key.clone(),
                    reason: error.to_string(),
                }
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &StartRequest,
    ) -> Result<reqwest::RequestBuilder, ProtocolError> {
        Ok(self
            .http
            .post(self.endpoint()?)
            .headers(self.build_headers()?)
            .json(request))
    }

    /// Issue the opening request once. Transport failures are never retried here;
    /// resubmission is a user decision.
    pub async fn open(
        &self,
        request: &StartRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ProtocolError> {
        if is_cancelled(cancellation) {
            return Err(ProtocolError::Cancelled);
        }

        let response = await_or_cancel(self.build_request(request)?.send(), cancellation).await??;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        Err(ProtocolError::Status {
            status: status.as_u16(),
            message: parse_error_message(status, &body),
        })
    }

    /// Open the stream and hand every decoded frame to `on_event` in arrival order.
    ///
    /// Returns once the producer closes the body. Silence longer than the
    /// configured liveness window yields [`ProtocolError::Stalled`]; any chunk,
    /// including a comment ping, counts as activity.
    pub async fn stream_with_handler<F>(
        &self,
        request: &StartRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamSummary, ProtocolError>
    where
        F: FnMut(ClientEvent),
    {
        let response = self.open(request, cancellation).await?;
        on_event(ClientEvent::Opened {
            status: response.status().as_u16(),
        });

        let window = self.config.liveness_window;
        let mut bytes = response.bytes_stream();
        let mut decoder = FrameDecoder::default();
        let mut summary = StreamSummary::default();

        loop {
            let next = await_or_cancel(tokio::time::timeout(window, bytes.next()), cancellation)
                .await?;
            let Ok(next) = next else {
                warn!(idle_secs = window.as_secs(), "stream stalled");
                return Err(ProtocolError::Stalled { idle: window });
            };
            let Some(chunk) = next else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ProtocolError::Cancelled);
            }

            let chunk = chunk?;
            summary.bytes += chunk.len();
            for frame in decoder.feed(&chunk) {
                summary.frames += 1;
                on_event(ClientEvent::Frame(frame));
            }
        }

        if is_cancelled(cancellation) {
            return Err(ProtocolError::Cancelled);
        }

        summary.trailing_bytes = decoder.pending_bytes();
        if summary.trailing_bytes > 0 {
            debug!(
                trailing_bytes = summary.trailing_bytes,
                "discarding unterminated trailing frame"
            );
        }
        Ok(summary)
    }

    /// Collect all frames of one stream.
    pub async fn stream(
        &self,
        request: &StartRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<DecodedFrame>, ProtocolError> {
        let mut frames = Vec::new();
        self.stream_with_handler(request, cancellation, |event| {
            if let ClientEvent::Frame(frame) = event {
                frames.push(frame);
            }
        })
        .await?;
        Ok(frames)
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ProtocolError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ProtocolError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ProtocolError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{await_or_cancel, StreamClient};
    use crate::config::StreamConfig;
    use crate::error::ProtocolError;

    #[tokio::test]
    async fn await_or_cancel_stops_pending_futures() {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::Release);
        });

        let result = await_or_cancel(std::future::pending::<()>(), Some(&cancel)).await;
        assert!(matches!(result, Err(ProtocolError::Cancelled)));
    }

    #[tokio::test]
    async fn await_or_cancel_passes_through_without_signal() {
        let value = await_or_cancel(async { 7 }, None)
            .await
            .expect("no cancellation configured");
        assert_eq!(value, 7);
    }

    #[test]
    fn endpoint_rejects_non_http_schemes() {
        let client = StreamClient::new(StreamConfig::new("ftp://example.com"))
            .expect("client builds");
        assert!(matches!(
            client.endpoint(),
            Err(ProtocolError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn endpoint_appends_stream_route() {
        let client = StreamClient::new(StreamConfig::new("http://localhost:4000"))
            .expect("client builds");
        assert_eq!(
            client.endpoint().expect("valid endpoint").as_str(),
            "http://localhost:4000/api/campaign/stream"
        );
    }
}
