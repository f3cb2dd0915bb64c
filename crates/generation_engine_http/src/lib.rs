//! HTTP-backed implementation of the `generation_engine` contract.
//!
//! This adapter drives `stream_protocol`'s client on a private current-thread
//! runtime and reports what it observes as ordered `StreamSignal`s.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use generation_engine::{
    CancelSignal, EngineInitError, EngineProfile, GenerationEngine, GenerationRequest,
    StreamSignal,
};
use stream_protocol::{
    normalize_stream_url, ClientEvent, ProtocolError, StartRequest, StreamClient, StreamConfig,
    StreamSummary,
};
use tracing::{info, warn};

/// Stable engine identifier used by `campaign_chat` startup selection.
pub const HTTP_ENGINE_ID: &str = "http";

/// Runtime configuration for the HTTP engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEngineConfig {
    pub base_url: String,
    pub liveness_window: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl HttpEngineConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            liveness_window: None,
            connect_timeout: None,
        }
    }

    #[must_use]
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = Some(window);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    fn into_stream_config(self) -> StreamConfig {
        let mut config = StreamConfig::new(self.base_url);

        if let Some(window) = self.liveness_window {
            config = config.with_liveness_window(window);
        }

        if let Some(timeout) = self.connect_timeout {
            config = config.with_connect_timeout(timeout);
        }

        config
    }
}

trait StreamTransport: Send + Sync {
    fn stream(
        &self,
        request: &StartRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ClientEvent),
    ) -> Result<StreamSummary, ProtocolError>;
}

#[derive(Debug)]
struct DefaultTransport {
    client: StreamClient,
}

impl StreamTransport for DefaultTransport {
    fn stream(
        &self,
        request: &StartRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(ClientEvent),
    ) -> Result<StreamSummary, ProtocolError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ProtocolError::Runtime(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// `GenerationEngine` adapter backed by a live HTTP producer.
pub struct HttpEngine {
    endpoint: String,
    transport: Arc<dyn StreamTransport>,
}

impl HttpEngine {
    pub fn new(config: HttpEngineConfig) -> Result<Self, EngineInitError> {
        let endpoint = normalize_stream_url(&config.base_url);
        let parsed = url::Url::parse(&endpoint).map_err(|error| {
            EngineInitError::new(format!("invalid stream endpoint '{endpoint}': {error}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineInitError::new(format!(
                "stream endpoint must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let client = StreamClient::new(config.into_stream_config()).map_err(map_init_error)?;
        Ok(Self {
            endpoint,
            transport: Arc::new(DefaultTransport { client }),
        })
    }

    #[cfg(test)]
    fn with_transport_for_tests(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            endpoint: normalize_stream_url(""),
            transport,
        }
    }
}

impl GenerationEngine for HttpEngine {
    fn profile(&self) -> EngineProfile {
        EngineProfile {
            engine_id: HTTP_ENGINE_ID.to_string(),
            endpoint: Some(self.endpoint.clone()),
        }
    }

    fn run(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String> {
        let request_id = req.request_id;

        if cancel.load(Ordering::Acquire) {
            emit(StreamSignal::Cancelled { request_id });
            return Ok(());
        }

        let result = self
            .transport
            .stream(&req.start_request(), &cancel, &mut |event| match event {
                ClientEvent::Opened { .. } => emit(StreamSignal::Opened { request_id }),
                ClientEvent::Frame(frame) => emit(StreamSignal::Frame { request_id, frame }),
            });

        let terminal = match result {
            Ok(summary) if !cancel.load(Ordering::Acquire) => {
                info!(request_id, frames = summary.frames, bytes = summary.bytes, "stream ended");
                StreamSignal::Ended { request_id }
            }
            Ok(_) | Err(ProtocolError::Cancelled) => StreamSignal::Cancelled { request_id },
            Err(ProtocolError::Stalled { idle }) => {
                warn!(request_id, idle_secs = idle.as_secs(), "stream stalled");
                StreamSignal::Stalled { request_id, idle }
            }
            Err(error) => {
                warn!(request_id, %error, "stream transport failed");
                StreamSignal::TransportFailed {
                    request_id,
                    error: error.to_string(),
                }
            }
        };
        emit(terminal);

        Ok(())
    }
}

fn map_init_error(error: ProtocolError) -> EngineInitError {
    EngineInitError::new(format!("Failed to initialize http engine: {error}"))
}
