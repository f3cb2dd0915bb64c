//! Replaceable contract for "what produces campaign stream events".
//!
//! An engine opens one generation stream per request and reports what it sees
//! as ordered [`StreamSignal`]s. It owns transport and decoding only; applying
//! envelopes to reconciler state is the host's job.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use stream_protocol::{DecodedFrame, StartRequest};

/// Identifier for one generation request.
pub type RequestId = u64;

/// Shared cancellation flag for a request.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring an engine before any request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInitError {
    message: String,
}

impl EngineInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EngineInitError {}

impl From<String> for EngineInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for EngineInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Input required to open one generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub request_id: RequestId,
    /// Free-text query with any mode tags already appended.
    pub query: String,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(request_id: RequestId, query: impl Into<String>) -> Self {
        Self {
            request_id,
            query: query.into(),
        }
    }

    #[must_use]
    pub fn start_request(&self) -> StartRequest {
        StartRequest::new(self.query.clone())
    }
}

/// Ordered observation of one stream, as reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// The producer accepted the request; the first byte has arrived.
    Opened { request_id: RequestId },
    Frame {
        request_id: RequestId,
        frame: DecodedFrame,
    },
    /// Connection refused, dropped mid-stream, or answered with a non-2xx status.
    TransportFailed {
        request_id: RequestId,
        error: String,
    },
    /// No frame arrived within the liveness window.
    Stalled {
        request_id: RequestId,
        idle: Duration,
    },
    /// The producer closed the body.
    Ended { request_id: RequestId },
    Cancelled { request_id: RequestId },
}

impl StreamSignal {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Opened { request_id }
            | Self::Frame { request_id, .. }
            | Self::TransportFailed { request_id, .. }
            | Self::Stalled { request_id, .. }
            | Self::Ended { request_id }
            | Self::Cancelled { request_id } => *request_id,
        }
    }

    /// Returns true when no further signal follows for this request.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TransportFailed { .. }
                | Self::Stalled { .. }
                | Self::Ended { .. }
                | Self::Cancelled { .. }
        )
    }
}

/// Immutable metadata describing an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProfile {
    pub engine_id: String,
    pub endpoint: Option<String>,
}

/// Engine interface for executing one generation request.
pub trait GenerationEngine: Send + Sync + 'static {
    fn profile(&self) -> EngineProfile;

    /// Opens the stream for `req` and emits signals in arrival order.
    ///
    /// Implementations emit exactly one terminal signal unless they return
    /// `Err`, in which case the host reports the error as a transport failure.
    /// `cancel` is polled cooperatively; once it is set the engine stops
    /// reading and emits [`StreamSignal::Cancelled`].
    fn run(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String>;
}
