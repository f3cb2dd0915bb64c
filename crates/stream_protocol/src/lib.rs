//! Wire format and transport primitives for the campaign generation stream.
//!
//! A producer pushes one JSON envelope per self-delimited text frame over a
//! single long-lived response body. This crate owns the typed envelope model,
//! the incremental frame decoder used by consumers, the matching encoder used by
//! producers, and an HTTP client that opens the stream with a liveness window
//! and cooperative cancellation.
//!
//! It contains no reconciliation logic; decoded frames are handed to the session
//! layer unchanged and in arrival order.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ClientEvent, StreamClient, StreamSummary};
pub use config::StreamConfig;
pub use envelope::{
    BlockEvent, BlockKind, DecodeError, Envelope, EnvelopeBody, EnvelopeKind, Feedback,
    Lifecycle, LifecycleKind, PartialField, SourceLink, Tabs, ThoughtItem,
};
pub use error::ProtocolError;
pub use headers::stream_response_headers;
pub use payload::{ModeFlags, StartRequest, DEEPTHINK_TAG, WEB_SEARCH_TAG};
pub use sse::{
    encode_comment, encode_envelope, DecodedFrame, FrameDecoder, DEFAULT_LIVENESS_WINDOW,
    DEFAULT_MAX_FRAME_BYTES, DEFAULT_PING_INTERVAL,
};
pub use url::normalize_stream_url;
