//! Deterministic scripted implementation of the `generation_engine` contract.
//!
//! Scripts are encoded into real wire bytes, split into small chunks and pushed
//! through the same incremental decoder a network consumer uses, so local runs
//! and tests exercise framing exactly like a live stream would.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use generation_engine::{
    CancelSignal, EngineProfile, GenerationEngine, GenerationRequest, RequestId, StreamSignal,
};
use stream_protocol::{encode_comment, encode_envelope, Envelope, FrameDecoder};
use tracing::debug;

mod scripts;

pub use scripts::{
    block_script, campaign_for, extract_campaign_name, partial_field_script,
    INDICATOR_DESCRIPTION, INDICATOR_TITLE,
};

/// Stable engine identifier used for explicit startup selection.
pub const MOCK_ENGINE_ID: &str = "mock";

const DEFAULT_CHUNK_SIZE: usize = 48;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One producer action in a script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Envelope(Envelope),
    Comment(String),
    /// Bytes written verbatim, for malformed or hand-shaped frames.
    Raw(String),
    Pause(Duration),
    /// The connection drops without the body ending cleanly.
    Disconnect,
    /// The producer goes silent past the consumer's liveness window.
    Stall(Duration),
}

/// Which script a request is answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSource {
    PartialFields,
    Blocks,
    Fixed(Vec<ScriptStep>),
}

impl ScriptSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "partial" | "partials" | "partial_fields" => Some(Self::PartialFields),
            "block" | "blocks" => Some(Self::Blocks),
            _ => None,
        }
    }

    fn steps(&self, request_id: RequestId, query: &str) -> Vec<ScriptStep> {
        match self {
            Self::PartialFields => partial_field_script(request_id, query),
            Self::Blocks => block_script(request_id, query),
            Self::Fixed(steps) => steps.clone(),
        }
    }
}

/// Scripted engine used by `campaign_chat` tests and local runs.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    source: ScriptSource,
    step_delay: Duration,
    chunk_size: usize,
    honor_pauses: bool,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            step_delay: Duration::ZERO,
            chunk_size: DEFAULT_CHUNK_SIZE,
            honor_pauses: true,
        }
    }

    #[must_use]
    pub fn fixed(steps: Vec<ScriptStep>) -> Self {
        Self::new(ScriptSource::Fixed(steps))
    }

    /// Extra delay after every step, for watching a stream unfold.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Skip `Pause` steps so tests run at full speed.
    #[must_use]
    pub fn without_pauses(mut self) -> Self {
        self.honor_pauses = false;
        self
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new(ScriptSource::Blocks)
    }
}

enum StepOutcome {
    Continue,
    Cancelled,
    Finished,
}

impl GenerationEngine for ScriptedEngine {
    fn profile(&self) -> EngineProfile {
        EngineProfile {
            engine_id: MOCK_ENGINE_ID.to_string(),
            endpoint: None,
        }
    }

    fn run(
        &self,
        req: GenerationRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> Result<(), String> {
        let request_id = req.request_id;
        let steps = self.source.steps(request_id, &req.query);
        debug!(request_id, steps = steps.len(), "scripted stream starting");

        if cancel.load(Ordering::SeqCst) {
            emit(StreamSignal::Cancelled { request_id });
            return Ok(());
        }
        emit(StreamSignal::Opened { request_id });

        let mut decoder = FrameDecoder::default();
        for step in steps {
            let outcome = self.play_step(step, request_id, &cancel, &mut decoder, emit);
            let outcome = match outcome {
                StepOutcome::Continue if !sleep_unless_cancelled(self.step_delay, &cancel) => {
                    StepOutcome::Cancelled
                }
                other => other,
            };
            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Cancelled => {
                    emit(StreamSignal::Cancelled { request_id });
                    return Ok(());
                }
                StepOutcome::Finished => return Ok(()),
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(StreamSignal::Cancelled { request_id });
        } else {
            emit(StreamSignal::Ended { request_id });
        }
        Ok(())
    }
}

impl ScriptedEngine {
    fn play_step(
        &self,
        step: ScriptStep,
        request_id: RequestId,
        cancel: &CancelSignal,
        decoder: &mut FrameDecoder,
        emit: &mut dyn FnMut(StreamSignal),
    ) -> StepOutcome {
        if cancel.load(Ordering::SeqCst) {
            return StepOutcome::Cancelled;
        }

        let bytes = match step {
            ScriptStep::Envelope(envelope) => encode_envelope(&envelope),
            ScriptStep::Comment(token) => encode_comment(&token),
            ScriptStep::Raw(raw) => raw,
            ScriptStep::Pause(duration) => {
                let duration = if self.honor_pauses {
                    duration
                } else {
                    Duration::ZERO
                };
                return if sleep_unless_cancelled(duration, cancel) {
                    StepOutcome::Continue
                } else {
                    StepOutcome::Cancelled
                };
            }
            ScriptStep::Disconnect => {
                emit(StreamSignal::TransportFailed {
                    request_id,
                    error: "connection closed before the stream completed".to_string(),
                });
                return StepOutcome::Finished;
            }
            ScriptStep::Stall(idle) => {
                emit(StreamSignal::Stalled { request_id, idle });
                return StepOutcome::Finished;
            }
        };

        for chunk in bytes.as_bytes().chunks(self.chunk_size) {
            if cancel.load(Ordering::SeqCst) {
                return StepOutcome::Cancelled;
            }
            for frame in decoder.feed(chunk) {
                emit(StreamSignal::Frame { request_id, frame });
            }
        }
        StepOutcome::Continue
    }
}

/// Sleeps for `duration` in short slices; returns false if cancelled meanwhile.
fn sleep_unless_cancelled(duration: Duration, cancel: &CancelSignal) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
    }
}
