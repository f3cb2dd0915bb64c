//! Per-request stream session state machine.
//!
//! `opening -> active -> closing -> closed`, or `failed` from any live state.
//! Terminal sessions ignore every further signal.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use generation_engine::{RequestId, StreamSignal};
use stream_protocol::{
    BlockEvent, BlockKind, DecodedFrame, Envelope, EnvelopeBody, Feedback, LifecycleKind,
};

use crate::core::artifact::Artifact;
use crate::core::blocks::{Block, BlockAssembler, BlockOutcome};
use crate::core::channels::AuxiliaryChannels;
use crate::core::snapshot;

pub const START_TEXT: &str = "Generating your campaign configuration...";
pub const COMPLETE_TEXT: &str = "Campaign generation complete! Here's your configuration:";
pub const CONNECTION_ERROR_TEXT: &str = "Error connecting to campaign generation service.";
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[must_use]
pub fn partial_text(field: &str) -> String {
    format!("Generating campaign... ({field} added)")
}

#[must_use]
pub fn producer_error_text(error: &str) -> String {
    format!("Error generating campaign: {error}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Opening,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Opening | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    /// The producer sent `lifecycle: error`.
    ProducerError(String),
    TransportFailed(String),
    Stalled(Duration),
    /// Too many consecutive malformed frames.
    MalformedFrames(usize),
    /// The body closed before a terminal envelope.
    EndedEarly,
    Cancelled,
    Superseded,
}

/// Effect of one signal on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing a sink would render changed.
    Ignored,
    Changed,
    /// The session reached `closed` or `failed` with this signal.
    Terminal,
}

impl Applied {
    pub fn needs_publish(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// One streaming generation request and everything it has accumulated.
#[derive(Debug, Clone)]
pub struct StreamSession {
    request_id: RequestId,
    conversation_id: String,
    message_id: String,
    started_at: i64,
    status: SessionStatus,
    outcome: Option<SessionOutcome>,
    artifact: Artifact,
    channels: AuxiliaryChannels,
    blocks: BlockAssembler,
    content: String,
    streaming: bool,
    malformed_streak: usize,
    malformed_limit: usize,
}

impl StreamSession {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        malformed_limit: usize,
        started_at: i64,
    ) -> Self {
        Self {
            request_id,
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            started_at,
            status: SessionStatus::Opening,
            outcome: None,
            artifact: Artifact::new(),
            channels: AuxiliaryChannels::new(),
            blocks: BlockAssembler::new(),
            content: String::new(),
            streaming: true,
            malformed_streak: 0,
            malformed_limit: malformed_limit.max(1),
        }
    }

    /// Applies one engine signal in arrival order.
    pub fn apply(&mut self, signal: StreamSignal, received_at: i64) -> Applied {
        if signal.request_id() != self.request_id {
            warn!(
                request_id = signal.request_id(),
                session = self.request_id,
                "signal routed to the wrong session"
            );
            return Applied::Ignored;
        }
        if self.status.is_terminal() {
            debug!(
                request_id = self.request_id,
                status = self.status.as_str(),
                "ignoring signal after terminal state"
            );
            return Applied::Ignored;
        }

        match signal {
            StreamSignal::Opened { .. } => {
                if self.activate() {
                    Applied::Changed
                } else {
                    Applied::Ignored
                }
            }
            StreamSignal::Frame { frame, .. } => {
                self.activate();
                self.apply_frame(frame, received_at)
            }
            StreamSignal::TransportFailed { error, .. } => {
                self.fail(SessionOutcome::TransportFailed(error))
            }
            StreamSignal::Stalled { idle, .. } => self.fail(SessionOutcome::Stalled(idle)),
            StreamSignal::Ended { .. } => self.fail(SessionOutcome::EndedEarly),
            StreamSignal::Cancelled { .. } => self.cancel(),
        }
    }

    /// Closes a live session without touching the artifact.
    pub fn cancel(&mut self) -> Applied {
        if self.status.is_terminal() {
            return Applied::Ignored;
        }
        self.status = SessionStatus::Closing;
        self.finish(SessionStatus::Closed, SessionOutcome::Cancelled);
        Applied::Terminal
    }

    /// Marks the session replaced by a newer one for the same message.
    ///
    /// No sink write follows; the newer session owns the message from here on.
    pub fn supersede(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Closing;
        self.finish(SessionStatus::Closed, SessionOutcome::Superseded);
        true
    }

    /// Flips user feedback for the message; valid in any state.
    pub fn toggle_feedback(&mut self, feedback: Feedback) -> Option<Feedback> {
        self.channels.toggle_feedback(feedback)
    }

    fn activate(&mut self) -> bool {
        if self.status != SessionStatus::Opening {
            return false;
        }
        self.status = SessionStatus::Active;
        info!(
            request_id = self.request_id,
            message_id = %self.message_id,
            "campaign stream active"
        );
        true
    }

    fn apply_frame(&mut self, frame: DecodedFrame, received_at: i64) -> Applied {
        match frame {
            DecodedFrame::Envelope(envelope) => {
                self.malformed_streak = 0;
                self.apply_envelope(envelope, received_at)
            }
            DecodedFrame::Comment(_) => Applied::Ignored,
            DecodedFrame::Ignored { reason } => {
                warn!(request_id = self.request_id, %reason, "dropping unrecognized envelope");
                Applied::Ignored
            }
            DecodedFrame::Malformed { raw, reason } => {
                self.malformed_streak += 1;
                warn!(
                    request_id = self.request_id,
                    streak = self.malformed_streak,
                    %reason,
                    raw_len = raw.len(),
                    "dropping malformed frame"
                );
                if self.malformed_streak >= self.malformed_limit {
                    self.fail(SessionOutcome::MalformedFrames(self.malformed_streak))
                } else {
                    Applied::Ignored
                }
            }
        }
    }

    fn apply_envelope(&mut self, envelope: Envelope, received_at: i64) -> Applied {
        debug!(
            request_id = self.request_id,
            kind = ?envelope.kind(),
            "dispatching envelope"
        );
        let Envelope { body, tabs } = envelope;
        let mut changed = false;
        let mut terminal = None;

        match body {
            EnvelopeBody::Lifecycle(lifecycle) => match lifecycle.kind {
                LifecycleKind::Start => changed |= self.set_content(START_TEXT),
                LifecycleKind::Complete => {
                    if let Some(data) = &lifecycle.data {
                        changed |= self.artifact.replace(data);
                    }
                    terminal = Some(SessionOutcome::Completed);
                }
                LifecycleKind::Error => {
                    let error = lifecycle
                        .error
                        .or(lifecycle.message)
                        .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                    terminal = Some(SessionOutcome::ProducerError(error));
                }
            },
            EnvelopeBody::Partial(partial) => {
                changed |= self.artifact.apply(&partial.data);
                changed |= self.set_content(&partial_text(&partial.field));
            }
            EnvelopeBody::Block(event) => changed |= self.apply_block(&event),
            EnvelopeBody::Auxiliary => {}
        }

        if let Some(tabs) = &tabs {
            changed |= !self.channels.apply_tabs(tabs, received_at).is_empty();
        }

        match terminal {
            Some(outcome) => self.close(outcome),
            None if changed => Applied::Changed,
            None => Applied::Ignored,
        }
    }

    fn apply_block(&mut self, event: &BlockEvent) -> bool {
        match self.blocks.apply(event) {
            BlockOutcome::Cleared => {
                self.channels.reset();
                true
            }
            BlockOutcome::Appended => true,
            BlockOutcome::DuplicateIndicator => {
                debug!(request_id = self.request_id, "artifact indicator already present");
                false
            }
            BlockOutcome::ArtifactOnly => {
                let mut changed = event
                    .artifact
                    .as_ref()
                    .is_some_and(|fragment| self.artifact.apply(fragment));
                if event.kind == BlockKind::ArtifactEnd {
                    changed |= self.artifact.finalize();
                }
                changed
            }
        }
    }

    fn close(&mut self, outcome: SessionOutcome) -> Applied {
        self.status = SessionStatus::Closing;
        match &outcome {
            SessionOutcome::Completed => self.flush_completion(),
            SessionOutcome::ProducerError(error) => self.content = producer_error_text(error),
            _ => {}
        }
        self.finish(SessionStatus::Closed, outcome);
        Applied::Terminal
    }

    /// A campaign with no streamed blocks gets the same minimal block list a
    /// reloaded legacy record would, so live and persisted views agree.
    fn flush_completion(&mut self) {
        self.content = self
            .channels
            .answer()
            .map(str::to_string)
            .unwrap_or_else(|| COMPLETE_TEXT.to_string());

        if self.blocks.is_empty() && self.artifact.campaign().is_some() {
            self.blocks.push(Block::paragraph(self.content.clone()));
            self.blocks.push(Block::default_indicator());
            self.artifact.finalize();
        }
    }

    fn fail(&mut self, outcome: SessionOutcome) -> Applied {
        self.content = CONNECTION_ERROR_TEXT.to_string();
        self.finish(SessionStatus::Failed, outcome);
        Applied::Terminal
    }

    fn finish(&mut self, status: SessionStatus, outcome: SessionOutcome) {
        self.streaming = false;
        self.status = status;
        info!(
            request_id = self.request_id,
            message_id = %self.message_id,
            status = status.as_str(),
            outcome = ?outcome,
            "campaign stream finished"
        );
        self.outcome = Some(outcome);
    }

    fn set_content(&mut self, content: &str) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content.to_string();
        true
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn channels(&self) -> &AuxiliaryChannels {
        &self.channels
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.blocks()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn malformed_streak(&self) -> usize {
        self.malformed_streak
    }

    /// Transcript `jsonData` mirror derived from the accumulated state.
    pub fn json_data(&self) -> Option<Value> {
        snapshot::json_data(&self.artifact, self.blocks.blocks(), &self.channels)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stream_protocol::{Envelope, Tabs, ThoughtItem};

    use super::*;

    fn frame(envelope: Envelope) -> StreamSignal {
        StreamSignal::Frame {
            request_id: 1,
            frame: DecodedFrame::Envelope(envelope),
        }
    }

    fn malformed() -> StreamSignal {
        StreamSignal::Frame {
            request_id: 1,
            frame: DecodedFrame::Malformed {
                raw: "{oops".to_string(),
                reason: "expected value".to_string(),
            },
        }
    }

    fn session() -> StreamSession {
        StreamSession::new(1, "conv", "msg", 3, 0)
    }

    #[test]
    fn first_frame_activates_and_start_sets_status_text() {
        let mut session = session();
        assert_eq!(session.status(), SessionStatus::Opening);

        assert_eq!(
            session.apply(frame(Envelope::start("Starting")), 0),
            Applied::Changed
        );
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.content(), START_TEXT);
        assert!(session.is_streaming());
    }

    #[test]
    fn partial_updates_text_and_artifact() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial(
                "name",
                json!("Weekend Flash Sale"),
                json!({"campaign": {"name": "Weekend Flash Sale"}}),
            )),
            0,
        );

        assert_eq!(session.content(), "Generating campaign... (name added)");
        assert_eq!(
            session.artifact().campaign(),
            Some(&json!({"name": "Weekend Flash Sale"}))
        );
    }

    #[test]
    fn producer_error_keeps_partial_progress() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial("name", json!("X"), json!({"campaign": {"name": "X"}}))),
            0,
        );

        assert_eq!(
            session.apply(frame(Envelope::error("quota exceeded")), 0),
            Applied::Terminal
        );
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(session.content(), "Error generating campaign: quota exceeded");
        assert!(!session.is_streaming());
        assert_eq!(session.artifact().campaign(), Some(&json!({"name": "X"})));
    }

    #[test]
    fn three_consecutive_malformed_frames_fail_the_session() {
        let mut session = session();
        assert_eq!(session.apply(malformed(), 0), Applied::Ignored);
        assert_eq!(session.apply(malformed(), 0), Applied::Ignored);
        assert_eq!(session.apply(malformed(), 0), Applied::Terminal);

        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.outcome(), Some(&SessionOutcome::MalformedFrames(3)));
        assert_eq!(session.content(), CONNECTION_ERROR_TEXT);
    }

    #[test]
    fn a_good_envelope_resets_the_malformed_streak() {
        let mut session = session();
        session.apply(malformed(), 0);
        session.apply(malformed(), 0);
        session.apply(frame(Envelope::start("s")), 0);
        session.apply(malformed(), 0);

        assert_eq!(session.malformed_streak(), 1);
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[test]
    fn body_closing_without_terminal_envelope_fails() {
        let mut session = session();
        session.apply(frame(Envelope::start("s")), 0);

        assert_eq!(
            session.apply(StreamSignal::Ended { request_id: 1 }, 0),
            Applied::Terminal
        );
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.outcome(), Some(&SessionOutcome::EndedEarly));
        assert!(!session.is_streaming());
    }

    #[test]
    fn stall_fails_without_dropping_state() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial("name", json!("X"), json!({"campaign": {"name": "X"}}))),
            0,
        );
        session.apply(
            StreamSignal::Stalled {
                request_id: 1,
                idle: Duration::from_secs(30),
            },
            0,
        );

        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.artifact().campaign(), Some(&json!({"name": "X"})));
    }

    #[test]
    fn cancel_closes_without_artifact_mutation_and_drops_later_frames() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial("name", json!("X"), json!({"campaign": {"name": "X"}}))),
            0,
        );
        let before = session.artifact().clone();

        assert_eq!(session.cancel(), Applied::Terminal);
        assert_eq!(
            session.apply(
                frame(Envelope::complete(Some(json!({"campaign": {"name": "Y"}})))),
                0
            ),
            Applied::Ignored
        );
        assert_eq!(session.artifact(), &before);
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(session.outcome(), Some(&SessionOutcome::Cancelled));
        assert!(!session.is_streaming());
    }

    #[test]
    fn init_resets_channels_before_its_own_tabs_apply() {
        let mut session = session();
        session.apply(
            frame(Envelope::auxiliary(Tabs {
                images: vec!["old.png".to_string()],
                ..Tabs::default()
            })),
            0,
        );
        session.apply(
            frame(Envelope::block(BlockEvent::new(BlockKind::Init)).with_tabs(Tabs {
                thoughts: vec![ThoughtItem {
                    text: "thinking".to_string(),
                    ts: None,
                }],
                ..Tabs::default()
            })),
            7,
        );

        assert!(session.channels().images().is_empty());
        assert_eq!(session.channels().thoughts().len(), 1);
        assert_eq!(session.channels().thoughts()[0].ts, Some(7));
    }

    #[test]
    fn complete_without_blocks_synthesizes_legacy_blocks() {
        let mut session = session();
        session.apply(
            frame(Envelope::complete(Some(json!({"campaign": {"name": "X"}})))),
            0,
        );

        assert_eq!(session.content(), COMPLETE_TEXT);
        assert_eq!(
            session.blocks(),
            &[Block::paragraph(COMPLETE_TEXT), Block::default_indicator()]
        );
        assert!(session.artifact().is_finalized());
    }

    #[test]
    fn complete_payload_replaces_partial_leftovers() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial(
                "name",
                json!("Draft"),
                json!({"campaign": {"name": "Draft", "draft_note": "tmp", "meta": {"scratch": 1}}}),
            )),
            0,
        );
        let final_campaign = json!({
            "name": "Weekend Flash Sale",
            "channels": ["Email"],
            "meta": {"priority": "high"}
        });

        session.apply(
            frame(Envelope::complete(Some(json!({"campaign": final_campaign.clone()})))),
            0,
        );

        assert_eq!(session.artifact().campaign(), Some(&final_campaign));
        let json_data = session.json_data().expect("json data after complete");
        assert_eq!(json_data["campaign"], final_campaign);
        assert_eq!(json_data["uiComponent"]["data"]["campaign"], final_campaign);
    }

    #[test]
    fn complete_without_data_keeps_the_streamed_artifact() {
        let mut session = session();
        session.apply(
            frame(Envelope::partial("name", json!("X"), json!({"campaign": {"name": "X"}}))),
            0,
        );
        session.apply(frame(Envelope::complete(None)), 0);

        assert_eq!(session.artifact().campaign(), Some(&json!({"name": "X"})));
    }

    #[test]
    fn opened_activates_and_asks_for_a_publish() {
        let mut session = session();
        assert_eq!(
            session.apply(StreamSignal::Opened { request_id: 1 }, 0),
            Applied::Changed
        );
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(
            session.apply(StreamSignal::Opened { request_id: 1 }, 0),
            Applied::Ignored
        );
    }

    #[test]
    fn wrong_request_id_is_ignored() {
        let mut session = session();
        let stray = StreamSignal::Ended { request_id: 2 };
        assert_eq!(session.apply(stray, 0), Applied::Ignored);
        assert_eq!(session.status(), SessionStatus::Opening);
    }
}
