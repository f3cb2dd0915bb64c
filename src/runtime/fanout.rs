//! Fan-out of session state to the transcript, history and panel sinks.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use generation_engine::RequestId;
use history_store::{HistoryState, TranscriptEntry};
use stream_protocol::Feedback;

use crate::core::blocks::Block;
use crate::runtime::session::{SessionStatus, StreamSession};

/// Identity of one message across every sink.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    pub conversation_id: String,
    pub message_id: String,
}

impl MessageKey {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// Inspection-panel view of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSnapshot {
    pub request_id: RequestId,
    pub status: SessionStatus,
    pub artifact: Value,
    pub blocks: Vec<Block>,
    pub tabs: Value,
    pub feedback: Option<Feedback>,
}

/// The three sinks, written together by [`FanoutSynchronizer::publish`].
#[derive(Debug, Clone, Default)]
pub struct FanoutSynchronizer {
    transcript: BTreeMap<MessageKey, TranscriptEntry>,
    history: HistoryState,
    panel: BTreeMap<MessageKey, PanelSnapshot>,
    writes: BTreeMap<RequestId, usize>,
    history_dirty: bool,
}

impl FanoutSynchronizer {
    #[must_use]
    pub fn new(history: HistoryState) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    /// Registers a freshly submitted entry in the transcript and history.
    pub fn bind_entry(&mut self, conversation_id: &str, entry: TranscriptEntry) -> bool {
        let key = MessageKey::new(conversation_id, entry.id.clone());
        if !self.history.add_message(conversation_id, entry.clone()) {
            warn!(conversation_id, message_id = %key.message_id, "no conversation to bind entry to");
            return false;
        }
        self.transcript.insert(key, entry);
        self.history_dirty = true;
        true
    }

    /// Writes the session's derived state to all three sinks in one call.
    pub fn publish(&mut self, session: &StreamSession) {
        let key = MessageKey::new(session.conversation_id(), session.message_id());
        let json_data = session.json_data();

        let transcript_entry = self.transcript.entry(key.clone()).or_insert_with(|| {
            TranscriptEntry::new(
                key.message_id.clone(),
                history_store::Role::Assistant,
                String::new(),
            )
        });
        sync_entry(transcript_entry, session, &json_data);

        match self
            .history
            .conversation_mut(&key.conversation_id)
            .and_then(|conversation| conversation.message_mut(&key.message_id))
        {
            Some(entry) => {
                sync_entry(entry, session, &json_data);
                self.history_dirty = true;
            }
            None => warn!(
                conversation_id = %key.conversation_id,
                message_id = %key.message_id,
                "history has no entry for streamed message"
            ),
        }

        self.panel.insert(
            key,
            PanelSnapshot {
                request_id: session.request_id(),
                status: session.status(),
                artifact: session.artifact().to_value(),
                blocks: session.blocks().to_vec(),
                tabs: session.channels().to_value(),
                feedback: session.channels().feedback(),
            },
        );

        *self.writes.entry(session.request_id()).or_default() += 1;
        debug!(
            request_id = session.request_id(),
            status = session.status().as_str(),
            "published session state"
        );
    }

    /// Flips feedback on a message that has no live session by editing its
    /// persisted `tabs` mirror. Returns `None` when history lacks the message.
    pub fn toggle_persisted_feedback(
        &mut self,
        key: &MessageKey,
        feedback: Feedback,
    ) -> Option<Option<Feedback>> {
        let entry = self
            .history
            .conversation_mut(&key.conversation_id)?
            .message_mut(&key.message_id)?;
        let next = toggle_entry_feedback(entry, feedback);
        let json_data = entry.json_data.clone();

        if let Some(live) = self.transcript.get_mut(key) {
            live.json_data = json_data;
        }
        if let Some(panel) = self.panel.get_mut(key) {
            panel.feedback = next;
        }
        self.history_dirty = true;
        debug!(message_id = %key.message_id, ?next, "feedback set on persisted message");
        Some(next)
    }

    pub fn transcript_entry(&self, key: &MessageKey) -> Option<&TranscriptEntry> {
        self.transcript.get(key)
    }

    pub fn panel(&self, key: &MessageKey) -> Option<&PanelSnapshot> {
        self.panel.get(key)
    }

    /// Latest panel snapshot for a conversation; never one from another conversation.
    pub fn latest_panel(&self, conversation_id: &str) -> Option<(&MessageKey, &PanelSnapshot)> {
        let conversation = self.history.conversation(conversation_id)?;
        conversation.messages.iter().rev().find_map(|message| {
            self.panel
                .get_key_value(&MessageKey::new(conversation_id, message.id.clone()))
        })
    }

    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut HistoryState {
        self.history_dirty = true;
        &mut self.history
    }

    /// Sink writes published on behalf of `request_id`.
    pub fn writes_for(&self, request_id: RequestId) -> usize {
        self.writes.get(&request_id).copied().unwrap_or(0)
    }

    /// Returns whether history changed since the last call.
    pub fn take_history_dirty(&mut self) -> bool {
        std::mem::take(&mut self.history_dirty)
    }
}

fn sync_entry(entry: &mut TranscriptEntry, session: &StreamSession, json_data: &Option<Value>) {
    entry.content = session.content().to_string();
    entry.streaming = session.is_streaming();
    entry.json_data = json_data.clone();
}

/// Same toggle and mirror shape as a live session: cleared feedback drops the
/// key, and an emptied `tabs` object is dropped with it.
fn toggle_entry_feedback(entry: &mut TranscriptEntry, feedback: Feedback) -> Option<Feedback> {
    let mut data = match entry.json_data.take() {
        Some(Value::Object(data)) => data,
        _ => Map::from_iter([("blocks".to_owned(), Value::Array(Vec::new()))]),
    };
    let mut tabs = match data.remove("tabs") {
        Some(Value::Object(tabs)) => tabs,
        _ => Map::new(),
    };

    let current = tabs
        .get("feedback")
        .and_then(Value::as_str)
        .and_then(Feedback::parse);
    let next = if current == Some(feedback) {
        None
    } else {
        Some(feedback)
    };
    match next {
        Some(feedback) => {
            tabs.insert(
                "feedback".to_owned(),
                Value::String(feedback.as_str().to_owned()),
            );
        }
        None => {
            tabs.remove("feedback");
        }
    }

    if !tabs.is_empty() {
        data.insert("tabs".to_owned(), Value::Object(tabs));
    }
    entry.json_data = Some(Value::Object(data));
    next
}
