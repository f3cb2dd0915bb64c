//! Session controller: the single entry point that mutates streaming messages.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use generation_engine::{GenerationRequest, RequestId, StreamSignal};
use history_store::{
    new_record_id, now_millis, title_from_query, HistoryState, Role, TranscriptEntry,
};
use stream_protocol::{Feedback, ModeFlags, Tabs};

use crate::config::DEFAULT_MALFORMED_LIMIT;
use crate::core::blocks::Block;
use crate::core::channels::AuxiliaryChannels;
use crate::runtime::fanout::{FanoutSynchronizer, MessageKey, PanelSnapshot};
use crate::runtime::session::{Applied, StreamSession};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("unknown conversation {0}")]
    UnknownConversation(String),
    #[error("no user prompt precedes message {0}")]
    NoPrompt(String),
    #[error("no active conversation")]
    NoActiveConversation,
}

/// A session the host must now drive with a generation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub request: GenerationRequest,
    pub conversation_id: String,
    pub message_id: String,
    /// Previous request for the same message; the host should cancel its stream.
    pub superseded: Option<RequestId>,
}

/// Owns every stream session and routes their updates through the fan-out sinks.
#[derive(Debug)]
pub struct SessionController {
    malformed_limit: usize,
    next_request_id: RequestId,
    sessions: HashMap<String, StreamSession>,
    requests: HashMap<RequestId, String>,
    fanout: FanoutSynchronizer,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(HistoryState::default())
    }
}

impl SessionController {
    #[must_use]
    pub fn new(history: HistoryState) -> Self {
        Self::with_malformed_limit(history, DEFAULT_MALFORMED_LIMIT)
    }

    #[must_use]
    pub fn with_malformed_limit(history: HistoryState, malformed_limit: usize) -> Self {
        Self {
            malformed_limit: malformed_limit.max(1),
            next_request_id: 1,
            sessions: HashMap::new(),
            requests: HashMap::new(),
            fanout: FanoutSynchronizer::new(history),
        }
    }

    /// Records a user query and opens a session for a new assistant entry.
    ///
    /// Binds to the active conversation, creating one first when none is active.
    pub fn submit(
        &mut self,
        query: &str,
        modes: ModeFlags,
    ) -> Result<StartedSession, ControllerError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ControllerError::EmptyQuery);
        }

        let conversation_id = self.bind_conversation(query);
        self.fanout
            .bind_entry(&conversation_id, TranscriptEntry::new(new_record_id(), Role::User, query));

        let message_id = new_record_id();
        self.fanout.bind_entry(
            &conversation_id,
            TranscriptEntry::new(message_id.clone(), Role::Assistant, "").streaming(true),
        );

        self.start_session(&modes.apply(query), &message_id)
    }

    /// Opens a session that (re)fills `target_message_id`.
    ///
    /// A live session for the same message is superseded before the new one
    /// exists, so the two never interleave writes.
    pub fn start_session(
        &mut self,
        query: &str,
        target_message_id: &str,
    ) -> Result<StartedSession, ControllerError> {
        let conversation_id = self
            .conversation_of(target_message_id)
            .ok_or_else(|| ControllerError::UnknownMessage(target_message_id.to_string()))?;

        let superseded = self.supersede(target_message_id);

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let session = StreamSession::new(
            request_id,
            conversation_id.clone(),
            target_message_id,
            self.malformed_limit,
            now_millis(),
        );
        self.fanout.publish(&session);
        self.sessions.insert(target_message_id.to_string(), session);
        self.requests
            .insert(request_id, target_message_id.to_string());
        info!(
            request_id,
            message_id = target_message_id,
            %conversation_id,
            "campaign session opened"
        );

        Ok(StartedSession {
            request: GenerationRequest::new(request_id, query),
            conversation_id,
            message_id: target_message_id.to_string(),
            superseded,
        })
    }

    /// Re-runs the user prompt that precedes `message_id` into the same entry.
    pub fn regenerate(
        &mut self,
        message_id: &str,
        modes: ModeFlags,
    ) -> Result<StartedSession, ControllerError> {
        let conversation_id = self
            .conversation_of(message_id)
            .ok_or_else(|| ControllerError::UnknownMessage(message_id.to_string()))?;
        let conversation = self
            .fanout
            .history()
            .conversation(&conversation_id)
            .ok_or_else(|| ControllerError::UnknownConversation(conversation_id.clone()))?;
        let prompt = conversation
            .messages
            .iter()
            .take_while(|message| message.id != message_id)
            .filter(|message| message.role == Role::User)
            .last()
            .map(|message| message.content.clone())
            .ok_or_else(|| ControllerError::NoPrompt(message_id.to_string()))?;

        self.start_session(&modes.apply(&prompt), message_id)
    }

    /// Applies one engine signal. Signals from unknown or superseded requests are dropped.
    pub fn apply(&mut self, signal: StreamSignal) -> Applied {
        let request_id = signal.request_id();
        let Some(message_id) = self.requests.get(&request_id).cloned() else {
            debug!(request_id, "dropping signal for retired request");
            return Applied::Ignored;
        };
        let Some(session) = self.sessions.get_mut(&message_id) else {
            self.requests.remove(&request_id);
            return Applied::Ignored;
        };
        if session.request_id() != request_id {
            warn!(
                request_id,
                current = session.request_id(),
                "dropping signal from superseded session"
            );
            self.requests.remove(&request_id);
            return Applied::Ignored;
        }

        let applied = session.apply(signal, now_millis());
        if applied.needs_publish() {
            self.fanout.publish(session);
        }
        if applied == Applied::Terminal {
            self.requests.remove(&request_id);
        }
        applied
    }

    /// Cancels the live session for a message and returns its request id.
    pub fn cancel_session(&mut self, message_id: &str) -> Option<RequestId> {
        let session = self.sessions.get_mut(message_id)?;
        if session.cancel() != Applied::Terminal {
            return None;
        }
        let request_id = session.request_id();
        self.fanout.publish(session);
        self.requests.remove(&request_id);
        info!(request_id, message_id, "campaign session cancelled");
        Some(request_id)
    }

    /// Cancels every live session, returning the cancelled request ids.
    pub fn cancel_all(&mut self) -> Vec<RequestId> {
        let live = self
            .sessions
            .iter()
            .filter(|(_, session)| session.status().is_live())
            .map(|(message_id, _)| message_id.clone())
            .collect::<Vec<_>>();
        live.iter()
            .filter_map(|message_id| self.cancel_session(message_id))
            .collect()
    }

    pub fn set_feedback(
        &mut self,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<Option<Feedback>, ControllerError> {
        if let Some(session) = self.sessions.get_mut(message_id) {
            let next = session.toggle_feedback(feedback);
            self.fanout.publish(session);
            return Ok(next);
        }

        // Reloaded messages have no session; their feedback lives in history.
        let unknown = || ControllerError::UnknownMessage(message_id.to_string());
        let conversation_id = self.conversation_of(message_id).ok_or_else(unknown)?;
        self.fanout
            .toggle_persisted_feedback(&MessageKey::new(conversation_id, message_id), feedback)
            .ok_or_else(unknown)
    }

    pub fn set_active_conversation(&mut self, conversation_id: &str) -> Result<(), ControllerError> {
        if self.fanout.history().conversation(conversation_id).is_none() {
            return Err(ControllerError::UnknownConversation(
                conversation_id.to_string(),
            ));
        }
        self.fanout
            .history_mut()
            .set_active_conversation(conversation_id);
        Ok(())
    }

    /// Retitles the active conversation and returns its id.
    pub fn rename_active_conversation(&mut self, title: &str) -> Result<String, ControllerError> {
        let conversation_id = self
            .fanout
            .history()
            .active_conversation()
            .map(|conversation| conversation.id.clone())
            .ok_or(ControllerError::NoActiveConversation)?;
        self.fanout
            .history_mut()
            .rename_conversation(&conversation_id, title.trim());
        Ok(conversation_id)
    }

    /// Starts a fresh thread; the conversation record is created on the next submit.
    pub fn new_conversation(&mut self) {
        self.fanout.history_mut().active_conversation_id = None;
    }

    fn bind_conversation(&mut self, query: &str) -> String {
        if let Some(active) = self.fanout.history().active_conversation() {
            return active.id.clone();
        }
        let conversation_id = new_record_id();
        self.fanout
            .history_mut()
            .create_conversation(conversation_id.clone(), title_from_query(query));
        conversation_id
    }

    fn supersede(&mut self, message_id: &str) -> Option<RequestId> {
        let previous = self.sessions.get_mut(message_id)?;
        let request_id = previous.request_id();
        self.requests.remove(&request_id);
        if !previous.supersede() {
            return None;
        }
        info!(request_id, message_id, "campaign session superseded");
        Some(request_id)
    }

    fn conversation_of(&self, message_id: &str) -> Option<String> {
        self.fanout
            .history()
            .conversations
            .iter()
            .find(|conversation| conversation.message(message_id).is_some())
            .map(|conversation| conversation.id.clone())
    }

    pub fn session(&self, message_id: &str) -> Option<&StreamSession> {
        self.sessions.get(message_id)
    }

    pub fn session_for_request(&self, request_id: RequestId) -> Option<&StreamSession> {
        self.sessions
            .values()
            .find(|session| session.request_id() == request_id)
    }

    pub fn transcript_entry(&self, message_id: &str) -> Option<&TranscriptEntry> {
        let conversation_id = self.conversation_of(message_id)?;
        self.fanout
            .transcript_entry(&MessageKey::new(conversation_id.clone(), message_id))
            .or_else(|| self.fanout.history().message(&conversation_id, message_id))
    }

    /// Artifact of a message: live when streamed this run, else from its persisted mirror.
    pub fn artifact_snapshot(&self, message_id: &str) -> Option<Value> {
        if let Some(session) = self.sessions.get(message_id) {
            return Some(session.artifact().to_value());
        }
        let mut artifact = self.persisted_json_data(message_id)?.as_object()?.clone();
        artifact.remove("blocks");
        artifact.remove("tabs");
        Some(Value::Object(artifact))
    }

    pub fn channels(&self, message_id: &str) -> Option<AuxiliaryChannels> {
        if let Some(session) = self.sessions.get(message_id) {
            return Some(session.channels().clone());
        }
        self.transcript_entry(message_id)?;
        let tabs = self
            .persisted_json_data(message_id)
            .and_then(|data| data.get("tabs"))
            .and_then(|tabs| Tabs::from_value(tabs.clone()).ok())
            .unwrap_or_default();
        Some(AuxiliaryChannels::from_tabs(&tabs))
    }

    pub fn blocks(&self, message_id: &str) -> Option<Vec<Block>> {
        if let Some(session) = self.sessions.get(message_id) {
            return Some(session.blocks().to_vec());
        }
        self.transcript_entry(message_id)?;
        let blocks = self
            .persisted_json_data(message_id)
            .and_then(|data| data.get("blocks"))
            .and_then(|blocks| serde_json::from_value::<Vec<Block>>(blocks.clone()).ok())
            .unwrap_or_default();
        Some(blocks)
    }

    fn persisted_json_data(&self, message_id: &str) -> Option<&Value> {
        self.transcript_entry(message_id)?.json_data.as_ref()
    }

    /// Panel snapshot for the active conversation's newest streamed message.
    pub fn active_panel(&self) -> Option<&PanelSnapshot> {
        let active = self.fanout.history().active_conversation_id.as_deref()?;
        self.fanout.latest_panel(active).map(|(_, panel)| panel)
    }

    pub fn history(&self) -> &HistoryState {
        self.fanout.history()
    }

    pub fn fanout(&self) -> &FanoutSynchronizer {
        &self.fanout
    }

    /// Returns whether history changed since the last call.
    pub fn take_history_dirty(&mut self) -> bool {
        self.fanout.take_history_dirty()
    }

    pub fn live_requests(&self) -> Vec<RequestId> {
        let mut live = self.requests.keys().copied().collect::<Vec<_>>();
        live.sort_unstable();
        live
    }

    pub fn is_streaming(&self) -> bool {
        !self.requests.is_empty()
    }
}
