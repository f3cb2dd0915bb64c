use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::HistoryStoreError;

pub const UNTITLED_CONVERSATION: &str = "Untitled chat";
pub const MAX_TITLE_CHARS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One chat-visible message as persisted inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub streaming: bool,
    /// Snapshot mirror of the artifact, blocks and auxiliary channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_data: Option<Value>,
}

impl TranscriptEntry {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: now_millis(),
            streaming: false,
            json_data: None,
        }
    }

    #[must_use]
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(streaming) = patch.streaming {
            self.streaming = streaming;
        }
        if let Some(json_data) = &patch.json_data {
            self.json_data = Some(json_data.clone());
        }
    }
}

/// Partial update of a transcript entry; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub streaming: Option<bool>,
    pub json_data: Option<Value>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.streaming.is_none() && self.json_data.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub messages: Vec<TranscriptEntry>,
}

impl ConversationRecord {
    pub fn message(&self, message_id: &str) -> Option<&TranscriptEntry> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut TranscriptEntry> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }
}

/// Whole persisted history: conversations newest first plus the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    #[serde(default)]
    pub active_conversation_id: Option<String>,
}

impl HistoryState {
    /// Inserts a conversation at the front and makes it active.
    pub fn create_conversation(&mut self, id: impl Into<String>, title: impl Into<String>) {
        let id = id.into();
        self.conversations.insert(
            0,
            ConversationRecord {
                id: id.clone(),
                title: title.into(),
                created_at: now_millis(),
                messages: Vec::new(),
            },
        );
        self.active_conversation_id = Some(id);
    }

    pub fn set_active_conversation(&mut self, id: impl Into<String>) {
        self.active_conversation_id = Some(id.into());
    }

    pub fn rename_conversation(&mut self, id: &str, title: impl Into<String>) -> bool {
        match self.conversation_mut(id) {
            Some(conversation) => {
                conversation.title = title.into();
                true
            }
            None => false,
        }
    }

    pub fn add_message(&mut self, conversation_id: &str, message: TranscriptEntry) -> bool {
        match self.conversation_mut(conversation_id) {
            Some(conversation) => {
                conversation.messages.push(message);
                true
            }
            None => false,
        }
    }

    pub fn update_message(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        patch: &MessagePatch,
    ) -> bool {
        match self
            .conversation_mut(conversation_id)
            .and_then(|conversation| conversation.message_mut(message_id))
        {
            Some(message) => {
                message.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Removes a conversation; if it was active, the first remaining one becomes active.
    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let Some(index) = self
            .conversations
            .iter()
            .position(|conversation| conversation.id == id)
        else {
            return false;
        };

        self.conversations.remove(index);
        if self.active_conversation_id.as_deref() == Some(id) {
            self.active_conversation_id = self
                .conversations
                .first()
                .map(|conversation| conversation.id.clone());
        }
        true
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.active_conversation_id = None;
    }

    pub fn conversation(&self, id: &str) -> Option<&ConversationRecord> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
    }

    pub fn conversation_mut(&mut self, id: &str) -> Option<&mut ConversationRecord> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == id)
    }

    pub fn active_conversation(&self) -> Option<&ConversationRecord> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&TranscriptEntry> {
        self.conversation(conversation_id)
            .and_then(|conversation| conversation.message(message_id))
    }
}

/// Conversation title derived from the first query of a conversation.
#[must_use]
pub fn title_from_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return UNTITLED_CONVERSATION.to_string();
    }
    trimmed.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

#[must_use]
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[must_use]
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Renders an epoch-millisecond timestamp as RFC3339 for display.
pub fn format_millis(millis: i64) -> Result<String, HistoryStoreError> {
    let nanos = i128::from(millis) * 1_000_000;
    let moment = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|_| HistoryStoreError::TimestampRange { millis })?;
    moment.format(&Rfc3339).map_err(HistoryStoreError::ClockFormat)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entry_serializes_with_camel_case_and_type_role() {
        let mut entry = TranscriptEntry::new("m1", Role::Assistant, "hi");
        entry.timestamp = 5;
        entry.json_data = Some(json!({"campaign": {}}));

        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(
            value,
            json!({
                "id": "m1",
                "type": "assistant",
                "content": "hi",
                "timestamp": 5,
                "streaming": false,
                "jsonData": {"campaign": {}}
            })
        );
    }

    #[test]
    fn delete_active_falls_back_to_first_remaining() {
        let mut state = HistoryState::default();
        state.create_conversation("a", "A");
        state.create_conversation("b", "B");
        state.create_conversation("c", "C");
        state.set_active_conversation("b");

        assert!(state.delete_conversation("b"));
        assert_eq!(state.active_conversation_id.as_deref(), Some("c"));

        assert!(!state.delete_conversation("missing"));
        state.clear();
        assert_eq!(state.active_conversation_id, None);
    }

    #[test]
    fn update_message_patches_only_given_fields() {
        let mut state = HistoryState::default();
        state.create_conversation("conv", "t");
        state.add_message("conv", TranscriptEntry::new("m", Role::Assistant, "old").streaming(true));

        assert!(state.update_message(
            "conv",
            "m",
            &MessagePatch {
                streaming: Some(false),
                ..MessagePatch::default()
            }
        ));

        let message = state.message("conv", "m").expect("message exists");
        assert_eq!(message.content, "old");
        assert!(!message.streaming);
        assert!(!state.update_message("conv", "other", &MessagePatch::default()));
    }

    #[test]
    fn titles_are_trimmed_and_truncated() {
        assert_eq!(title_from_query("   "), UNTITLED_CONVERSATION);
        assert_eq!(title_from_query("  flash sale  "), "flash sale");
        let long = "é".repeat(60);
        assert_eq!(title_from_query(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn millis_format_as_rfc3339() {
        assert_eq!(
            format_millis(1_759_053_600_000).expect("format"),
            "2025-09-28T10:00:00Z"
        );
    }
}
