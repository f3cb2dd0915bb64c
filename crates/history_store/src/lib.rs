mod error;
mod normalize;
mod paths;
mod schema;
mod store;

pub use error::HistoryStoreError;
pub use normalize::{
    legacy_blocks, normalize_entry, normalize_history, ui_component, upgrade_legacy_json_data,
    INDICATOR_DESCRIPTION, INDICATOR_TITLE, UI_COMPONENT_TYPE,
};
pub use paths::{history_path, HISTORY_DIR, HISTORY_FILE};
pub use schema::{
    format_millis, new_record_id, now_millis, title_from_query, ConversationRecord,
    HistoryState, MessagePatch, Role, TranscriptEntry, MAX_TITLE_CHARS, UNTITLED_CONVERSATION,
};
pub use store::HistoryStore;
