use serde_json::{json, Map, Value};

use crate::schema::{HistoryState, Role, TranscriptEntry};

pub const INDICATOR_TITLE: &str = "Campaign Configuration";
pub const INDICATOR_DESCRIPTION: &str = "Generated campaign configuration";
pub const UI_COMPONENT_TYPE: &str = "campaign_configurator";

/// Upgrades every record so older history renders like a fresh stream.
///
/// Returns the number of messages whose `jsonData` was rewritten.
pub fn normalize_history(state: &mut HistoryState) -> usize {
    state
        .conversations
        .iter_mut()
        .flat_map(|conversation| conversation.messages.iter_mut())
        .map(normalize_entry)
        .filter(|upgraded| *upgraded)
        .count()
}

/// A hydrated entry is never streaming. Assistant entries carrying a campaign
/// but no blocks get the minimal block list and a configurator component.
pub fn normalize_entry(entry: &mut TranscriptEntry) -> bool {
    entry.streaming = false;
    if entry.role != Role::Assistant {
        return false;
    }

    match entry.json_data.as_mut() {
        Some(Value::Object(json_data)) => upgrade_legacy_json_data(&entry.content, json_data),
        _ => false,
    }
}

/// Adds `blocks` and `uiComponent` to a campaign-bearing snapshot that lacks blocks.
pub fn upgrade_legacy_json_data(content: &str, json_data: &mut Map<String, Value>) -> bool {
    let has_campaign = json_data
        .get("campaign")
        .is_some_and(|campaign| !campaign.is_null());
    let has_blocks = json_data.get("blocks").is_some_and(Value::is_array);
    if !has_campaign || has_blocks {
        return false;
    }

    json_data.insert("blocks".to_owned(), legacy_blocks(content));
    let has_ui = json_data
        .get("uiComponent")
        .is_some_and(|component| !component.is_null());
    if !has_ui {
        let campaign = json_data.get("campaign").cloned().unwrap_or(Value::Null);
        json_data.insert(
            "uiComponent".to_owned(),
            ui_component(json!({ "campaign": campaign })),
        );
    }
    true
}

#[must_use]
pub fn legacy_blocks(content: &str) -> Value {
    json!([
        {"kind": "para", "content": content},
        {
            "kind": "artifact_indicator",
            "title": INDICATOR_TITLE,
            "description": INDICATOR_DESCRIPTION,
        },
    ])
}

#[must_use]
pub fn ui_component(data: Value) -> Value {
    json!({ "type": UI_COMPONENT_TYPE, "data": data })
}
