use std::fs;
use std::path::PathBuf;

use history_store::{
    history_path, HistoryState, HistoryStore, HistoryStoreError, MessagePatch, Role,
    TranscriptEntry,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn temp_history() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = history_path(dir.path());
    (dir, path)
}

#[test]
fn missing_file_opens_as_empty_history() {
    let (_dir, path) = temp_history();

    let store = HistoryStore::open(&path).expect("missing file should open");

    assert_eq!(store.state(), &HistoryState::default());
    assert!(!path.exists());
}

#[test]
fn saved_history_reopens_identically() {
    let (_dir, path) = temp_history();
    let mut store = HistoryStore::open(&path).expect("open");
    let state = store.state_mut();
    state.create_conversation("conv-1", "Flash sale");
    state.add_message("conv-1", TranscriptEntry::new("u1", Role::User, "flash sale"));
    let mut reply = TranscriptEntry::new("a1", Role::Assistant, "done");
    reply.json_data = Some(json!({"campaign": {"name": "Weekend Flash Sale"}, "blocks": []}));
    state.add_message("conv-1", reply);

    store.save().expect("save should succeed");
    let reopened = HistoryStore::open(&path).expect("reopen");

    assert_eq!(reopened.state(), store.state());
    assert_eq!(reopened.state().active_conversation_id.as_deref(), Some("conv-1"));
}

#[test]
fn save_leaves_no_staging_file_behind() {
    let (dir, path) = temp_history();
    let store = HistoryStore::in_memory(path.clone(), HistoryState::default());

    store.save().expect("save should succeed");

    let names = fs::read_dir(path.parent().expect("history dir"))
        .expect("list history dir")
        .map(|entry| entry.expect("dir entry").file_name())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![std::ffi::OsString::from("history.json")]);
    drop(dir);
}

#[test]
fn legacy_records_are_normalized_on_load() {
    let (_dir, path) = temp_history();
    fs::create_dir_all(path.parent().expect("history dir")).expect("create dir");
    let legacy = json!({
        "conversations": [{
            "id": "conv",
            "title": "Old",
            "createdAt": 1,
            "messages": [{
                "id": "a",
                "type": "assistant",
                "content": "Here it is",
                "timestamp": 2,
                "streaming": true,
                "jsonData": {"campaign": {"name": "Legacy"}}
            }]
        }],
        "activeConversationId": "conv"
    });
    fs::write(&path, legacy.to_string()).expect("write legacy file");

    let store = HistoryStore::open(&path).expect("open legacy");
    let message = store.state().message("conv", "a").expect("message");

    assert!(!message.streaming);
    let json_data = message.json_data.as_ref().expect("json data");
    assert_eq!(json_data["blocks"][0], json!({"kind": "para", "content": "Here it is"}));
    assert_eq!(json_data["uiComponent"]["type"], json!("campaign_configurator"));
}

#[test]
fn corrupt_file_reports_parse_error() {
    let (_dir, path) = temp_history();
    fs::create_dir_all(path.parent().expect("history dir")).expect("create dir");
    fs::write(&path, "{not json").expect("write corrupt file");

    let error = HistoryStore::open(&path).expect_err("corrupt file should fail");

    assert!(matches!(error, HistoryStoreError::JsonParse { .. }));
}

#[test]
fn patches_persist_across_save() {
    let (_dir, path) = temp_history();
    let mut store = HistoryStore::open(&path).expect("open");
    store.state_mut().create_conversation("c", "t");
    store
        .state_mut()
        .add_message("c", TranscriptEntry::new("a", Role::Assistant, "").streaming(true));
    store.state_mut().update_message(
        "c",
        "a",
        &MessagePatch {
            content: Some("final".to_string()),
            streaming: Some(false),
            json_data: None,
        },
    );
    store.save().expect("save");

    let reopened = HistoryStore::open(&path).expect("reopen");
    let message = reopened.state().message("c", "a").expect("message");
    assert_eq!(message.content, "final");
    assert!(!message.streaming);
}
