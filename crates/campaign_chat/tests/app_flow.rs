use std::sync::Arc;
use std::time::Duration;

use campaign_chat::app::ChatApp;
use campaign_chat::runtime::ChatRuntime;
use campaign_stream::{COMPLETE_TEXT, START_TEXT};
use generation_engine_mock::{ScriptSource, ScriptedEngine};
use history_store::{history_path, HistoryStore, Role};

struct Harness {
    _dir: tempfile::TempDir,
    path: std::path::PathBuf,
    app: ChatApp,
}

fn open_app(path: &std::path::Path, source: ScriptSource) -> ChatApp {
    let store = HistoryStore::open(path).expect("history should open");
    let engine = Arc::new(ScriptedEngine::new(source).without_pauses());
    let runtime = ChatRuntime::with_store(store, engine, 3);
    ChatApp::new(runtime).with_stream_timeout(Duration::from_secs(10))
}

impl Harness {
    fn new(source: ScriptSource) -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = history_path(dir.path());
        let app = open_app(&path, source);
        Self {
            _dir: dir,
            path,
            app,
        }
    }

    /// Drops the running app and starts a fresh one over the saved history.
    fn restart(&mut self, source: ScriptSource) {
        self.app.runtime().shutdown();
        self.app = open_app(&self.path, source);
    }

    fn run(&mut self, line: &str) -> String {
        let mut out = Vec::new();
        self.app
            .handle_line(line, &mut out)
            .expect("writing to a buffer should succeed");
        String::from_utf8(out).expect("output should be utf-8")
    }
}

#[test]
fn plain_text_streams_and_renders_the_final_message() {
    let mut harness = Harness::new(ScriptSource::PartialFields);

    let output = harness.run("weekend flash sale for cart abandoners");

    assert!(output.contains(START_TEXT), "{output}");
    assert!(output.contains(COMPLETE_TEXT), "{output}");
    assert!(output.contains("[Campaign Configuration]"), "{output}");
    assert!(output.contains("\"name\": \"Weekend Flash Sale\""), "{output}");
    assert!(!output.contains("uiComponent"), "{output}");

    let saved = HistoryStore::open(&harness.path).expect("history should be saved");
    let conversation = saved.state().active_conversation().expect("active conversation");
    assert_eq!(conversation.title, "weekend flash sale for cart abandoners");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, Role::User);
    assert!(conversation.messages.iter().all(|message| !message.streaming));
}

#[test]
fn block_stream_renders_every_block_kind() {
    let mut harness = Harness::new(ScriptSource::Blocks);

    let output = harness.run("holiday launch");

    assert!(output.contains("I'll help you create a targeted campaign."), "{output}");
    assert!(output.contains("Summary: Holiday Campaign is ready for review."), "{output}");
    assert!(output.contains("Suggestions:\n  - Add an A/B test"), "{output}");
    assert!(output.contains("Review the configuration and launch when ready."), "{output}");
    assert_eq!(output.matches("[Campaign Configuration]").count(), 1, "{output}");
}

#[test]
fn mode_toggles_report_their_state() {
    let mut harness = Harness::new(ScriptSource::Blocks);

    assert_eq!(harness.run("/deepthink"), "Deep thinking on.\n");
    assert_eq!(harness.run("/web"), "Web search on.\n");
    assert_eq!(harness.run("/deepthink"), "Deep thinking off.\n");
    assert!(!harness.app.modes().deepthink);
    assert!(harness.app.modes().web_search);
}

#[test]
fn feedback_toggles_on_the_latest_reply() {
    let mut harness = Harness::new(ScriptSource::PartialFields);
    assert_eq!(harness.run("/up"), "No reply to rate yet.\n");

    harness.run("flash sale");
    assert_eq!(harness.run("/up"), "Feedback: up.\n");
    assert_eq!(harness.run("/up"), "Feedback cleared.\n");
    assert_eq!(harness.run("/down"), "Feedback: down.\n");
}

#[test]
fn feedback_works_on_a_reply_from_saved_history() {
    let mut harness = Harness::new(ScriptSource::PartialFields);
    harness.run("flash sale");
    harness.restart(ScriptSource::PartialFields);

    assert_eq!(harness.run("/up"), "Feedback: up.\n");

    let saved = HistoryStore::open(&harness.path).expect("history");
    let reply = saved
        .state()
        .active_conversation()
        .and_then(|conversation| conversation.messages.last())
        .expect("assistant reply");
    assert_eq!(
        reply
            .json_data
            .as_ref()
            .map(|data| data["tabs"]["feedback"].clone()),
        Some(serde_json::json!("up"))
    );
    assert_eq!(harness.run("/up"), "Feedback cleared.\n");
}

#[test]
fn conversations_can_be_listed_and_switched() {
    let mut harness = Harness::new(ScriptSource::PartialFields);
    assert_eq!(harness.run("/list"), "No conversations yet.\n");

    harness.run("first flash sale");
    assert_eq!(harness.run("/new"), "Started a new conversation.\n");
    harness.run("second flash sale");

    let listing = harness.run("/list");
    let lines = listing.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2, "{listing}");
    assert!(lines[0].starts_with('*'), "{listing}");
    assert!(lines[0].contains("second flash sale"), "{listing}");
    assert!(lines[1].contains("first flash sale"), "{listing}");

    let first_id = lines[1]
        .split_whitespace()
        .next()
        .expect("conversation id")
        .to_string();
    let transcript = harness.run(&format!("/switch {first_id}"));
    assert!(transcript.starts_with("== first flash sale =="), "{transcript}");
    assert!(transcript.contains("you: first flash sale"), "{transcript}");
    assert!(transcript.contains(&format!("assistant: {COMPLETE_TEXT}")), "{transcript}");

    assert!(harness.run("/switch missing").starts_with("error: "));
    assert_eq!(harness.run("/switch"), "usage: /switch <conversation id>\n");
}

#[test]
fn rename_retitles_the_active_conversation() {
    let mut harness = Harness::new(ScriptSource::PartialFields);
    assert_eq!(
        harness.run("/rename Spring push"),
        "error: no active conversation\n"
    );

    harness.run("flash sale");
    assert_eq!(harness.run("/rename"), "usage: /rename <title>\n");
    assert_eq!(
        harness.run("/rename Spring loyalty push"),
        "Renamed conversation to \"Spring loyalty push\".\n"
    );

    let saved = HistoryStore::open(&harness.path).expect("history");
    assert_eq!(
        saved.state().active_conversation().map(|conversation| conversation.title.as_str()),
        Some("Spring loyalty push")
    );
}

#[test]
fn regenerate_reuses_the_assistant_message() {
    let mut harness = Harness::new(ScriptSource::PartialFields);
    assert_eq!(harness.run("/regenerate"), "Nothing to regenerate.\n");

    harness.run("flash sale");
    let output = harness.run("/regenerate");
    assert!(output.contains(COMPLETE_TEXT), "{output}");

    let saved = HistoryStore::open(&harness.path).expect("history");
    let conversation = saved.state().active_conversation().expect("conversation");
    assert_eq!(conversation.messages.len(), 2);
}

#[test]
fn idle_commands_and_unknown_input() {
    let mut harness = Harness::new(ScriptSource::Blocks);

    assert_eq!(harness.run("/cancel"), "Nothing to cancel.\n");
    assert_eq!(
        harness.run("/bogus"),
        "Unknown command: /bogus. Type /help for commands.\n"
    );
    assert_eq!(harness.run("   "), "");
    assert!(!harness.app.should_exit());
    harness.run("/quit");
    assert!(harness.app.should_exit());
}
