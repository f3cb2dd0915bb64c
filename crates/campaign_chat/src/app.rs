use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use campaign_stream::{Applied, Block, SessionController};
use history_store::{HistoryState, Role, TranscriptEntry};
use stream_protocol::{Feedback, ModeFlags};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::runtime::ChatRuntime;

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Line-oriented front end over a [`ChatRuntime`].
pub struct ChatApp {
    runtime: Arc<ChatRuntime>,
    modes: ModeFlags,
    stream_timeout: Duration,
    should_exit: bool,
}

impl ChatApp {
    pub fn new(runtime: Arc<ChatRuntime>) -> Self {
        Self {
            runtime,
            modes: ModeFlags::default(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            should_exit: false,
        }
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn modes(&self) -> ModeFlags {
        self.modes
    }

    pub fn runtime(&self) -> &Arc<ChatRuntime> {
        &self.runtime
    }

    /// Handles one input line: a slash command or a query to stream.
    pub fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> io::Result<()> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let Some(command) = parse_slash_command(trimmed) else {
            let submitted = self.runtime.submit(trimmed, self.modes);
            return match submitted {
                Ok(_) => self.stream_to_end(out),
                Err(error) => writeln!(out, "error: {error}"),
            };
        };

        match command {
            SlashCommand::Help => writeln!(out, "{HELP_TEXT}"),
            SlashCommand::New => {
                self.runtime.with_controller(SessionController::new_conversation);
                writeln!(out, "Started a new conversation.")
            }
            SlashCommand::Deepthink => {
                self.modes.deepthink = !self.modes.deepthink;
                writeln!(out, "Deep thinking {}.", on_off(self.modes.deepthink))
            }
            SlashCommand::Web => {
                self.modes.web_search = !self.modes.web_search;
                writeln!(out, "Web search {}.", on_off(self.modes.web_search))
            }
            SlashCommand::Up => self.feedback(Feedback::Up, out),
            SlashCommand::Down => self.feedback(Feedback::Down, out),
            SlashCommand::List => {
                let history = self.runtime.with_controller(|controller| controller.history().clone());
                write_conversation_list(&history, out)
            }
            SlashCommand::Switch(None) => writeln!(out, "usage: /switch <conversation id>"),
            SlashCommand::Switch(Some(id)) => {
                let switched = self
                    .runtime
                    .with_controller(|controller| controller.set_active_conversation(&id));
                match switched {
                    Ok(()) => {
                        let history =
                            self.runtime.with_controller(|controller| controller.history().clone());
                        write_active_transcript(&history, out)
                    }
                    Err(error) => writeln!(out, "error: {error}"),
                }
            }
            SlashCommand::Rename(None) => writeln!(out, "usage: /rename <title>"),
            SlashCommand::Rename(Some(title)) => {
                let renamed = self
                    .runtime
                    .with_controller(|controller| controller.rename_active_conversation(&title));
                match renamed {
                    Ok(_) => {
                        if let Err(error) = self.runtime.save_history() {
                            writeln!(out, "warning: history not saved: {error}")?;
                        }
                        writeln!(out, "Renamed conversation to \"{title}\".")
                    }
                    Err(error) => writeln!(out, "error: {error}"),
                }
            }
            SlashCommand::Regenerate => {
                let Some(message_id) = self.last_assistant_message() else {
                    return writeln!(out, "Nothing to regenerate.");
                };
                match self.runtime.regenerate(&message_id, self.modes) {
                    Ok(_) => self.stream_to_end(out),
                    Err(error) => writeln!(out, "error: {error}"),
                }
            }
            SlashCommand::Cancel => {
                if self.runtime.cancel_all().is_empty() {
                    writeln!(out, "Nothing to cancel.")
                } else {
                    writeln!(out, "Cancelled.")
                }
            }
            SlashCommand::Quit => {
                self.should_exit = true;
                Ok(())
            }
            SlashCommand::Unknown(command) => {
                writeln!(out, "Unknown command: {command}. Type /help for commands.")
            }
        }
    }

    fn stream_to_end(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let mut last_content: Option<String> = None;
        let mut finished = Vec::new();
        let mut write_error = None;

        let idle = self.runtime.wait_until_idle(self.stream_timeout, |controller, signal| {
            if !signal.applied.needs_publish() {
                return;
            }
            let Some(session) = controller.session_for_request(signal.request_id) else {
                return;
            };
            if last_content.as_deref() != Some(session.content()) && !session.content().is_empty() {
                if let Err(error) = writeln!(out, "  {}", session.content()) {
                    write_error.get_or_insert(error);
                }
                last_content = Some(session.content().to_string());
            }
            if signal.applied == Applied::Terminal {
                finished.push(session.message_id().to_string());
            }
        });
        if let Some(error) = write_error {
            return Err(error);
        }

        if !idle {
            self.runtime.cancel_all();
            writeln!(out, "Stream timed out; cancelled.")?;
        }

        for message_id in finished {
            let rendered = self.runtime.with_controller(|controller| {
                controller
                    .session(&message_id)
                    .map(|session| render_final(session.blocks(), &session.artifact().to_value()))
            });
            if let Some(rendered) = rendered {
                out.write_all(rendered.as_bytes())?;
            }
        }
        Ok(())
    }

    fn feedback(&mut self, feedback: Feedback, out: &mut dyn Write) -> io::Result<()> {
        let Some(message_id) = self.last_assistant_message() else {
            return writeln!(out, "No reply to rate yet.");
        };
        let result = self
            .runtime
            .with_controller(|controller| controller.set_feedback(&message_id, feedback));
        if let Err(error) = self.runtime.save_history() {
            writeln!(out, "warning: history not saved: {error}")?;
        }
        match result {
            Ok(Some(feedback)) => writeln!(out, "Feedback: {}.", feedback.as_str()),
            Ok(None) => writeln!(out, "Feedback cleared."),
            Err(error) => writeln!(out, "error: {error}"),
        }
    }

    fn last_assistant_message(&self) -> Option<String> {
        self.runtime.with_controller(|controller| {
            controller
                .history()
                .active_conversation()?
                .messages
                .iter()
                .rev()
                .find(|message| message.role == Role::Assistant)
                .map(|message| message.id.clone())
        })
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Text rendering of a finished message's blocks followed by its artifact.
pub fn render_final(blocks: &[Block], artifact: &serde_json::Value) -> String {
    let mut lines = Vec::new();
    for block in blocks {
        match block {
            Block::Paragraph { content } | Block::Conclusion { content } => {
                lines.push(content.clone())
            }
            Block::ArtifactIndicator { title, description } => {
                let title = title.as_deref().unwrap_or("Artifact");
                match description {
                    Some(description) => lines.push(format!("[{title}] {description}")),
                    None => lines.push(format!("[{title}]")),
                }
            }
            Block::Summary { content } => lines.push(format!("Summary: {content}")),
            Block::Suggestions { suggestions } => {
                lines.push("Suggestions:".to_string());
                lines.extend(suggestions.iter().map(|suggestion| format!("  - {suggestion}")));
            }
        }
    }

    let artifact = match artifact {
        serde_json::Value::Object(map) => {
            let mut map = map.clone();
            map.remove("uiComponent");
            serde_json::Value::Object(map)
        }
        other => other.clone(),
    };
    if artifact.as_object().is_some_and(|map| !map.is_empty()) {
        lines.push(serde_json::to_string_pretty(&artifact).unwrap_or_default());
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

fn write_conversation_list(history: &HistoryState, out: &mut dyn Write) -> io::Result<()> {
    if history.conversations.is_empty() {
        return writeln!(out, "No conversations yet.");
    }
    for conversation in &history.conversations {
        let marker = if history.active_conversation_id.as_deref() == Some(conversation.id.as_str()) {
            '*'
        } else {
            ' '
        };
        writeln!(
            out,
            "{marker} {}  {} ({} messages)",
            conversation.id,
            conversation.title,
            conversation.messages.len()
        )?;
    }
    Ok(())
}

fn write_active_transcript(history: &HistoryState, out: &mut dyn Write) -> io::Result<()> {
    let Some(conversation) = history.active_conversation() else {
        return Ok(());
    };
    writeln!(out, "== {} ==", conversation.title)?;
    for message in &conversation.messages {
        write_entry(message, out)?;
    }
    Ok(())
}

fn write_entry(entry: &TranscriptEntry, out: &mut dyn Write) -> io::Result<()> {
    let role = match entry.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    writeln!(out, "{role}: {}", entry.content)?;

    let blocks = entry
        .json_data
        .as_ref()
        .and_then(|data| data.get("blocks"))
        .and_then(|blocks| serde_json::from_value::<Vec<Block>>(blocks.clone()).ok())
        .unwrap_or_default();
    if !blocks.is_empty() {
        out.write_all(render_final(&blocks, &serde_json::Value::Null).as_bytes())?;
    }
    Ok(())
}
