#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    Deepthink,
    Web,
    Up,
    Down,
    List,
    Switch(Option<String>),
    /// Title of the active conversation; the rest of the line.
    Rename(Option<String>),
    Regenerate,
    Cancel,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /help, /new, /deepthink, /web, /up, /down, /list, /switch <id>, /rename <title>, /regenerate, /cancel, /quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_string();
    let argument = parts.next().map(str::to_string);

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/new" => SlashCommand::New,
        "/deepthink" => SlashCommand::Deepthink,
        "/web" => SlashCommand::Web,
        "/up" => SlashCommand::Up,
        "/down" => SlashCommand::Down,
        "/list" => SlashCommand::List,
        "/switch" => SlashCommand::Switch(argument),
        "/rename" => {
            let title = trimmed[command.len()..].trim();
            SlashCommand::Rename((!title.is_empty()).then(|| title.to_string()))
        }
        "/regenerate" => SlashCommand::Regenerate,
        "/cancel" => SlashCommand::Cancel,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
