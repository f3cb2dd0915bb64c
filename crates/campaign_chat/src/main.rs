use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use campaign_chat::app::ChatApp;
use campaign_chat::engines::engine_from_env;
use campaign_chat::runtime::ChatRuntime;
use campaign_stream::{init_logging, EnvConfig};
use history_store::{history_path, HistoryStore};
use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;
use tracing::info;

fn main() -> io::Result<()> {
    let config = EnvConfig::from_env();
    init_logging(&config.log_filter);

    let engine = engine_from_env(config.liveness_window).map_err(io::Error::other)?;
    let profile = engine.profile();

    let path = match &config.history_path {
        Some(path) => path.clone(),
        None => history_path(&std::env::current_dir()?),
    };
    let store = HistoryStore::open(&path).map_err(io::Error::other)?;
    let runtime = ChatRuntime::with_store(store, engine, config.malformed_limit);
    install_interrupt_handler(Arc::clone(&runtime))?;
    info!(engine = %profile.engine_id, history = %path.display(), "campaign chat ready");

    let mut app = ChatApp::new(Arc::clone(&runtime));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(stdout, "campaign chat ({}). Type /help for commands.", profile.engine_id)?;

    let mut lines = stdin.lock().lines();
    while !app.should_exit() {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        app.handle_line(&line?, &mut stdout)?;
    }

    runtime.shutdown();
    Ok(())
}

/// Ctrl-C cancels live streams; with nothing streaming it exits.
fn install_interrupt_handler(runtime: Arc<ChatRuntime>) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT])?;
    thread::Builder::new()
        .name("campaign-chat-sigint".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                if runtime.cancel_all().is_empty() {
                    runtime.shutdown();
                    std::process::exit(130);
                }
            }
        })?;
    Ok(())
}
