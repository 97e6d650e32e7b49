use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod error;
mod handler;
mod lifecycle;
mod openai;
mod tui;
mod ui;

use app::App;
use config::{Config, API_KEY_VAR};
use lifecycle::RequestLifecycle;
use openai::OpenAIClient;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_logging(&config)?;

    if !config.has_credential() {
        warn!("{API_KEY_VAR} is not set; every request will fail with an authentication error");
    }

    let client = OpenAIClient::from_config(&config);
    let lifecycle = RequestLifecycle::new(Arc::new(client), config.system_prompt.clone());

    let mut events = EventHandler::new();
    let mut app = App::new(lifecycle, &config, events.sender());

    info!(model = config.model.as_str(), base_url = config.base_url.as_str(), "Starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;

    info!("Exiting");
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }

    Ok(())
}

/// The terminal belongs to the UI, so logs only go to a file, and only when one is configured.
fn init_logging(config: &Config) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}
