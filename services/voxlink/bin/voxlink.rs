//! Main entrypoint for the voxlink terminal client.
//!
//! Loads configuration, initializes logging, obtains the API key, then runs
//! one live session against the default microphone and speaker until the user
//! quits, presses Ctrl+C, or the remote side closes the channel.

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use std::{io::Write, sync::Arc};
use tracing::{error, info};
use voxlink::{
    audio::CpalDevices,
    config::Config,
    terminal::{self, TerminalUi},
};
use voxlink_core::{
    Collaborators, HttpCommandExecutor, Session, SessionConfig, SessionHandle, UiCollaborator,
    WebSocketConnector,
};

#[derive(Parser, Debug)]
#[command(version, about = "Talk to a Gemini Live agent from the terminal")]
struct Args {
    /// Model to open the session with (overrides GEMINI_MODEL).
    #[arg(long)]
    model: Option<String>,
    /// Endpoint of the local command execution service (overrides EXECUTOR_URL).
    #[arg(long)]
    executor_url: Option<String>,
}

/// Stops the session on `Ctrl+C`.
async fn shutdown_signal(handle: SessionHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Stopping session...");
    handle.stop();
}

/// Reads the API key from the terminal when it is not configured.
fn prompt_for_api_key() -> anyhow::Result<SecretString> {
    print!("Gemini API key: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read the API key")?;
    Ok(SecretString::from(line.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    // stdout belongs to the terminal UI.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let model = args.model.unwrap_or(config.model);
    let executor_url = args.executor_url.unwrap_or(config.executor_url);
    info!(%model, %executor_url, "Configuration loaded.");

    // --- 3. Obtain the credential ---
    let api_key = match config.gemini_api_key {
        Some(key) => key,
        None => prompt_for_api_key()?,
    };

    // --- 4. Build the session ---
    let ui: Arc<TerminalUi<std::io::Stdout>> = Arc::new(TerminalUi::stdout());
    let session_config = SessionConfig {
        model,
        live_api_url: config.live_api_url,
        ..Default::default()
    };
    let mut session = Session::new(
        Arc::new(session_config),
        Collaborators {
            connector: Arc::new(WebSocketConnector),
            devices: Arc::new(CpalDevices::new()),
            ui: ui.clone(),
            executor: Arc::new(HttpCommandExecutor::new(executor_url)),
        },
    );
    let handle = session.handle();

    // --- 5. Connect and run ---
    session
        .start(&api_key)
        .await
        .context("Failed to start the live session")?;
    println!("{}", terminal::USAGE);

    let input_ui: Arc<dyn UiCollaborator> = ui;
    let lines = terminal::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    tokio::spawn(terminal::forward_input(lines, handle.clone(), input_ui));
    tokio::spawn(shutdown_signal(handle));

    session.run().await;
    info!(state = ?session.state(), "Session ended.");
    Ok(())
}
