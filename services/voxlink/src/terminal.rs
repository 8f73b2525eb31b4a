//! Line-oriented terminal UI.
//!
//! Transcript entries and status changes are printed as they happen. Typed
//! lines are either text turns or slash commands that resolve pending
//! `execute` confirmations.

use parking_lot::Mutex;
use std::{
    io::{BufRead, Write},
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxlink_core::{SessionHandle, StatusKind, TranscriptEntry, UiCollaborator};

pub const USAGE: &str = "Type to talk, /confirm <id> or /cancel <id> to answer a command prompt, /quit to leave.";

/// Prints everything the session wants shown to `out`.
pub struct TerminalUi<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalUi<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalUi<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn print(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            warn!("Failed to write to the terminal: {}", e);
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

/// Renders one transcript entry as terminal text.
pub fn render_entry(entry: &TranscriptEntry) -> String {
    match entry {
        TranscriptEntry::User { text } => format!("You: {}", text),
        TranscriptEntry::Written { title, content } => match title {
            Some(title) => format!("== {} ==\n{}", title, content),
            None => content.clone(),
        },
        TranscriptEntry::ConfirmCommand { call_id, command } => format!(
            "Command requested [{}]:\n  $ {}\n  /confirm {} to run it, /cancel {} to refuse.",
            call_id, command, call_id, call_id
        ),
        TranscriptEntry::CommandResult { call_id, output } => {
            format!("Output [{}]:\n{}", call_id, output.trim_end())
        }
        TranscriptEntry::Search { query } => format!("Searching for: {}", query),
    }
}

impl<W: Write + Send> UiCollaborator for TerminalUi<W> {
    fn set_status(&self, message: &str, kind: StatusKind) {
        self.print(&format!("[{}] {}", kind, message));
    }

    fn append(&self, entry: TranscriptEntry) {
        self.print(&render_entry(&entry));
    }

    fn dismiss_confirmation(&self, call_id: &str) {
        self.print(&format!("(prompt {} answered)", call_id));
    }

    fn open_url(&self, url: &str) {
        self.print(&format!("Opening {}", url));
        if let Err(e) = open_in_browser(url) {
            warn!(%url, "Could not open a browser: {}", e);
        }
    }

    fn clear_transcript(&self) {
        self.print("---");
    }
}

/// Launches the platform's URL opener. The child is reaped on a detached
/// thread so the caller never waits for it.
fn open_in_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = std::process::Command::new("open");
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = std::process::Command::new("xdg-open");

    let child = command
        .arg(url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    reap_in_background(child);
    Ok(())
}

fn reap_in_background(mut child: std::process::Child) {
    let spawned = std::thread::Builder::new()
        .name("voxlink-opener".to_string())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => debug!(%status, "URL opener exited."),
            Ok(_) => {}
            Err(e) => warn!("Failed to wait for the URL opener: {}", e),
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn the URL opener reaper: {}", e);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Text(String),
    Confirm(String),
    Cancel(String),
    Quit,
    /// A slash command that could not be understood.
    Invalid(String),
}

/// Parses one typed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<InputCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(InputCommand::Text(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::to_string);
    let parsed = match (command, argument) {
        ("confirm", Some(id)) => InputCommand::Confirm(id),
        ("cancel", Some(id)) => InputCommand::Cancel(id),
        ("quit" | "exit", None) => InputCommand::Quit,
        _ => InputCommand::Invalid(line.to_string()),
    };
    Some(parsed)
}

/// Reads lines on a dedicated thread and forwards them over a channel.
///
/// A blocking read cannot be cancelled, so it stays off the runtime's blocking
/// pool; otherwise shutdown would wait for the next newline. The channel closes
/// at end of input or on a read error.
pub fn spawn_line_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("voxlink-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read terminal input: {}", e);
                        break;
                    }
                }
            }
            debug!("Terminal input reader finished.");
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn the terminal input reader: {}", e);
    }
    rx
}

/// Routes typed lines to the session until `/quit` or end of input, then
/// stops the session.
pub async fn forward_input(
    mut lines: mpsc::UnboundedReceiver<String>,
    handle: SessionHandle,
    ui: Arc<dyn UiCollaborator>,
) {
    while let Some(line) = lines.recv().await {
        match parse_line(&line) {
            None => {}
            Some(InputCommand::Text(text)) => handle.send_text(text),
            Some(InputCommand::Confirm(id)) => handle.confirm(id),
            Some(InputCommand::Cancel(id)) => handle.cancel(id),
            Some(InputCommand::Quit) => break,
            Some(InputCommand::Invalid(line)) => {
                ui.set_status(&format!("Unknown command '{}'. {}", line, USAGE), StatusKind::Error)
            }
        }
    }
    info!("Terminal input closed; stopping session.");
    handle.stop();
}
