//! The UI collaborator: status line, transcript, and external views.

use std::fmt;

/// Severity tag attached to every status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            StatusKind::Connected => "connected",
            StatusKind::Disconnected => "disconnected",
            StatusKind::Error => "error",
        };
        f.write_str(tag)
    }
}

/// One rendered block in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    /// Text typed by the user.
    User { text: String },
    /// Written content from `display_text`.
    Written {
        title: Option<String>,
        content: String,
    },
    /// A command awaiting the user's confirm/cancel decision.
    ConfirmCommand { call_id: String, command: String },
    /// Output of a confirmed command.
    CommandResult { call_id: String, output: String },
    /// A search opened on the user's behalf.
    Search { query: String },
}

/// Receives everything the session wants shown to the user.
pub trait UiCollaborator: Send + Sync {
    fn set_status(&self, message: &str, kind: StatusKind);

    fn append(&self, entry: TranscriptEntry);

    /// Removes the confirm/cancel prompt for `call_id` once a decision is made.
    fn dismiss_confirmation(&self, call_id: &str);

    /// Opens an external view. Fire-and-forget.
    fn open_url(&self, url: &str);

    fn clear_transcript(&self);
}
