//! Session engine for a realtime voice and tool-call client.
//!
//! The engine streams microphone audio to a Gemini Live session, plays the
//! agent's audio replies back without gaps, and services the agent's tool
//! calls (`display_text`, `execute`, `googleSearch`). Devices, the UI, and the
//! command executor are collaborators behind traits so the whole engine can
//! run against in-memory fakes.

pub mod audio_utils;
pub mod capture;
pub mod device;
pub mod error;
pub mod executor;
pub mod playback;
pub mod prompt;
pub mod session;
pub mod tools;
pub mod ui;

#[cfg(test)]
mod testing;

pub use device::{AudioBuffer, AudioDevices, CaptureBlock, Microphone, PlaybackDevice, PlaybackTicket};
pub use error::{CodecError, DeviceError, SessionError};
pub use executor::{CommandExecutor, DEFAULT_EXECUTOR_URL, ExecutionResult, HttpCommandExecutor};
pub use prompt::SessionConfig;
pub use session::{
    Collaborators, Connector, Session, SessionHandle, SessionState, WebSocketConnector,
};
pub use ui::{StatusKind, TranscriptEntry, UiCollaborator};
