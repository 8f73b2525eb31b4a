//! Error types for the session engine.

/// Failure to decode one audio payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has an odd byte count ({0})")]
    OddLength(usize),
}

/// Failure to acquire or drive an audio device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("microphone unavailable: {0}")]
    Microphone(String),
    #[error("audio output unavailable: {0}")]
    Output(String),
}

/// Setup failures. Each one leaves the session in the `Error` state with
/// every partially acquired resource released.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please enter an API key")]
    MissingCredential,
    #[error("a session is already running")]
    AlreadyStarted,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("failed to open the live channel: {0:#}")]
    Connect(anyhow::Error),
}
