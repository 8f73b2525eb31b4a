//! Gemini Live API client plumbing.
//!
//! - `types`: the JSON message shapes exchanged with `BidiGenerateContent`.
//! - `connection`: the WebSocket transport, split into a synchronous sender and
//!   an inbound event stream.

pub mod connection;
pub mod types;

pub use connection::{
    ChannelEvent, DEFAULT_LIVE_API_URL, LiveChannel, LiveSender, Outbound, RemoteEnd, SendError,
    live_url,
};
pub use types::{ClientMessage, FunctionCall, ServerMessage};
