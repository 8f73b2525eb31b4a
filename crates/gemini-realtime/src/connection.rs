//! The duplex channel to the Live API.
//!
//! A connection is split into two independent halves: a cloneable
//! [`LiveSender`] whose `send` is synchronous and never blocks, and an inbound
//! stream of [`ChannelEvent`]s fed by a single reader task.

use crate::types::ClientMessage;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// Default Live API endpoint. The credential is appended as the `key` query parameter.
pub const DEFAULT_LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Builds the full connection URL for a credential.
pub fn live_url(base: &str, api_key: &str) -> String {
    format!("{}?key={}", base, api_key)
}

/// Events delivered by the reader half of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The handshake completed; the channel accepts sends.
    Opened,
    /// One inbound frame, decoded to text. Binary frames are decoded as UTF-8.
    Frame(String),
    /// The remote closed the channel.
    Closed { reason: Option<String> },
    /// The transport failed. The channel is no longer open.
    Failed(String),
}

/// A frame queued for the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("channel is not open")]
    NotOpen,
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The write half of a live channel.
#[derive(Clone, Debug)]
pub struct LiveSender {
    tx: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl LiveSender {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Serializes and queues `msg`. Fails without queuing when the channel is not open.
    pub fn send(&self, msg: &ClientMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        let payload = serde_json::to_string(msg)?;
        self.tx
            .send(Outbound::Text(payload))
            .map_err(|_| SendError::NotOpen)
    }

    /// Requests a close frame and marks the channel closed. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// Both halves of an established (or establishing) channel.
pub struct LiveChannel {
    pub sender: LiveSender,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// The far end of an in-memory channel, standing in for the remote agent.
pub struct RemoteEnd {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<ChannelEvent>,
    open: Arc<AtomicBool>,
}

impl RemoteEnd {
    /// Delivers the open event.
    pub fn open(&self) {
        let _ = self.inbound.send(ChannelEvent::Opened);
    }

    /// Delivers one text frame.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inbound.send(ChannelEvent::Frame(frame.into()));
    }

    /// Simulates the remote closing the channel.
    pub fn close(&self, reason: Option<&str>) {
        self.open.store(false, Ordering::Release);
        let _ = self.inbound.send(ChannelEvent::Closed {
            reason: reason.map(str::to_string),
        });
    }

    /// Drains every text frame the client has sent so far, parsed as JSON.
    pub fn sent(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(out) = self.outbound.try_recv() {
            if let Outbound::Text(text) = out {
                if let Ok(value) = serde_json::from_str(&text) {
                    frames.push(value);
                }
            }
        }
        frames
    }
}

impl LiveChannel {
    /// Creates a connected in-memory pair. The channel counts as open immediately;
    /// the `Opened` event is delivered by [`RemoteEnd::open`].
    pub fn in_memory() -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let channel = Self {
            sender: LiveSender {
                tx: out_tx,
                open: open.clone(),
            },
            events: ev_rx,
        };
        let remote = RemoteEnd {
            outbound: out_rx,
            inbound: ev_tx,
            open,
        };
        (channel, remote)
    }

    /// Opens a WebSocket to `url` and spawns the reader and writer tasks.
    ///
    /// The returned event stream starts with [`ChannelEvent::Opened`].
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Gemini Live WebSocket")?;
        info!("Connected to Gemini Live WebSocket.");
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let _ = ev_tx.send(ChannelEvent::Opened);

        // Writer: drains the outbound queue in order.
        let writer_open = open.clone();
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                let result = match out {
                    Outbound::Text(text) => ws_tx.send(WsMessage::Text(text.into())).await,
                    Outbound::Close => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    error!("Error writing to Gemini Live WebSocket: {}", e);
                    writer_open.store(false, Ordering::Release);
                    break;
                }
            }
            debug!("Live writer task finished.");
        });

        // Reader: the single producer of inbound events.
        let reader_open = open.clone();
        tokio::spawn(async move {
            let terminal = loop {
                match ws_rx.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = ev_tx.send(ChannelEvent::Frame(text.to_string()));
                    }
                    Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            let _ = ev_tx.send(ChannelEvent::Frame(text));
                        }
                        Err(e) => warn!("Dropping non-UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(WsMessage::Close(close_frame))) => {
                        info!(?close_frame, "Gemini Live WebSocket closed by server.");
                        break ChannelEvent::Closed {
                            reason: close_frame.map(|f| f.reason.to_string()),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Error reading from Gemini Live WebSocket: {}", e);
                        break ChannelEvent::Failed(e.to_string());
                    }
                    None => break ChannelEvent::Closed { reason: None },
                }
            };
            reader_open.store(false, Ordering::Release);
            let _ = ev_tx.send(terminal);
        });

        Ok(Self {
            sender: LiveSender { tx: out_tx, open },
            events: ev_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_live_url_appends_key() {
        assert_eq!(
            live_url("wss://example.test/ws", "abc"),
            "wss://example.test/ws?key=abc"
        );
    }

    #[test]
    fn test_send_while_open_reaches_remote() {
        let (channel, mut remote) = LiveChannel::in_memory();
        channel
            .sender
            .send(&ClientMessage::user_text("hello".into()))
            .unwrap();
        let sent = remote.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["clientContent"]["turns"][0]["parts"][0]["text"], json!("hello"));
    }

    #[test]
    fn test_send_after_close_is_rejected() {
        let (channel, mut remote) = LiveChannel::in_memory();
        channel.sender.close();
        channel.sender.close();
        assert!(!channel.sender.is_open());
        let err = channel
            .sender
            .send(&ClientMessage::user_text("late".into()))
            .unwrap_err();
        assert!(matches!(err, SendError::NotOpen));
        assert!(remote.sent().is_empty());
        assert_eq!(remote.outbound.try_recv().ok(), None);
    }

    #[test]
    fn test_remote_close_marks_sender_closed() {
        let (mut channel, remote) = LiveChannel::in_memory();
        remote.close(Some("bye"));
        assert!(!channel.sender.is_open());
        assert_eq!(
            channel.events.try_recv().unwrap(),
            ChannelEvent::Closed {
                reason: Some("bye".to_string())
            }
        );
    }

    #[test]
    fn test_send_after_remote_dropped_is_rejected() {
        let (channel, remote) = LiveChannel::in_memory();
        drop(remote);
        assert!(!channel.sender.is_open());
    }
}
