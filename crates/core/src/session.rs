//! The session controller: connect -> setup -> active -> closing.
//!
//! A [`Session`] owns every resource of one conversation attempt: the live
//! channel, the microphone, the playback context, and the pending tool calls.
//! All of them are mutated from a single loop ([`Session::run`]) that selects
//! over inbound channel events, captured blocks, playback completions,
//! finished tool executions, and UI commands posted through a
//! [`SessionHandle`].

use crate::{
    capture::CapturePipeline,
    device::{AudioDevices, CaptureBlock, Microphone, PlaybackTicket},
    error::SessionError,
    executor::CommandExecutor,
    playback::PlaybackPipeline,
    prompt::SessionConfig,
    tools::{ToolCall, ToolCallDispatcher, ToolResponse},
    ui::{StatusKind, TranscriptEntry, UiCollaborator},
};
use async_trait::async_trait;
use gemini_realtime::{
    ChannelEvent, ClientMessage, LiveChannel, LiveSender, SendError, ServerMessage, live_url,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    /// Whether the session holds resources and its loop should keep running.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }
}

/// Opens the duplex channel to the remote agent.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> anyhow::Result<LiveChannel>;
}

/// `Connector` over a real WebSocket.
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<LiveChannel> {
        LiveChannel::connect(url).await
    }
}

/// The external collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub devices: Arc<dyn AudioDevices>,
    pub ui: Arc<dyn UiCollaborator>,
    pub executor: Arc<dyn CommandExecutor>,
}

#[derive(Debug)]
enum SessionCommand {
    Confirm(String),
    Cancel(String),
    SendText(String),
    Stop,
}

/// Cloneable entry points for the UI. Commands posted after the session loop
/// has finished are dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Resolves a pending `execute` call with the user's confirmation.
    pub fn confirm(&self, call_id: impl Into<String>) {
        let _ = self.commands.send(SessionCommand::Confirm(call_id.into()));
    }

    /// Resolves a pending `execute` call with the user's cancellation.
    pub fn cancel(&self, call_id: impl Into<String>) {
        let _ = self.commands.send(SessionCommand::Cancel(call_id.into()));
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(SessionCommand::SendText(text.into()));
    }

    pub fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// Resources held while the session is connecting or active.
struct Live {
    sender: LiveSender,
    microphone: Option<Box<dyn Microphone>>,
    capture: Option<CapturePipeline>,
    playback: PlaybackPipeline,
    dispatcher: ToolCallDispatcher,
    blocks_tx: mpsc::UnboundedSender<CaptureBlock>,
}

/// The receiving ends the session loop selects over.
struct Inbox {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    blocks: mpsc::UnboundedReceiver<CaptureBlock>,
    ended: mpsc::UnboundedReceiver<PlaybackTicket>,
    completions: mpsc::UnboundedReceiver<ToolResponse>,
}

pub struct Session {
    id: u32,
    state: SessionState,
    config: Arc<SessionConfig>,
    collaborators: Collaborators,
    live: Option<Live>,
    inbox: Option<Inbox>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands: Option<mpsc::UnboundedReceiver<SessionCommand>>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(config: Arc<SessionConfig>, collaborators: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            id: rand::random(),
            state: SessionState::Idle,
            config,
            collaborators,
            live: None,
            inbox: None,
            commands_tx,
            commands: Some(commands_rx),
            state_tx,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            state: self.state_tx.subscribe(),
        }
    }

    /// Acquires the playback context, the microphone, and the live channel, in
    /// that order. Any failure releases whatever was already acquired and
    /// leaves the session in `Error`.
    ///
    /// On success the session is `Connecting`; drive it with [`Session::run`].
    pub async fn start(&mut self, credential: &SecretString) -> Result<(), SessionError> {
        let span = info_span!("live_session", session_id = self.id);
        self.start_inner(credential).instrument(span).await
    }

    async fn start_inner(&mut self, credential: &SecretString) -> Result<(), SessionError> {
        if self.state.is_live() || self.state == SessionState::Closing {
            return Err(SessionError::AlreadyStarted);
        }
        let api_key = credential.expose_secret().trim();
        if api_key.is_empty() {
            return Err(self.fail_setup(SessionError::MissingCredential));
        }

        self.set_state(SessionState::Connecting);
        self.collaborators
            .ui
            .set_status("Connecting...", StatusKind::Disconnected);

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let mut output = match self.collaborators.devices.open_output(ended_tx) {
            Ok(output) => output,
            Err(e) => return Err(self.fail_setup(e.into())),
        };
        let mut microphone = match self.collaborators.devices.open_microphone() {
            Ok(microphone) => microphone,
            Err(e) => {
                output.close();
                return Err(self.fail_setup(e.into()));
            }
        };
        let url = live_url(&self.config.live_api_url, api_key);
        let channel = match self.collaborators.connector.connect(&url).await {
            Ok(channel) => channel,
            Err(e) => {
                microphone.stop();
                output.close();
                return Err(self.fail_setup(SessionError::Connect(e)));
            }
        };

        let (blocks_tx, blocks_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let dispatcher = ToolCallDispatcher::new(
            self.collaborators.ui.clone(),
            self.collaborators.executor.clone(),
            completions_tx,
        );
        self.live = Some(Live {
            sender: channel.sender,
            microphone: Some(microphone),
            capture: None,
            playback: PlaybackPipeline::new(output),
            dispatcher,
            blocks_tx,
        });
        self.inbox = Some(Inbox {
            events: channel.events,
            blocks: blocks_rx,
            ended: ended_rx,
            completions: completions_rx,
        });
        info!(model = %self.config.model, "Live channel connecting.");
        Ok(())
    }

    /// Runs the session loop until the session is closed or fails.
    pub async fn run(&mut self) {
        let span = info_span!("live_session", session_id = self.id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) {
        let Some(mut inbox) = self.inbox.take() else {
            warn!("Session run without a successful start.");
            return;
        };
        let Some(mut commands) = self.commands.take() else {
            warn!("Session loop is already running.");
            return;
        };

        while self.state.is_live() {
            tokio::select! {
                event = inbox.events.recv() => self.on_channel_event(event),
                Some(block) = inbox.blocks.recv() => self.on_capture_block(&block),
                Some(ticket) = inbox.ended.recv() => self.on_playback_ended(ticket),
                Some(response) = inbox.completions.recv() => self.send_tool_response(response),
                Some(command) = commands.recv() => self.on_command(command),
            }
        }

        // Drop anything posted for the attempt that just ended.
        while commands.try_recv().is_ok() {}
        self.commands = Some(commands);
        info!(state = ?self.state, "Session loop finished.");
    }

    /// Tears the session down. A no-op unless connecting or active.
    pub fn stop(&mut self) {
        if !self.state.is_live() {
            debug!(state = ?self.state, "Stop ignored; session not running.");
            return;
        }
        info!("Stopping session.");
        self.teardown(SessionState::Closed);
    }

    fn on_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Opened) => self.on_open(),
            Some(ChannelEvent::Frame(text)) => self.on_frame(&text),
            Some(ChannelEvent::Closed { reason }) => {
                info!(?reason, "Live channel closed.");
                self.teardown(SessionState::Closed);
            }
            None => {
                info!("Live channel event stream ended.");
                self.teardown(SessionState::Closed);
            }
            Some(ChannelEvent::Failed(e)) => {
                error!(error = %e, "Live channel failed.");
                self.collaborators
                    .ui
                    .set_status("Connection error", StatusKind::Error);
                self.teardown(SessionState::Error);
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "Unexpected open event; ignoring.");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        self.state = SessionState::Active;
        self.state_tx.send_replace(SessionState::Active);
        info!("Connected to Gemini Live API.");
        self.collaborators
            .ui
            .set_status("Connected - Speak or type!", StatusKind::Connected);

        if let Err(e) = live.sender.send(&self.config.setup_message()) {
            error!("Failed to send setup message: {}", e);
        }

        if let Some(microphone) = live.microphone.take() {
            match CapturePipeline::start(microphone, live.sender.clone(), live.blocks_tx.clone()) {
                Ok(capture) => live.capture = Some(capture),
                Err(e) => error!("Failed to start capture pipeline: {}", e),
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed inbound message: {}", e);
                return;
            }
        };
        if self.state != SessionState::Active {
            debug!(state = ?self.state, "Ignoring inbound message outside the active state.");
            return;
        }
        if message.setup_complete.is_some() {
            info!("Gemini session setup is complete.");
        }

        if let Some(calls) = message.function_calls() {
            let mut responses = Vec::new();
            if let Some(live) = self.live.as_mut() {
                for call in calls {
                    match ToolCall::from_function_call(call.clone()) {
                        Some(call) => responses.extend(live.dispatcher.dispatch(call)),
                        None => warn!(call_id = %call.id, name = %call.name, "Ignoring unknown tool call"),
                    }
                }
            }
            for response in responses {
                self.send_tool_response(response);
            }
            return;
        }

        let Some(live) = self.live.as_mut() else {
            return;
        };
        for payload in message.audio_payloads() {
            live.playback.enqueue(payload.to_string());
        }
        if message.is_interrupted() {
            info!("Response interrupted.");
            live.playback.interrupt();
        }
    }

    fn on_capture_block(&mut self, block: &[f32]) {
        if let Some(capture) = self.live.as_mut().and_then(|live| live.capture.as_mut()) {
            capture.on_block(block);
        }
    }

    fn on_playback_ended(&mut self, ticket: PlaybackTicket) {
        if let Some(live) = self.live.as_mut() {
            live.playback.on_ended(ticket);
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Stop => self.stop(),
            SessionCommand::SendText(text) => self.send_text(&text),
            SessionCommand::Confirm(call_id) => {
                if let Some(live) = self.live.as_mut() {
                    live.dispatcher.confirm(&call_id);
                }
            }
            SessionCommand::Cancel(call_id) => {
                let response = self
                    .live
                    .as_mut()
                    .and_then(|live| live.dispatcher.cancel(&call_id));
                if let Some(response) = response {
                    self.send_tool_response(response);
                }
            }
        }
    }

    fn send_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.state != SessionState::Active {
            return;
        }
        let Some(live) = self.live.as_ref() else {
            return;
        };
        self.collaborators.ui.append(TranscriptEntry::User {
            text: text.to_string(),
        });
        if let Err(e) = live.sender.send(&ClientMessage::user_text(text.to_string())) {
            error!("Error sending text: {}", e);
        }
    }

    fn send_tool_response(&mut self, response: ToolResponse) {
        let Some(live) = self.live.as_ref() else {
            debug!(call_id = %response.id, "Dropping tool response for a closed session.");
            return;
        };
        let payload = match serde_json::to_value(&response.payload) {
            Ok(payload) => payload,
            Err(e) => {
                error!(call_id = %response.id, "Failed to encode tool response: {}", e);
                return;
            }
        };
        match live
            .sender
            .send(&ClientMessage::tool_response(response.id.clone(), payload))
        {
            Ok(()) => debug!(call_id = %response.id, "Tool response sent."),
            Err(SendError::NotOpen) => {
                info!(call_id = %response.id, "Channel closed; dropping tool response.")
            }
            Err(e) => error!(call_id = %response.id, "Failed to send tool response: {}", e),
        }
    }

    /// Releases every resource of the current attempt and settles in `final_state`.
    fn teardown(&mut self, final_state: SessionState) {
        self.set_state(SessionState::Closing);
        if let Some(mut live) = self.live.take() {
            if let Some(capture) = live.capture.as_mut() {
                capture.stop();
            }
            if let Some(mut microphone) = live.microphone.take() {
                microphone.stop();
            }
            live.playback.close();
            live.dispatcher.abandon_all();
            live.sender.close();
        }
        self.inbox = None;

        self.collaborators.ui.clear_transcript();
        if final_state == SessionState::Closed {
            self.collaborators
                .ui
                .set_status("Not connected", StatusKind::Disconnected);
        }
        self.set_state(final_state);
        info!(state = ?final_state, "Session torn down.");
    }

    fn fail_setup(&mut self, err: SessionError) -> SessionError {
        error!(error = %err, "Session setup failed.");
        let message = match err {
            SessionError::MissingCredential => err.to_string(),
            _ => format!("Error: {}", err),
        };
        self.collaborators.ui.set_status(&message, StatusKind::Error);
        self.set_state(SessionState::Error);
        err
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state transition.");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}
