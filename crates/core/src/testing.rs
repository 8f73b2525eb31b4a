//! In-memory collaborators for engine tests.

use crate::{
    device::{AudioBuffer, AudioDevices, CaptureBlock, Microphone, PlaybackDevice, PlaybackTicket},
    error::DeviceError,
    session::Connector,
    ui::{StatusKind, TranscriptEntry, UiCollaborator},
};
use async_trait::async_trait;
use gemini_realtime::{LiveChannel, RemoteEnd};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Status(String, StatusKind),
    Append(TranscriptEntry),
    Dismiss(String),
    OpenUrl(String),
    Clear,
}

#[derive(Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Append(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<(String, StatusKind)> {
        self.events().into_iter().rev().find_map(|e| match e {
            UiEvent::Status(text, kind) => Some((text, kind)),
            _ => None,
        })
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl UiCollaborator for RecordingUi {
    fn set_status(&self, message: &str, kind: StatusKind) {
        self.push(UiEvent::Status(message.to_string(), kind));
    }

    fn append(&self, entry: TranscriptEntry) {
        self.push(UiEvent::Append(entry));
    }

    fn dismiss_confirmation(&self, call_id: &str) {
        self.push(UiEvent::Dismiss(call_id.to_string()));
    }

    fn open_url(&self, url: &str) {
        self.push(UiEvent::OpenUrl(url.to_string()));
    }

    fn clear_transcript(&self) {
        self.push(UiEvent::Clear);
    }
}

/// One `schedule` call seen by the fake playback device.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub ticket: PlaybackTicket,
    pub start_at: f64,
    pub duration: f64,
}

#[derive(Default)]
struct PlaybackLog {
    now: f64,
    scheduled: Vec<Scheduled>,
    closed: bool,
    ended: Option<mpsc::UnboundedSender<PlaybackTicket>>,
}

/// Test-side view of the fake playback device: a manual clock plus a log.
#[derive(Clone, Default)]
pub struct PlaybackProbe(Arc<Mutex<PlaybackLog>>);

impl PlaybackProbe {
    pub fn set_time(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.0.lock().unwrap().scheduled.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }

    /// Reports natural completion of `ticket` through the device's ended channel.
    pub fn finish(&self, ticket: PlaybackTicket) {
        if let Some(tx) = &self.0.lock().unwrap().ended {
            let _ = tx.send(ticket);
        }
    }

    pub fn device(&self) -> FakePlayback {
        FakePlayback(self.clone())
    }
}

pub struct FakePlayback(PlaybackProbe);

impl PlaybackDevice for FakePlayback {
    fn current_time(&self) -> f64 {
        (self.0).0.lock().unwrap().now
    }

    fn schedule(
        &mut self,
        buffer: AudioBuffer,
        start_at: f64,
        ticket: PlaybackTicket,
    ) -> Result<(), DeviceError> {
        let mut log = (self.0).0.lock().unwrap();
        if log.closed {
            return Err(DeviceError::Output("context closed".to_string()));
        }
        log.scheduled.push(Scheduled {
            ticket,
            start_at,
            duration: buffer.duration(),
        });
        Ok(())
    }

    fn close(&mut self) {
        (self.0).0.lock().unwrap().closed = true;
    }
}

#[derive(Default)]
struct MicState {
    blocks: Option<mpsc::UnboundedSender<CaptureBlock>>,
    opened: bool,
    stopped: bool,
}

/// Test-side view of the fake microphone.
#[derive(Clone, Default)]
pub struct MicProbe(Arc<Mutex<MicState>>);

impl MicProbe {
    pub fn was_opened(&self) -> bool {
        self.0.lock().unwrap().opened
    }

    pub fn is_connected(&self) -> bool {
        self.0.lock().unwrap().blocks.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.0.lock().unwrap().stopped
    }

    /// Simulates the audio thread posting one block.
    pub fn feed(&self, block: CaptureBlock) {
        if let Some(tx) = &self.0.lock().unwrap().blocks {
            let _ = tx.send(block);
        }
    }
}

pub struct FakeMicrophone(MicProbe);

impl Microphone for FakeMicrophone {
    fn connect(&mut self, blocks: mpsc::UnboundedSender<CaptureBlock>) -> Result<(), DeviceError> {
        (self.0).0.lock().unwrap().blocks = Some(blocks);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = (self.0).0.lock().unwrap();
        state.blocks = None;
        state.stopped = true;
    }
}

/// Hands out fakes and remembers them for inspection.
#[derive(Default)]
pub struct FakeDevices {
    pub playback: PlaybackProbe,
    pub mic: MicProbe,
    pub deny_microphone: bool,
    pub deny_output: bool,
}

impl AudioDevices for FakeDevices {
    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackTicket>,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        if self.deny_output {
            return Err(DeviceError::Output("no output device".to_string()));
        }
        self.playback.0.lock().unwrap().ended = Some(ended);
        Ok(Box::new(self.playback.device()))
    }

    fn open_microphone(&self) -> Result<Box<dyn Microphone>, DeviceError> {
        if self.deny_microphone {
            return Err(DeviceError::Microphone("Permission denied".to_string()));
        }
        self.mic.0.lock().unwrap().opened = true;
        Ok(Box::new(FakeMicrophone(self.mic.clone())))
    }
}

/// Hands out one prepared in-memory channel, or fails when none is left.
pub struct InMemoryConnector {
    channel: Mutex<Option<LiveChannel>>,
    urls: Mutex<Vec<String>>,
}

impl InMemoryConnector {
    pub fn new() -> (Self, RemoteEnd) {
        let (channel, remote) = LiveChannel::in_memory();
        let connector = Self {
            channel: Mutex::new(Some(channel)),
            urls: Mutex::new(Vec::new()),
        };
        (connector, remote)
    }

    pub fn failing() -> Self {
        Self {
            channel: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<LiveChannel> {
        self.urls.lock().unwrap().push(url.to_string());
        self.channel
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }
}

/// Base64 PCM16 payload of `samples` silent samples.
pub fn silence(samples: usize) -> String {
    crate::audio_utils::encode_i16(&vec![0i16; samples])
}
