//! Microphone blocks -> `realtimeInput` chunks.

use crate::{
    audio_utils::{self, LIVE_PCM16_MIME_TYPE},
    device::{CaptureBlock, Microphone},
    error::DeviceError,
};
use gemini_realtime::{ClientMessage, LiveSender};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Forwards captured blocks to the live channel while the session is active.
///
/// Blocks arrive by message pass from the audio thread; each is encoded and
/// sent as one chunk, in capture order. Nothing is buffered: when the channel
/// is not open the block is dropped.
pub struct CapturePipeline {
    microphone: Box<dyn Microphone>,
    sender: LiveSender,
    sent: u64,
    dropped: u64,
    stopped: bool,
}

impl CapturePipeline {
    /// Connects the microphone's processing node to `blocks` and starts forwarding.
    ///
    /// On failure the microphone is stopped before the error is returned.
    pub fn start(
        mut microphone: Box<dyn Microphone>,
        sender: LiveSender,
        blocks: mpsc::UnboundedSender<CaptureBlock>,
    ) -> Result<Self, DeviceError> {
        if let Err(e) = microphone.connect(blocks) {
            microphone.stop();
            return Err(e);
        }
        info!("Capture pipeline started.");
        Ok(Self {
            microphone,
            sender,
            sent: 0,
            dropped: 0,
            stopped: false,
        })
    }

    /// Encodes and sends one block. Returns whether it was sent.
    pub fn on_block(&mut self, block: &[f32]) -> bool {
        if self.stopped || !self.sender.is_open() {
            self.dropped += 1;
            return false;
        }
        let data = audio_utils::encode_f32_to_base64_i16(block);
        match self
            .sender
            .send(&ClientMessage::audio_chunk(data, LIVE_PCM16_MIME_TYPE))
        {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(e) => {
                debug!("Dropping capture chunk: {}", e);
                self.dropped += 1;
                false
            }
        }
    }

    /// Stops the microphone track and disconnects the processing node. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.microphone.stop();
        info!(
            sent = self.sent,
            dropped = self.dropped,
            "Capture pipeline stopped."
        );
    }

    pub fn chunks_sent(&self) -> u64 {
        self.sent
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Capture pipeline dropped without stop; stopping microphone.");
            self.stop();
        }
    }
}
