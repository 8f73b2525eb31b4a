//! Seams between the session engine and the audio hardware.
//!
//! The engine never touches a device directly. A [`AudioDevices`]
//! implementation hands out a playback context with its own clock and a
//! microphone track; both release their hardware on `close`/`stop` and on drop.

use crate::error::DeviceError;
use tokio::sync::mpsc;

/// A block of mono float samples at the session sample rate.
pub type CaptureBlock = Vec<f32>;

/// Identifies one scheduled buffer in completion reports.
pub type PlaybackTicket = u64;

/// A mono buffer ready to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// An open playback context: the device clock plus a scheduler.
///
/// Implementations report each buffer's natural completion by sending its
/// ticket on the channel passed to [`AudioDevices::open_output`].
pub trait PlaybackDevice: Send {
    /// Current device clock in seconds. Monotonic.
    fn current_time(&self) -> f64;

    /// Starts `buffer` at `start_at` seconds on the device clock.
    fn schedule(
        &mut self,
        buffer: AudioBuffer,
        start_at: f64,
        ticket: PlaybackTicket,
    ) -> Result<(), DeviceError>;

    /// Releases the context. Idempotent.
    fn close(&mut self);
}

/// A live microphone track.
pub trait Microphone: Send {
    /// Connects the processing node. From now on every captured block is
    /// posted to `blocks` without blocking the audio thread.
    fn connect(&mut self, blocks: mpsc::UnboundedSender<CaptureBlock>) -> Result<(), DeviceError>;

    /// Disconnects the processing node and stops the track. Idempotent.
    fn stop(&mut self);
}

/// Hands out audio resources for one session attempt.
pub trait AudioDevices: Send + Sync {
    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackTicket>,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError>;

    fn open_microphone(&self) -> Result<Box<dyn Microphone>, DeviceError>;
}
