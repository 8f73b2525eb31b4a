//! cpal-backed microphone and speaker.
//!
//! cpal streams are not `Send` on every host, so each stream lives on its own
//! thread for as long as its guard is alive. The callbacks only touch state
//! behind a `parking_lot::Mutex` and post to unbounded channels, so they never
//! block on the session loop.

use crate::resample::{StreamResampler, resample_buffer};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::{Arc, mpsc as std_mpsc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use voxlink_core::{
    AudioBuffer, AudioDevices, CaptureBlock, DeviceError, Microphone, PlaybackDevice,
    PlaybackTicket,
    audio_utils::{CAPTURE_BLOCK_SIZE, LIVE_PCM16_SAMPLE_RATE},
};

/// Keeps a stream's thread (and so the stream) alive until stopped or dropped.
struct StreamGuard {
    stop: Option<std_mpsc::Sender<()>>,
}

impl StreamGuard {
    fn stop(&mut self) {
        // Dropping the sender wakes the stream thread, which drops the stream.
        self.stop.take();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds and plays a stream on a dedicated thread, returning once it is
/// running (or failed to start).
fn spawn_stream<T, F>(
    name: &str,
    to_error: fn(String) -> DeviceError,
    build: F,
) -> Result<(StreamGuard, T), DeviceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<(cpal::Stream, T), DeviceError> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<T, DeviceError>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let (stream, info) = match build() {
                Ok(built) => built,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(to_error(format!("failed to start stream: {}", e))));
                return;
            }
            if ready_tx.send(Ok(info)).is_err() {
                return;
            }
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(|e| to_error(format!("failed to spawn audio thread: {}", e)))?;

    let info = ready_rx
        .recv()
        .map_err(|_| to_error("audio thread exited during startup".to_string()))??;
    Ok((StreamGuard { stop: Some(stop_tx) }, info))
}

/// Hands out the default input and output devices.
#[derive(Default)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDevices for CpalDevices {
    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackTicket>,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        Ok(Box::new(CpalPlayback::open(ended)?))
    }

    fn open_microphone(&self) -> Result<Box<dyn Microphone>, DeviceError> {
        Ok(Box::new(CpalMicrophone::open()?))
    }
}

/// One scheduled buffer, already at the device rate.
struct Voice {
    ticket: PlaybackTicket,
    start_frame: u64,
    samples: Vec<f32>,
    reported: bool,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Renders scheduled voices against a frame counter that doubles as the
/// playback clock.
struct Mixer {
    frames_rendered: u64,
    voices: Vec<Voice>,
    ended: mpsc::UnboundedSender<PlaybackTicket>,
}

impl Mixer {
    fn new(ended: mpsc::UnboundedSender<PlaybackTicket>) -> Self {
        Self {
            frames_rendered: 0,
            voices: Vec::new(),
            ended,
        }
    }

    /// Fills one interleaved output block.
    ///
    /// A voice's ticket is reported once its last frame falls before the end of
    /// the next block, so the follow-up buffer is scheduled before the device
    /// reaches the seam. The voice itself stays until it is fully rendered.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let position = self.frames_rendered + i as u64;
            let mut value = 0.0f32;
            for voice in &self.voices {
                if position >= voice.start_frame && position < voice.end_frame() {
                    value += voice.samples[(position - voice.start_frame) as usize];
                }
            }
            frame.fill(value.clamp(-1.0, 1.0));
        }
        let block_frames = (data.len() / channels) as u64;
        self.frames_rendered += block_frames;

        let now = self.frames_rendered;
        for voice in self.voices.iter_mut() {
            if !voice.reported && voice.end_frame() <= now + block_frames {
                voice.reported = true;
                let _ = self.ended.send(voice.ticket);
            }
        }
        self.voices.retain(|voice| voice.end_frame() > now);
    }
}

/// The default output device as a scheduled-playback context.
pub struct CpalPlayback {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    guard: Option<StreamGuard>,
}

impl CpalPlayback {
    pub fn open(ended: mpsc::UnboundedSender<PlaybackTicket>) -> Result<Self, DeviceError> {
        let mixer = Arc::new(Mutex::new(Mixer::new(ended)));
        let mixer_for_stream = mixer.clone();

        let (guard, sample_rate) = spawn_stream("voxlink-playback", DeviceError::Output, move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| DeviceError::Output("no default output device".to_string()))?;
            let supported = device
                .default_output_config()
                .map_err(|e| DeviceError::Output(e.to_string()))?;
            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;
            let config: cpal::StreamConfig = supported.into();
            info!(
                device = %device.name().unwrap_or_default(),
                sample_rate,
                channels,
                "Opening audio output."
            );

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        mixer_for_stream.lock().render(data, channels);
                    },
                    move |err| {
                        error!("Audio playback error: {}", err);
                    },
                    None,
                )
                .map_err(|e| DeviceError::Output(format!("failed to build stream: {}", e)))?;
            Ok((stream, sample_rate))
        })?;

        Ok(Self {
            mixer,
            sample_rate,
            guard: Some(guard),
        })
    }
}

impl PlaybackDevice for CpalPlayback {
    fn current_time(&self) -> f64 {
        self.mixer.lock().frames_rendered as f64 / self.sample_rate as f64
    }

    fn schedule(
        &mut self,
        buffer: AudioBuffer,
        start_at: f64,
        ticket: PlaybackTicket,
    ) -> Result<(), DeviceError> {
        if self.guard.is_none() {
            return Err(DeviceError::Output("output closed".to_string()));
        }
        let samples = resample_buffer(&buffer.samples, buffer.sample_rate, self.sample_rate)
            .map_err(|e| DeviceError::Output(format!("{:#}", e)))?;
        let start_frame = (start_at * self.sample_rate as f64).round() as u64;
        debug!(ticket, start_at, frames = samples.len(), "Scheduling buffer.");
        self.mixer.lock().voices.push(Voice {
            ticket,
            start_frame,
            samples,
            reported: false,
        });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            self.mixer.lock().voices.clear();
            guard.stop();
            info!("Audio output closed.");
        }
    }
}

/// Turns device-rate, interleaved input into 24 kHz mono blocks.
struct BlockFramer {
    channels: usize,
    resampler: StreamResampler,
    block: Vec<f32>,
    blocks: mpsc::UnboundedSender<CaptureBlock>,
}

impl BlockFramer {
    fn push(&mut self, data: &[f32]) {
        let channels = self.channels.max(1);
        let mono: Vec<f32> = data
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        for sample in self.resampler.push(&mono) {
            self.block.push(sample);
            if self.block.len() == CAPTURE_BLOCK_SIZE {
                let block = std::mem::replace(&mut self.block, Vec::with_capacity(CAPTURE_BLOCK_SIZE));
                let _ = self.blocks.send(block);
            }
        }
    }
}

/// The default input device. The stream runs from `open`; blocks are only
/// forwarded once `connect` installs a destination.
pub struct CpalMicrophone {
    framer: Arc<Mutex<Option<BlockFramer>>>,
    sample_rate: u32,
    channels: usize,
    guard: Option<StreamGuard>,
}

impl CpalMicrophone {
    pub fn open() -> Result<Self, DeviceError> {
        let framer: Arc<Mutex<Option<BlockFramer>>> = Arc::new(Mutex::new(None));
        let framer_for_stream = framer.clone();

        let (guard, (sample_rate, channels)) =
            spawn_stream("voxlink-capture", DeviceError::Microphone, move || {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or_else(|| DeviceError::Microphone("no default input device".to_string()))?;
                let supported = device
                    .default_input_config()
                    .map_err(|e| DeviceError::Microphone(e.to_string()))?;
                let sample_rate = supported.sample_rate().0;
                let channels = supported.channels() as usize;
                let config: cpal::StreamConfig = supported.into();
                info!(
                    device = %device.name().unwrap_or_default(),
                    sample_rate,
                    channels,
                    "Opening microphone."
                );

                let stream = device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            if let Some(framer) = framer_for_stream.lock().as_mut() {
                                framer.push(data);
                            }
                        },
                        move |err| {
                            error!("Audio capture error: {}", err);
                        },
                        None,
                    )
                    .map_err(|e| {
                        DeviceError::Microphone(format!("failed to build stream: {}", e))
                    })?;
                Ok((stream, (sample_rate, channels)))
            })?;

        Ok(Self {
            framer,
            sample_rate,
            channels,
            guard: Some(guard),
        })
    }
}

impl Microphone for CpalMicrophone {
    fn connect(&mut self, blocks: mpsc::UnboundedSender<CaptureBlock>) -> Result<(), DeviceError> {
        if self.guard.is_none() {
            return Err(DeviceError::Microphone("microphone stopped".to_string()));
        }
        let resampler = StreamResampler::new(self.sample_rate, LIVE_PCM16_SAMPLE_RATE)
            .map_err(|e| DeviceError::Microphone(format!("{:#}", e)))?;
        *self.framer.lock() = Some(BlockFramer {
            channels: self.channels,
            resampler,
            block: Vec::with_capacity(CAPTURE_BLOCK_SIZE),
            blocks,
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.framer.lock().take();
        if let Some(mut guard) = self.guard.take() {
            guard.stop();
            info!("Microphone released.");
        }
    }
}
