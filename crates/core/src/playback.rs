//! Gapless playback of inbound audio payloads.
//!
//! Payloads queue in arrival order. At most one buffer is in flight: when it
//! completes, the next payload is decoded and scheduled at
//! `max(device clock, next_play_time)`, so consecutive buffers butt up against
//! each other without overlapping and nothing is ever scheduled in the past.

use crate::{
    audio_utils::{self, LIVE_PCM16_SAMPLE_RATE},
    device::{AudioBuffer, PlaybackDevice, PlaybackTicket},
};
use std::collections::VecDeque;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Playing { ticket: PlaybackTicket },
}

pub struct PlaybackPipeline {
    device: Box<dyn PlaybackDevice>,
    queue: VecDeque<String>,
    state: DrainState,
    next_play_time: f64,
    next_ticket: PlaybackTicket,
    closed: bool,
}

impl PlaybackPipeline {
    pub fn new(device: Box<dyn PlaybackDevice>) -> Self {
        Self {
            device,
            queue: VecDeque::new(),
            state: DrainState::Idle,
            next_play_time: 0.0,
            next_ticket: 1,
            closed: false,
        }
    }

    /// Queues one base64 PCM16 payload and starts draining if idle.
    pub fn enqueue(&mut self, payload: String) {
        if self.closed {
            return;
        }
        self.queue.push_back(payload);
        if self.state == DrainState::Idle {
            self.drain();
        }
    }

    /// Handles the natural completion of a scheduled buffer.
    ///
    /// Completions of buffers scheduled before an interrupt are stale and ignored.
    pub fn on_ended(&mut self, ticket: PlaybackTicket) {
        match self.state {
            DrainState::Playing { ticket: current } if current == ticket => {
                self.state = DrainState::Idle;
                self.drain();
            }
            _ => debug!(ticket, "Ignoring stale playback completion."),
        }
    }

    /// Barge-in: drops every unplayed payload and re-anchors the clock.
    ///
    /// A buffer already handed to the device keeps playing. With nothing queued
    /// this is a no-op, so an in-flight buffer keeps its ticket and anchor.
    pub fn interrupt(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        debug!(dropped = self.queue.len(), "Playback interrupted.");
        self.queue.clear();
        self.state = DrainState::Idle;
        self.next_play_time = self.device.current_time();
    }

    /// Clears the queue, resets the clock anchor, and releases the device. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();
        self.state = DrainState::Idle;
        self.next_play_time = 0.0;
        self.device.close();
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    /// Schedules the head of the queue, skipping payloads that fail to decode
    /// or schedule. Leaves the state `Idle` once the queue is exhausted.
    fn drain(&mut self) {
        while let Some(payload) = self.queue.pop_front() {
            let samples = match audio_utils::decode_f32_from_base64_i16(&payload) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Skipping undecodable audio payload: {}", e);
                    continue;
                }
            };
            let buffer = AudioBuffer::new(samples, LIVE_PCM16_SAMPLE_RATE);
            let duration = buffer.duration();

            let now = self.device.current_time();
            if self.next_play_time < now {
                self.next_play_time = now;
            }
            let ticket = self.next_ticket;
            self.next_ticket += 1;

            if let Err(e) = self.device.schedule(buffer, self.next_play_time, ticket) {
                warn!("Skipping audio payload the device refused: {}", e);
                continue;
            }
            self.next_play_time += duration;
            self.state = DrainState::Playing { ticket };
            return;
        }
        self.state = DrainState::Idle;
    }
}
