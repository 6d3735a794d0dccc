//! Visual debugger stream
//!
//! Each debugger step encodes one [`DebugFrame`] with `bincode` and hands a
//! copy to every subscriber over a bounded channel. A subscriber that falls
//! behind loses frames; one that hung up is dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::camera::DebugCamera;
use crate::config::VisualDebuggerConfiguration;
use crate::constants::debugger::SUBSCRIBER_QUEUE_DEPTH;
use crate::error::{PhysicsError, PhysicsResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugBody {
    pub entity_index: i32,
    pub entity_version: i32,
    pub position: [f32; 3],
    pub radius: f32,
    pub dynamic: bool,
    pub asleep: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugContact {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub impulse: f32,
}

/// Everything the debugger shows for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugFrame {
    pub step_index: u64,
    pub time_step: f32,
    pub camera: DebugCamera,
    pub bodies: Vec<DebugBody>,
    pub contacts: Vec<DebugContact>,
}

pub fn decode_frame(bytes: &[u8]) -> PhysicsResult<DebugFrame> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Debug)]
pub struct VisualDebuggerServer {
    port: u16,
    frame_budget: usize,
    subscribers: Vec<Sender<Vec<u8>>>,
    frames_published: u64,
    frames_dropped: u64,
}

impl VisualDebuggerServer {
    /// Frames are capped at `timer_bytes_per_thread` for every worker thread
    pub fn new(config: &VisualDebuggerConfiguration, threads: usize) -> Self {
        let frame_budget = config.timer_bytes_per_thread.saturating_mul(threads.max(1));
        log::info!(
            "[VisualDebugger::new] Serving on port {} with a {} byte frame budget",
            config.port,
            frame_budget
        );
        Self {
            port: config.port,
            frame_budget,
            subscribers: Vec::new(),
            frames_published: 0,
            frames_dropped: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn frame_budget(&self) -> usize {
        self.frame_budget
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn subscribe(&mut self) -> Receiver<Vec<u8>> {
        let (sender, receiver) = bounded(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.push(sender);
        receiver
    }

    /// Encode `frame` within the budget and offer it to every subscriber.
    /// Returns the number of subscribers that received it.
    pub fn publish(&mut self, frame: &mut DebugFrame) -> PhysicsResult<usize> {
        let bytes = self.encode_within_budget(frame)?;
        self.frames_published += 1;

        let mut delivered = 0;
        let mut dropped = 0;
        self.subscribers.retain(|subscriber| match subscriber.try_send(bytes.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.frames_dropped += dropped;

        log::trace!(
            "[VisualDebugger::publish] Frame {} ({} bytes) to {} subscribers, {} dropped",
            frame.step_index,
            bytes.len(),
            delivered,
            dropped
        );
        Ok(delivered)
    }

    /// Halve the contact list, then the body list, until the frame fits
    fn encode_within_budget(&self, frame: &mut DebugFrame) -> PhysicsResult<Vec<u8>> {
        loop {
            let bytes = bincode::serialize(frame)?;
            if bytes.len() <= self.frame_budget {
                return Ok(bytes);
            }
            if !frame.contacts.is_empty() {
                frame.contacts.truncate(frame.contacts.len() / 2);
            } else if !frame.bodies.is_empty() {
                frame.bodies.truncate(frame.bodies.len() / 2);
            } else {
                return Err(PhysicsError::BufferTooSmall {
                    name: "visual debugger frame".to_string(),
                    required: bytes.len(),
                    available: self.frame_budget,
                });
            }
            log::warn!(
                "[VisualDebugger::publish] Frame {} over budget, trimmed to {} bodies, {} contacts",
                frame.step_index,
                frame.bodies.len(),
                frame.contacts.len()
            );
        }
    }
}
