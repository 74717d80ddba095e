//! Test doubles shared by the module tests.

use std::sync::Mutex;

use crate::caps::AudioCaps;
use crate::chunk::AudioChunk;
use crate::config::FeedConfig;
use crate::sink::{ChunkSink, FeedSignals, FlowStatus};

/// Sink that keeps every accepted chunk and can refuse the n-th push.
pub struct RecordingSink {
    pub chunks: Vec<AudioChunk>,
    pub attempts: usize,
    pub eos_count: usize,
    reject_at: Option<(usize, FlowStatus)>,
    caps: AudioCaps,
}

impl RecordingSink {
    pub fn accepting() -> Self {
        Self {
            chunks: Vec::new(),
            attempts: 0,
            eos_count: 0,
            reject_at: None,
            caps: AudioCaps::from_config(&FeedConfig::default()),
        }
    }

    /// Refuse the `nth` push (1-based) and every push after it.
    pub fn rejecting_at(nth: usize, status: FlowStatus) -> Self {
        Self {
            reject_at: Some((nth, status)),
            ..Self::accepting()
        }
    }
}

impl ChunkSink for RecordingSink {
    fn caps(&self) -> AudioCaps {
        self.caps
    }

    fn push_chunk(&mut self, chunk: AudioChunk) -> FlowStatus {
        self.attempts += 1;
        if let Some((nth, status)) = self.reject_at {
            if self.attempts >= nth {
                return status;
            }
        }
        self.chunks.push(chunk);
        FlowStatus::Ok
    }

    fn end_of_stream(&mut self) -> FlowStatus {
        self.eos_count += 1;
        FlowStatus::Ok
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Need(u32),
    Enough,
}

/// Records backpressure signals in emission order.
#[derive(Default)]
pub struct SignalLog {
    pub seen: Mutex<Vec<Signal>>,
}

impl SignalLog {
    pub fn take(&self) -> Vec<Signal> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl FeedSignals for SignalLog {
    fn need_data(&self, hint: u32) {
        self.seen.lock().unwrap().push(Signal::Need(hint));
    }

    fn enough_data(&self) {
        self.seen.lock().unwrap().push(Signal::Enough);
    }
}
