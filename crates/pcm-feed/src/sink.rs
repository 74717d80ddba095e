//! Contract between the feeding core and the consumer it feeds.

use std::fmt;

use crate::caps::AudioCaps;
use crate::chunk::AudioChunk;

/// Consumer's answer to a push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStatus {
    Ok,
    /// Consumer is flushing or shutting down.
    Flushing,
    /// Consumer already reached end of stream.
    Eos,
    NotLinked,
    NotNegotiated,
    Error,
}

impl FlowStatus {
    pub fn is_ok(self) -> bool {
        self == FlowStatus::Ok
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowStatus::Ok => "ok",
            FlowStatus::Flushing => "flushing",
            FlowStatus::Eos => "eos",
            FlowStatus::NotLinked => "not-linked",
            FlowStatus::NotNegotiated => "not-negotiated",
            FlowStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Downstream end that accepts timestamped chunks.
pub trait ChunkSink {
    /// Stream description fixed when the sink was built.
    fn caps(&self) -> AudioCaps;
    /// Hand `chunk` to the consumer. Ownership moves with it.
    fn push_chunk(&mut self, chunk: AudioChunk) -> FlowStatus;
    /// No more chunks will follow.
    fn end_of_stream(&mut self) -> FlowStatus;
}

impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    fn caps(&self) -> AudioCaps {
        (**self).caps()
    }

    fn push_chunk(&mut self, chunk: AudioChunk) -> FlowStatus {
        (**self).push_chunk(chunk)
    }

    fn end_of_stream(&mut self) -> FlowStatus {
        (**self).end_of_stream()
    }
}

/// Backpressure signals emitted by the consumer.
///
/// Edge-triggered: a consumer emits `need_data` when it drains to its low mark and
/// `enough_data` when it fills up, not on every push or pop.
pub trait FeedSignals: Send + Sync {
    fn need_data(&self, hint: u32);
    fn enough_data(&self);
}
