use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock;

/// Counters shared between the feeding side and the output callback.
#[derive(Debug, Default)]
pub struct FeedCounters {
    /// Frames emitted as silence because the queue ran dry.
    pub underrun_frames: AtomicU64,
    /// Number of callbacks that hit an empty queue.
    pub underrun_events: AtomicU64,
}

impl FeedCounters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Point-in-time view of a feeding run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub sample_rate: u32,
    /// Frames handed to the consumer.
    pub frames_fed: u64,
    pub chunks_fed: u64,
    /// Frames the output has pulled from the queue.
    pub played_frames: u64,
    /// Stream time reached by the output, from chunk timestamps.
    pub position: Duration,
    pub queued_bytes: usize,
    pub underrun_frames: u64,
    pub underrun_events: u64,
}

impl FeedStatus {
    pub fn with_counters(mut self, counters: &FeedCounters) -> Self {
        self.underrun_frames = counters.underrun_frames.load(Ordering::Relaxed);
        self.underrun_events = counters.underrun_events.load(Ordering::Relaxed);
        self
    }

    pub fn fed_ms(&self) -> Option<u64> {
        (self.sample_rate > 0).then(|| clock::frames_to_ms(self.frames_fed, self.sample_rate))
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        (self.sample_rate > 0).then(|| clock::frames_to_ms(self.played_frames, self.sample_rate))
    }

    pub fn log(&self) {
        tracing::info!(
            chunks = self.chunks_fed,
            frames_fed = self.frames_fed,
            fed_ms = self.fed_ms(),
            elapsed_ms = self.elapsed_ms(),
            position_ms = self.position.as_millis() as u64,
            queued_bytes = self.queued_bytes,
            underrun_frames = self.underrun_frames,
            underrun_events = self.underrun_events,
            "feed status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_elapsed_from_played_frames() {
        let status = FeedStatus {
            sample_rate: 44_100,
            frames_fed: 3072,
            played_frames: 88_200,
            ..FeedStatus::default()
        };
        assert_eq!(status.elapsed_ms(), Some(2000));
        assert_eq!(status.fed_ms(), Some(69));
    }

    #[test]
    fn zero_rate_has_no_times() {
        let status = FeedStatus::default();
        assert!(status.elapsed_ms().is_none());
        assert!(status.fed_ms().is_none());
    }

    #[test]
    fn counters_are_folded_in() {
        let counters = FeedCounters::shared();
        counters.underrun_frames.store(12, Ordering::Relaxed);
        counters.underrun_events.store(3, Ordering::Relaxed);
        let status = FeedStatus::default().with_counters(&counters);
        assert_eq!(status.underrun_frames, 12);
        assert_eq!(status.underrun_events, 3);
    }
}
