//! Bounded app-source queue between the feeding core and playback.
//!
//! The loop thread pushes whole chunks; the output callback pops interleaved `i16`
//! frames. The queue watches its own fill level and tells the producer side when to
//! start and stop feeding:
//! - `enough-data` once the level reaches `max_bytes`
//! - `need-data` once it drains back to `min_bytes`
//!
//! Both are edge-triggered and sent while the lock is held, so the order in which
//! they are delivered is the order of the level changes that caused them. Signal
//! targets must therefore never call back into the queue. After end of stream and a
//! full drain the queue posts `Eos` on the bus exactly once.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::bus::BusSender;
use crate::caps::AudioCaps;
use crate::chunk::AudioChunk;
use crate::clock;
use crate::sink::{ChunkSink, FeedSignals, FlowStatus};

/// Strategy for popping interleaved frames from the queue.
pub enum PopStrategy {
    /// Block until at least one frame is available, then return up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Return immediately with up to `max_frames`, or `None` if currently empty.
    NonBlocking { max_frames: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Demand {
    /// `need-data` was the last signal sent.
    Wanting,
    /// `enough-data` was the last signal sent.
    Satisfied,
}

struct QueueInner {
    chunks: VecDeque<AudioChunk>,
    /// Bytes already consumed from the front chunk.
    front_pos: usize,
    level: usize,
    eos: bool,
    eos_posted: bool,
    flushing: bool,
    demand: Demand,
    played_frames: u64,
    position: Duration,
}

enum Notify {
    Need(u32),
    Enough,
    Eos,
}

pub struct StreamQueue {
    caps: AudioCaps,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_bytes: usize,
    min_bytes: usize,
    signals: Arc<dyn FeedSignals>,
    bus: BusSender,
}

impl StreamQueue {
    /// Create a queue that accepts `caps` and holds at most about `max_bytes`.
    pub fn new(
        caps: AudioCaps,
        max_bytes: usize,
        min_bytes: usize,
        signals: Arc<dyn FeedSignals>,
        bus: BusSender,
    ) -> Self {
        Self {
            caps,
            inner: Mutex::new(QueueInner {
                chunks: VecDeque::new(),
                front_pos: 0,
                level: 0,
                eos: false,
                eos_posted: false,
                flushing: false,
                demand: Demand::Satisfied,
                played_frames: 0,
                position: Duration::ZERO,
            }),
            cv: Condvar::new(),
            max_bytes,
            min_bytes: min_bytes.min(max_bytes.saturating_sub(1)),
            signals,
            bus,
        }
    }

    pub fn caps(&self) -> AudioCaps {
        self.caps
    }

    /// Ask for the first data. Called once the consumer is ready to play.
    pub fn start(&self) {
        let mut g = self.lock();
        let notify = self.want_more(&mut g);
        self.emit(notify);
    }

    /// Queue `chunk`. Never blocks; a full queue signals `enough-data` instead.
    pub fn push(&self, chunk: AudioChunk) -> FlowStatus {
        {
            let mut g = self.lock();
            if g.flushing {
                return FlowStatus::Flushing;
            }
            if g.eos {
                return FlowStatus::Eos;
            }
            g.level += chunk.len();
            g.chunks.push_back(chunk);
            if g.level >= self.max_bytes && g.demand == Demand::Wanting {
                g.demand = Demand::Satisfied;
                self.emit(Some(Notify::Enough));
            }
        }
        self.cv.notify_all();
        FlowStatus::Ok
    }

    /// Mark end of stream; buffered data still plays out.
    pub fn mark_eos(&self) -> FlowStatus {
        {
            let mut g = self.lock();
            if g.flushing {
                return FlowStatus::Flushing;
            }
            if g.eos {
                return FlowStatus::Eos;
            }
            g.eos = true;
            let notify = self.eos_if_drained(&mut g);
            self.emit(notify);
        }
        self.cv.notify_all();
        FlowStatus::Ok
    }

    /// While flushing, pushes are refused and buffered data is dropped.
    ///
    /// Leaving the flushing state asks for data again, since a producer refused
    /// during the flush has stopped.
    pub fn set_flushing(&self, flushing: bool) {
        {
            let mut g = self.lock();
            let was_flushing = g.flushing;
            g.flushing = flushing;
            if flushing {
                g.chunks.clear();
                g.front_pos = 0;
                g.level = 0;
            } else if was_flushing {
                g.demand = Demand::Satisfied;
                let notify = self.want_more(&mut g);
                self.emit(notify);
            }
        }
        self.cv.notify_all();
    }

    /// Pop interleaved frames using the requested strategy.
    ///
    /// Returns `None` when nothing is available (non-blocking), or when the queue is
    /// drained after end of stream or flushing (blocking).
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<i16>> {
        let out = {
            let mut g = self.lock();
            let max_frames = match strategy {
                PopStrategy::BlockingUpTo { max_frames } => {
                    while g.level == 0 && !g.eos && !g.flushing {
                        g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
                    }
                    max_frames
                }
                PopStrategy::NonBlocking { max_frames } => max_frames,
            };
            let out = self.take_frames(&mut g, max_frames);
            let notify = if g.eos {
                self.eos_if_drained(&mut g)
            } else if g.level <= self.min_bytes {
                self.want_more(&mut g)
            } else {
                None
            };
            self.emit(notify);
            out
        };
        self.cv.notify_all();
        if out.is_empty() { None } else { Some(out) }
    }

    /// Bytes buffered and not yet played.
    pub fn level_bytes(&self) -> usize {
        self.lock().level
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_eos(&self) -> bool {
        self.lock().eos
    }

    /// Frames handed to the output so far.
    pub fn played_frames(&self) -> u64 {
        self.lock().played_frames
    }

    /// Stream time of the next frame to play, taken from the chunk timestamps.
    pub fn position(&self) -> Duration {
        self.lock().position
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_frames(&self, g: &mut QueueInner, max_frames: usize) -> Vec<i16> {
        let bytes_per_frame = self.caps.bytes_per_frame();
        let mut want = max_frames * bytes_per_frame;
        let mut out = Vec::with_capacity(want / 2);

        while want > 0 {
            let Some(front) = g.chunks.front() else {
                break;
            };
            let payload = front.payload();
            let start = g.front_pos;
            let take = (payload.len() - start).min(want);
            out.extend(
                payload[start..start + take]
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
            let consumed_frames = ((start + take) / bytes_per_frame) as u64;
            let position =
                front.pts() + clock::frames_to_time(consumed_frames, self.caps.rate);
            let exhausted = start + take == payload.len();

            want -= take;
            g.level -= take;
            g.played_frames += (take / bytes_per_frame) as u64;
            g.position = position;
            if exhausted {
                g.chunks.pop_front();
                g.front_pos = 0;
            } else {
                g.front_pos = start + take;
            }
        }
        out
    }

    fn want_more(&self, g: &mut QueueInner) -> Option<Notify> {
        if g.eos || g.flushing || g.demand == Demand::Wanting {
            return None;
        }
        g.demand = Demand::Wanting;
        let room = self.max_bytes.saturating_sub(g.level);
        Some(Notify::Need(u32::try_from(room).unwrap_or(u32::MAX)))
    }

    fn eos_if_drained(&self, g: &mut QueueInner) -> Option<Notify> {
        if g.level == 0 && !g.eos_posted {
            g.eos_posted = true;
            Some(Notify::Eos)
        } else {
            None
        }
    }

    /// Deliver `notify`. Callers hold the queue lock.
    fn emit(&self, notify: Option<Notify>) {
        match notify {
            Some(Notify::Need(hint)) => self.signals.need_data(hint),
            Some(Notify::Enough) => self.signals.enough_data(),
            Some(Notify::Eos) => self.bus.eos(),
            None => {}
        }
    }
}

impl ChunkSink for Arc<StreamQueue> {
    fn caps(&self) -> AudioCaps {
        self.caps
    }

    fn push_chunk(&mut self, chunk: AudioChunk) -> FlowStatus {
        self.push(chunk)
    }

    fn end_of_stream(&mut self) -> FlowStatus {
        self.mark_eos()
    }
}
