//! Feeding from a dedicated thread.
//!
//! Alternative to the cooperative loop when the producer should not share a thread
//! with anything else. The feeding flag is an atomic written with release and read
//! with acquire; a condvar parks the feeder while the flag is down, so an idle
//! feeder costs nothing.

use std::io::Read;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::bus::BusSender;
use crate::producer::{ChunkProducer, StopReason};
use crate::session::FeedSession;
use crate::sink::{ChunkSink, FeedSignals};

#[derive(Debug, Default)]
pub struct FeedGate {
    feeding: AtomicBool,
    closed: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl FeedGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_feeding(&self) -> bool {
        self.feeding.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the feeder for good and wake it if parked.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake();
    }

    /// Park until feeding is enabled. Returns `false` once the gate is closed.
    pub fn wait_until_feeding(&self) -> bool {
        let mut g = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if self.is_closed() {
                return false;
            }
            if self.is_feeding() {
                return true;
            }
            g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn wake(&self) {
        // Taking the lock orders the store before a waiter's re-check.
        drop(self.lock.lock().unwrap_or_else(|e| e.into_inner()));
        self.cv.notify_all();
    }
}

impl FeedSignals for FeedGate {
    fn need_data(&self, hint: u32) {
        if !self.feeding.swap(true, Ordering::AcqRel) {
            tracing::debug!(hint, "start feeding");
            self.wake();
        }
    }

    fn enough_data(&self) {
        if self.feeding.swap(false, Ordering::AcqRel) {
            tracing::debug!("stop feeding");
        }
    }
}

/// Feeder thread state handed back when the thread ends.
pub struct FeederExit<R, S> {
    pub producer: ChunkProducer<R>,
    pub sink: S,
    pub session: FeedSession,
    /// `None` when the gate was closed before the producer stopped on its own.
    pub reason: Option<StopReason>,
}

/// Run `producer` on its own thread, pushing into `sink` whenever `gate` is open.
///
/// The thread ends when the producer stops or the gate is closed. A stopping
/// producer closes the gate; read errors and refused pushes are posted on `bus`.
pub fn spawn_feeder<R, S>(
    gate: Arc<FeedGate>,
    mut producer: ChunkProducer<R>,
    mut sink: S,
    bus: BusSender,
) -> std::io::Result<JoinHandle<FeederExit<R, S>>>
where
    R: Read + Send + 'static,
    S: ChunkSink + Send + 'static,
{
    thread::Builder::new()
        .name("pcm-feeder".into())
        .spawn(move || {
            let mut session = FeedSession::new();
            let mut reason = None;
            while gate.wait_until_feeding() {
                if let ControlFlow::Break(r) = producer.produce(&mut session, &mut sink) {
                    tracing::debug!(reason = ?r, "feeder stopping");
                    match &r {
                        StopReason::EndOfStream => {}
                        StopReason::Rejected(status) => {
                            bus.error("feeder", format!("push refused: {status}"));
                        }
                        StopReason::SourceError(message) => bus.error("source", message.clone()),
                    }
                    reason = Some(r);
                    gate.close();
                }
            }
            FeederExit {
                producer,
                sink,
                session,
                reason,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, BusMessage};
    use crate::caps::AudioCaps;
    use crate::config::FeedConfig;
    use crate::source::AudioSource;
    use crate::testing::RecordingSink;
    use std::io::Cursor;
    use std::time::Duration;

    fn producer(chunks: usize) -> ChunkProducer<Cursor<Vec<u8>>> {
        let cfg = FeedConfig::default();
        ChunkProducer::new(
            AudioSource::from_reader("mem", Cursor::new(vec![0u8; chunks * cfg.chunk_bytes])),
            cfg.chunk_bytes,
            AudioCaps::from_config(&cfg),
        )
    }

    #[test]
    fn wait_returns_when_need_data_arrives() {
        let gate = Arc::new(FeedGate::new());
        let g = gate.clone();
        let t = thread::spawn(move || g.wait_until_feeding());
        thread::sleep(Duration::from_millis(10));
        gate.need_data(0);
        assert!(t.join().unwrap());
    }

    #[test]
    fn close_releases_parked_waiter() {
        let gate = Arc::new(FeedGate::new());
        let g = gate.clone();
        let t = thread::spawn(move || g.wait_until_feeding());
        thread::sleep(Duration::from_millis(10));
        gate.close();
        assert!(!t.join().unwrap());
    }

    #[test]
    fn signals_toggle_flag_idempotently() {
        let gate = FeedGate::new();
        gate.enough_data();
        assert!(!gate.is_feeding());
        gate.need_data(0);
        gate.need_data(0);
        assert!(gate.is_feeding());
        gate.enough_data();
        assert!(!gate.is_feeding());
    }

    #[test]
    fn feeder_runs_to_end_of_stream() {
        let gate = Arc::new(FeedGate::new());
        gate.need_data(0);
        let (bus_tx, bus_rx) = bus::bus();
        let handle =
            spawn_feeder(gate.clone(), producer(3), RecordingSink::accepting(), bus_tx).unwrap();
        let exit = handle.join().unwrap();
        assert!(bus_rx.try_recv().is_err());
        assert_eq!(exit.reason, Some(StopReason::EndOfStream));
        assert_eq!(exit.sink.chunks.len(), 3);
        assert_eq!(exit.sink.eos_count, 1);
        assert_eq!(exit.session.sample_count(), 3072);
        assert!(gate.is_closed());
    }

    #[test]
    fn feeder_never_pushes_while_gate_is_down() {
        let gate = Arc::new(FeedGate::new());
        let (bus_tx, _bus_rx) = bus::bus();
        let handle =
            spawn_feeder(gate.clone(), producer(8), RecordingSink::accepting(), bus_tx).unwrap();
        thread::sleep(Duration::from_millis(20));
        gate.close();
        let exit = handle.join().unwrap();
        assert!(exit.reason.is_none());
        assert!(exit.sink.chunks.is_empty());
    }

    #[test]
    fn feeder_stops_on_rejection() {
        let gate = Arc::new(FeedGate::new());
        gate.need_data(0);
        let sink = RecordingSink::rejecting_at(5, crate::sink::FlowStatus::Error);
        let (bus_tx, bus_rx) = bus::bus();
        let exit = spawn_feeder(gate, producer(10), sink, bus_tx)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(
            exit.reason,
            Some(StopReason::Rejected(crate::sink::FlowStatus::Error))
        );
        assert_eq!(exit.sink.attempts, 5);
        assert!(matches!(bus_rx.try_recv(), Ok(BusMessage::Error { .. })));
    }
}
