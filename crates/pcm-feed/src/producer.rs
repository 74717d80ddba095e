//! Chunk producer: one chunk per dispatch.
//!
//! Each call reads up to one chunk from the source, stamps it from the session's
//! frame counter, advances the counter and pushes the chunk. The return value tells
//! the scheduler whether to keep the work item registered.

use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;

use crate::caps::AudioCaps;
use crate::chunk::AudioChunk;
use crate::session::FeedSession;
use crate::sink::{ChunkSink, FlowStatus};
use crate::source::AudioSource;

/// Why a producer stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Source exhausted; end of stream was sent downstream.
    EndOfStream,
    /// Consumer refused a chunk.
    Rejected(FlowStatus),
    /// Reading the source failed.
    SourceError(String),
}

pub struct ChunkProducer<R = BufReader<File>> {
    source: AudioSource<R>,
    chunk_bytes: usize,
    caps: AudioCaps,
    chunks_pushed: u64,
}

impl<R: Read> ChunkProducer<R> {
    /// Producer for `source`, framing chunks of `chunk_bytes` per `caps`.
    pub fn new(source: AudioSource<R>, chunk_bytes: usize, caps: AudioCaps) -> Self {
        Self {
            source,
            chunk_bytes,
            caps,
            chunks_pushed: 0,
        }
    }

    /// Chunks handed to the sink, counting a refused one.
    pub fn chunks_pushed(&self) -> u64 {
        self.chunks_pushed
    }

    pub fn caps(&self) -> AudioCaps {
        self.caps
    }

    pub fn source(&self) -> &AudioSource<R> {
        &self.source
    }

    /// Produce and deliver one chunk.
    ///
    /// A short read is end of stream: the whole frames it did return go out as a
    /// final, shorter chunk, then end of stream is signalled. Bytes of a trailing
    /// partial frame are dropped.
    pub fn produce(
        &mut self,
        session: &mut FeedSession,
        sink: &mut impl ChunkSink,
    ) -> ControlFlow<StopReason> {
        let bytes_per_frame = self.caps.bytes_per_frame();
        let mut buf = vec![0u8; self.chunk_bytes];
        let read = match self.source.read_chunk(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(source = %self.source.label(), "read failed: {e}");
                return ControlFlow::Break(StopReason::SourceError(e.to_string()));
            }
        };

        let whole = read - read % bytes_per_frame;
        if whole < read {
            tracing::warn!(
                dropped_bytes = read - whole,
                "discarding trailing partial frame"
            );
        }

        if whole > 0 {
            buf.truncate(whole);
            let frames = (whole / bytes_per_frame) as u64;
            let offset = session.advance(frames);
            let chunk = AudioChunk::new(buf, offset, bytes_per_frame, self.caps.rate);
            tracing::trace!(
                offset,
                pts_ns = chunk.pts().as_nanos() as u64,
                bytes = whole,
                "push chunk"
            );
            let status = sink.push_chunk(chunk);
            self.chunks_pushed += 1;
            if !status.is_ok() {
                tracing::warn!(%status, chunks = self.chunks_pushed, "consumer rejected chunk");
                return ControlFlow::Break(StopReason::Rejected(status));
            }
        }

        if read < self.chunk_bytes {
            let status = sink.end_of_stream();
            tracing::info!(
                %status,
                frames = session.sample_count(),
                chunks = self.chunks_pushed,
                "source exhausted, end of stream sent"
            );
            return ControlFlow::Break(StopReason::EndOfStream);
        }

        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::testing::RecordingSink;
    use std::io::Cursor;
    use std::time::Duration;

    fn producer(bytes: usize) -> ChunkProducer<Cursor<Vec<u8>>> {
        let cfg = FeedConfig::default();
        let data: Vec<u8> = (0..bytes).map(|i| i as u8).collect();
        ChunkProducer::new(
            AudioSource::from_reader("mem", Cursor::new(data)),
            cfg.chunk_bytes,
            AudioCaps::from_config(&cfg),
        )
    }

    #[test]
    fn three_chunk_file_timestamps() {
        let mut p = producer(3 * 4096);
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();

        for _ in 0..3 {
            assert_eq!(p.produce(&mut session, &mut sink), ControlFlow::Continue(()));
        }
        assert_eq!(session.sample_count(), 3072);
        assert_eq!(sink.chunks[0].pts(), Duration::ZERO);
        assert_eq!(sink.chunks[1].pts().as_nanos(), 23_219_954);
        assert_eq!(sink.chunks[2].offset(), 2048);

        assert_eq!(
            p.produce(&mut session, &mut sink),
            ControlFlow::Break(StopReason::EndOfStream)
        );
        assert_eq!(sink.chunks.len(), 3);
        assert_eq!(sink.eos_count, 1);
        assert_eq!(session.sample_count(), 3072);
    }

    #[test]
    fn counter_and_pts_stay_exact_over_many_chunks() {
        let n = 200;
        let mut p = producer(n * 4096);
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();
        while p.produce(&mut session, &mut sink).is_continue() {}

        assert_eq!(sink.chunks.len(), n);
        let first_duration = sink.chunks[0].duration();
        for (k, chunk) in sink.chunks.iter().enumerate() {
            let before = k as u64 * 1024;
            assert_eq!(chunk.offset(), before);
            assert_eq!(chunk.pts().as_nanos(), u128::from(before) * 1_000_000_000 / 44_100);
            assert_eq!(chunk.duration(), first_duration);
        }
        assert_eq!(session.sample_count(), n as u64 * 1024);
    }

    #[test]
    fn short_read_delivers_whole_frames_then_eos() {
        let mut p = producer(4096 + 1002);
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();

        assert!(p.produce(&mut session, &mut sink).is_continue());
        assert_eq!(
            p.produce(&mut session, &mut sink),
            ControlFlow::Break(StopReason::EndOfStream)
        );
        assert_eq!(sink.chunks.len(), 2);
        assert_eq!(sink.chunks[1].len(), 1000);
        assert_eq!(sink.chunks[1].frames(), 250);
        assert_eq!(session.sample_count(), 1024 + 250);
        assert_eq!(sink.eos_count, 1);
    }

    #[test]
    fn empty_source_sends_only_eos() {
        let mut p = producer(0);
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();
        assert_eq!(
            p.produce(&mut session, &mut sink),
            ControlFlow::Break(StopReason::EndOfStream)
        );
        assert!(sink.chunks.is_empty());
        assert_eq!(sink.eos_count, 1);
    }

    #[test]
    fn rejection_on_fifth_chunk_stops() {
        let mut p = producer(10 * 4096);
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::rejecting_at(5, FlowStatus::Flushing);

        let mut stops = Vec::new();
        for _ in 0..10 {
            if let ControlFlow::Break(reason) = p.produce(&mut session, &mut sink) {
                stops.push(reason);
                break;
            }
        }
        assert_eq!(stops, vec![StopReason::Rejected(FlowStatus::Flushing)]);
        assert_eq!(sink.attempts, 5);
        assert_eq!(p.chunks_pushed(), 5);
        assert_eq!(sink.eos_count, 0);
    }

    #[test]
    fn mono_chunks_carry_twice_the_frames() {
        let cfg = FeedConfig {
            channels: 1,
            ..FeedConfig::default()
        };
        let mut p = ChunkProducer::new(
            AudioSource::from_reader("mem", Cursor::new(vec![0u8; 8192])),
            cfg.chunk_bytes,
            AudioCaps::from_config(&cfg),
        );
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();
        assert!(p.produce(&mut session, &mut sink).is_continue());
        assert!(p.produce(&mut session, &mut sink).is_continue());
        assert_eq!(sink.chunks[1].offset(), 2048);
        assert_eq!(session.sample_count(), 4096);
    }

    #[test]
    fn read_error_stops_without_eos() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }
        let cfg = FeedConfig::default();
        let mut p = ChunkProducer::new(
            AudioSource::from_reader("broken", Broken),
            cfg.chunk_bytes,
            AudioCaps::from_config(&cfg),
        );
        let mut session = FeedSession::new();
        let mut sink = RecordingSink::accepting();
        match p.produce(&mut session, &mut sink) {
            ControlFlow::Break(StopReason::SourceError(msg)) => assert!(msg.contains("disk gone")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sink.eos_count, 0);
        assert_eq!(session.sample_count(), 0);
    }
}
