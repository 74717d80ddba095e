//! Pipeline wiring: app-source queue + feeding side + output stream.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::bus::BusSender;
use crate::caps::AudioCaps;
use crate::config::FeedConfig;
use crate::device;
use crate::gate::{self, FeedGate};
use crate::main_loop::{ExitReason, LoopChannels, MainLoop, RunOutcome};
use crate::playback;
use crate::producer::ChunkProducer;
use crate::queue::StreamQueue;
use crate::resample::{self, ResampleConfig};
use crate::sink::{ChunkSink, FeedSignals};
use crate::source::AudioSource;
use crate::status::{FeedCounters, FeedStatus};

/// Where the producer runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FeedMode {
    /// On the loop thread, scheduled as idle work.
    #[default]
    Cooperative,
    /// On a dedicated feeder thread parked behind a [`FeedGate`].
    Threaded,
}

/// Feeding side of a pipeline: the queue, the channels it reports on, and the
/// signal target matching the chosen mode.
pub struct FeedPipeline {
    mode: FeedMode,
    queue: Arc<StreamQueue>,
    channels: LoopChannels,
    gate: Option<Arc<FeedGate>>,
}

impl FeedPipeline {
    pub fn new(cfg: &FeedConfig, mode: FeedMode, channels: LoopChannels) -> Self {
        let gate = match mode {
            FeedMode::Cooperative => None,
            FeedMode::Threaded => Some(Arc::new(FeedGate::new())),
        };
        let signals: Arc<dyn FeedSignals> = match &gate {
            Some(gate) => gate.clone(),
            None => Arc::new(channels.signals()),
        };
        let queue = Arc::new(StreamQueue::new(
            AudioCaps::from_config(cfg),
            cfg.max_queue_bytes,
            cfg.min_queue_bytes,
            signals,
            channels.bus(),
        ));
        Self {
            mode,
            queue,
            channels,
            gate,
        }
    }

    pub fn queue(&self) -> &Arc<StreamQueue> {
        &self.queue
    }

    pub fn bus(&self) -> BusSender {
        self.channels.bus()
    }

    /// Feed `producer` into the queue until end of stream, an error, or quit.
    pub fn run<R>(self, producer: ChunkProducer<R>) -> Result<RunOutcome>
    where
        R: Read + Send + 'static,
    {
        let FeedPipeline {
            mode,
            queue,
            channels,
            gate,
        } = self;
        let accepts = ChunkSink::caps(&queue);
        ensure!(
            producer.caps() == accepts,
            "producer emits {} but the queue accepts {accepts}",
            producer.caps()
        );
        tracing::info!(mode = ?mode, caps = %queue.caps(), "feeding");

        match gate {
            None => {
                let mut main_loop = MainLoop::new(channels, producer, queue.clone());
                queue.start();
                Ok(main_loop.run())
            }
            Some(gate) => {
                let feeder =
                    gate::spawn_feeder(gate.clone(), producer, queue.clone(), channels.bus())?;
                queue.start();
                let exit = channels.wait_for_exit();
                gate.close();
                let done = feeder
                    .join()
                    .map_err(|_| anyhow!("feeder thread panicked"))?;
                tracing::debug!(reason = ?done.reason, "feeder joined");
                Ok(RunOutcome {
                    exit,
                    frames: done.session.sample_count(),
                    chunks: done.producer.chunks_pushed(),
                })
            }
        }
    }
}

/// Result of playing one file.
#[derive(Debug)]
pub struct PlayReport {
    pub outcome: RunOutcome,
    pub status: FeedStatus,
}

/// Stream the raw PCM file at `path` to `device` until it ends, fails, or the quit
/// handle of `channels` fires.
pub fn play_file(
    device: &cpal::Device,
    path: &Path,
    cfg: &FeedConfig,
    mode: FeedMode,
    channels: LoopChannels,
) -> Result<PlayReport> {
    cfg.validate()?;
    let caps = AudioCaps::from_config(cfg);

    let config = device::pick_output_config(device, caps.rate, caps.channels)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %device.description()?,
        channels = stream_config.channels,
        output_rate_hz = stream_config.sample_rate,
        buffer_size = ?stream_config.buffer_size,
        "device output config"
    );

    let source = AudioSource::open(path)?;
    let producer = ChunkProducer::new(source, cfg.chunk_bytes, caps);

    let pipeline = FeedPipeline::new(cfg, mode, channels);
    let queue = pipeline.queue().clone();
    let counters = FeedCounters::shared();
    let resampler = if stream_config.sample_rate != caps.rate {
        let rc = ResampleConfig {
            chunk_frames: cfg.resample_chunk_frames,
            max_buffered_frames: (stream_config.sample_rate / 2) as usize,
        };
        Some(resample::start_resampler(
            queue.clone(),
            stream_config.sample_rate,
            rc,
            pipeline.bus(),
        )?)
    } else {
        None
    };
    let stream = match &resampler {
        Some((resampled, _)) => playback::build_output_stream(
            device,
            &stream_config,
            config.sample_format(),
            resampled,
            cfg.refill_max_frames,
            counters.clone(),
            pipeline.bus(),
        )?,
        None => playback::build_output_stream(
            device,
            &stream_config,
            config.sample_format(),
            &queue,
            cfg.refill_max_frames,
            counters.clone(),
            pipeline.bus(),
        )?,
    };
    stream.play()?;

    let outcome = pipeline.run(producer)?;

    if let Some((resampled, handle)) = resampler {
        // End of stream only means the resampler drained the queue.
        if matches!(outcome.exit, ExitReason::Eos)
            && !resampled.wait_until_drained(Duration::from_secs(2))
        {
            tracing::warn!("resampled tail still buffered at shutdown");
        }
        queue.set_flushing(true);
        resampled.close();
        handle
            .join()
            .map_err(|_| anyhow!("resampler thread panicked"))?;
    }

    // Let the device play out its last buffer before the stream is dropped.
    thread::sleep(Duration::from_millis(100));
    drop(stream);

    let status = FeedStatus {
        sample_rate: caps.rate,
        frames_fed: outcome.frames,
        chunks_fed: outcome.chunks,
        played_frames: queue.played_frames(),
        position: queue.position(),
        queued_bytes: queue.level_bytes(),
        ..FeedStatus::default()
    }
    .with_counters(&counters);
    status.log();

    Ok(PlayReport { outcome, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PopStrategy;
    use std::io::Cursor;

    fn small_config() -> FeedConfig {
        FeedConfig {
            max_queue_bytes: 4 * 4096,
            min_queue_bytes: 2 * 4096,
            ..FeedConfig::default()
        }
    }

    fn producer(cfg: &FeedConfig, bytes: usize) -> ChunkProducer<Cursor<Vec<u8>>> {
        let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
        ChunkProducer::new(
            AudioSource::from_reader("mem", Cursor::new(data)),
            cfg.chunk_bytes,
            AudioCaps::from_config(cfg),
        )
    }

    /// Drain the queue like an output device would, returning every sample played.
    fn spawn_drain(queue: Arc<StreamQueue>) -> thread::JoinHandle<Vec<i16>> {
        thread::spawn(move || {
            let mut played = Vec::new();
            while let Some(v) = queue.pop(PopStrategy::BlockingUpTo { max_frames: 300 }) {
                played.extend(v);
            }
            played
        })
    }

    fn expected_samples(bytes: usize) -> Vec<i16> {
        let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
        data.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn cooperative_run_plays_whole_file_in_order() {
        let cfg = small_config();
        let bytes = 40 * 4096 + 100;
        let pipeline = FeedPipeline::new(&cfg, FeedMode::Cooperative, LoopChannels::new());
        let drain = spawn_drain(pipeline.queue().clone());

        let outcome = pipeline.run(producer(&cfg, bytes)).unwrap();
        let played = drain.join().unwrap();

        assert_eq!(outcome.exit, ExitReason::Eos);
        assert_eq!(outcome.chunks, 41);
        assert_eq!(outcome.frames, 40 * 1024 + 25);
        assert_eq!(played, expected_samples(bytes));
    }

    #[test]
    fn threaded_run_plays_whole_file_in_order() {
        let cfg = small_config();
        let bytes = 25 * 4096;
        let pipeline = FeedPipeline::new(&cfg, FeedMode::Threaded, LoopChannels::new());
        let drain = spawn_drain(pipeline.queue().clone());

        let outcome = pipeline.run(producer(&cfg, bytes)).unwrap();
        let played = drain.join().unwrap();

        assert_eq!(outcome.exit, ExitReason::Eos);
        assert_eq!(outcome.chunks, 25);
        assert_eq!(outcome.frames, 25 * 1024);
        assert_eq!(played, expected_samples(bytes));
    }

    #[test]
    fn queue_never_grows_far_past_capacity() {
        let cfg = small_config();
        let pipeline = FeedPipeline::new(&cfg, FeedMode::Cooperative, LoopChannels::new());
        let queue = pipeline.queue().clone();
        let bus = pipeline.bus();
        let watcher = thread::spawn(move || {
            let mut peak = 0;
            for _ in 0..50 {
                peak = peak.max(queue.level_bytes());
                thread::sleep(Duration::from_millis(1));
            }
            bus.error("test", "stop");
            peak
        });

        let outcome = pipeline.run(producer(&cfg, 1000 * 4096)).unwrap();
        let peak = watcher.join().unwrap();
        assert!(outcome.is_error());
        // Nothing drains, so feeding stops right after the queue fills.
        assert_eq!(outcome.chunks, 4);
        assert!(peak <= cfg.max_queue_bytes);
    }

    #[test]
    fn run_refuses_producer_with_other_caps() {
        let cfg = small_config();
        let mono = FeedConfig {
            channels: 1,
            ..small_config()
        };
        let pipeline = FeedPipeline::new(&cfg, FeedMode::Cooperative, LoopChannels::new());
        let err = pipeline.run(producer(&mono, 4096)).unwrap_err();
        assert!(err.to_string().contains("queue accepts"), "{err}");
    }

    #[test]
    fn quit_ends_threaded_run() {
        let cfg = small_config();
        let channels = LoopChannels::new();
        let quit = channels.quit_handle();
        let pipeline = FeedPipeline::new(&cfg, FeedMode::Threaded, channels);
        quit.quit();
        let outcome = pipeline.run(producer(&cfg, 1000 * 4096)).unwrap();
        assert_eq!(outcome.exit, ExitReason::Quit);
    }
}
