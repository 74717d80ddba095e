//! Streaming resample stage.
//!
//! Used when the output device cannot run at the stream rate. A background thread
//! drains the app-source queue, converts the `i16` frames to `f32`, runs them through
//! Rubato's sinc resampler and writes the result into a bounded [`ResampledQueue`]
//! that playback reads from.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::bus::BusSender;
use crate::playback::to_f32;
use crate::queue::{PopStrategy, StreamQueue};

#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input frames per resampler call.
    pub chunk_frames: usize,
    /// Capacity of the output queue, in frames.
    pub max_buffered_frames: usize,
}

/// Bounded queue of interleaved `f32` samples at the device rate.
pub struct ResampledQueue {
    channels: usize,
    rate: u32,
    inner: Mutex<ResampledInner>,
    cv: Condvar,
    max_samples: usize,
}

struct ResampledInner {
    samples: VecDeque<f32>,
    done: bool,
}

impl ResampledQueue {
    pub fn new(channels: usize, rate: u32, max_frames: usize) -> Self {
        Self {
            channels,
            rate,
            inner: Mutex::new(ResampledInner {
                samples: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_samples: max_frames.max(1) * channels,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// No more samples will be pushed. Wakes all waiters.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Push samples, blocking while the queue is full. Drops the rest once closed.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.max_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.done {
                return;
            }
            let room = self.max_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop up to `max_frames` frames.
    ///
    /// Blocking pops return `None` once the queue is closed and empty; non-blocking
    /// pops return `None` whenever nothing is buffered.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let max_frames = match strategy {
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.is_empty() && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
                }
                max_frames
            }
            PopStrategy::NonBlocking { max_frames } => max_frames,
        };
        let frames = (g.samples.len() / self.channels).min(max_frames);
        if frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Wait until the queue is closed and played out, or `timeout` passes.
    ///
    /// Returns `true` if it drained.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        loop {
            if g.done && g.samples.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            g = ng;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResampledInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Start a background resampler from `srcq`'s rate to `dst_rate`.
///
/// The thread ends when `srcq` is drained after end of stream or flushing, and then
/// closes the returned queue. Resampler failures are posted on `bus`.
pub fn start_resampler(
    srcq: Arc<StreamQueue>,
    dst_rate: u32,
    cfg: ResampleConfig,
    bus: BusSender,
) -> Result<(Arc<ResampledQueue>, JoinHandle<()>)> {
    let caps = srcq.caps();
    let channels = caps.channels as usize;
    let chunk_frames = cfg.chunk_frames.max(1);
    let dstq = Arc::new(ResampledQueue::new(
        channels,
        dst_rate,
        cfg.max_buffered_frames,
    ));
    let f_ratio = dst_rate as f64 / caps.rate as f64;
    tracing::info!(
        src_rate_hz = caps.rate,
        dst_rate_hz = dst_rate,
        chunk_frames,
        "resampling"
    );

    let dstq_thread = dstq.clone();
    let handle = thread::Builder::new()
        .name("pcm-resample".into())
        .spawn(move || {
            let result = ResampleStage::new(f_ratio, chunk_frames, channels)
                .and_then(|mut stage| stage.run(&srcq, &dstq_thread));
            if let Err(e) = result {
                tracing::error!("resampler error: {e:#}");
                bus.error("resample", format!("{e:#}"));
            }
            dstq_thread.close();
        })?;

    Ok((dstq, handle))
}

struct ResampleStage {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    chunk_frames: usize,
    out: Vec<f32>,
    indexing: Indexing,
}

impl ResampleStage {
    fn new(f_ratio: f64, chunk_frames: usize, channels: usize) -> Result<Self> {
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };
        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;
        // Headroom for the widest ratio the resampler allows, twice over.
        let widest = (chunk_frames as f64 * f_ratio * 1.1).ceil() as usize;
        let out_frames = widest.max(chunk_frames) * 2;

        Ok(Self {
            resampler: Box::new(resampler),
            channels,
            chunk_frames,
            out: vec![0.0; channels * out_frames],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    fn run(&mut self, srcq: &StreamQueue, dstq: &ResampledQueue) -> Result<()> {
        let chunk_samples = self.chunk_frames * self.channels;
        let mut pending: Vec<f32> = Vec::with_capacity(chunk_samples * 2);

        while let Some(block) = srcq.pop(PopStrategy::BlockingUpTo {
            max_frames: self.chunk_frames,
        }) {
            pending.extend(block.iter().map(|s| to_f32(*s)));
            while pending.len() >= chunk_samples {
                let produced = self.process(&pending[..chunk_samples], None)?;
                dstq.push_interleaved_blocking(produced);
                pending.drain(..chunk_samples);
            }
        }

        let tail_frames = pending.len() / self.channels;
        if tail_frames > 0 {
            // Rubato reads only `tail_frames`; the padding keeps the input full-sized.
            pending.resize(chunk_samples, 0.0);
            let produced = self.process(&pending, Some(tail_frames))?;
            dstq.push_interleaved_blocking(produced);
        }
        Ok(())
    }

    fn process(&mut self, input: &[f32], partial_len: Option<usize>) -> Result<&[f32]> {
        let input_adapter = InterleavedSlice::new(input, self.channels, self.chunk_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let out_capacity_frames = self.out.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = partial_len;

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;
        Ok(&self.out[..nbr_out * self.channels])
    }
}
