//! Output stage (CPAL stream fed from the app-source queue or the resampler).
//!
//! The callback:
//! - refills a small local buffer from its [`OutputSource`] without blocking
//! - maps mono/stereo input onto the device channel count
//! - converts samples to the device sample format
//!
//! Underruns are filled with silence and counted. Stream errors go to the bus.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::bus::BusSender;
use crate::queue::{PopStrategy, StreamQueue};
use crate::resample::ResampledQueue;
use crate::status::FeedCounters;

/// Interleaved `f32` frames the output callback can pull without blocking.
pub trait OutputSource: Send + Sync + 'static {
    fn channels(&self) -> usize;
    fn rate(&self) -> u32;
    /// Up to `max_frames` frames, or `None` if nothing is buffered right now.
    fn pop_now(&self, max_frames: usize) -> Option<Vec<f32>>;
    /// Nothing more will arrive, so an empty pop is not an underrun.
    fn is_finished(&self) -> bool;
}

impl OutputSource for StreamQueue {
    fn channels(&self) -> usize {
        self.caps().channels as usize
    }

    fn rate(&self) -> u32 {
        self.caps().rate
    }

    fn pop_now(&self, max_frames: usize) -> Option<Vec<f32>> {
        self.pop(PopStrategy::NonBlocking { max_frames })
            .map(|v| v.into_iter().map(to_f32).collect())
    }

    fn is_finished(&self) -> bool {
        self.is_eos()
    }
}

impl OutputSource for ResampledQueue {
    fn channels(&self) -> usize {
        ResampledQueue::channels(self)
    }

    fn rate(&self) -> u32 {
        ResampledQueue::rate(self)
    }

    fn pop_now(&self, max_frames: usize) -> Option<Vec<f32>> {
        self.pop(PopStrategy::NonBlocking { max_frames })
    }

    fn is_finished(&self) -> bool {
        self.is_done()
    }
}

/// Build a CPAL output stream that plays `source`.
///
/// The stream config must run at the source's sample rate.
pub fn build_output_stream<Q: OutputSource>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    source: &Arc<Q>,
    refill_max_frames: usize,
    counters: Arc<FeedCounters>,
    bus: BusSender,
) -> Result<cpal::Stream> {
    if config.sample_rate != source.rate() {
        return Err(anyhow!(
            "output runs at {} Hz but the source is {} Hz",
            config.sample_rate,
            source.rate()
        ));
    }
    let cfg = CallbackConfig {
        refill_max_frames: refill_max_frames.max(1),
        counters,
        bus,
    };
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32, Q>(device, config, source, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16, Q>(device, config, source, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32, Q>(device, config, source, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16, Q>(device, config, source, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

struct CallbackConfig {
    refill_max_frames: usize,
    counters: Arc<FeedCounters>,
    bus: BusSender,
}

fn build_stream<T, Q>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source: &Arc<Q>,
    cfg: CallbackConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    Q: OutputSource,
{
    let channels_out = config.channels as usize;
    let mut st = LocalBuffer {
        pos: 0,
        src_channels: source.channels(),
        src: Vec::new(),
    };

    let source_cb = source.clone();
    let counters = cfg.counters;
    let refill_max_frames = cfg.refill_max_frames;
    let bus = cfg.bus;
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        bus.error("playback", err.to_string());
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match source_cb.pop_now(refill_max_frames) {
                        Some(v) => st.src = v,
                        None => {
                            if !source_cb.is_finished() {
                                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                                counters
                                    .underrun_frames
                                    .fetch_add((frames - frame) as u64, Ordering::Relaxed);
                            }
                            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            data[frame * channels_out..].fill(silence);
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = next_sample_mapped(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Samples fetched from the queue but not yet written to the device.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

pub(crate) fn to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

/// Read one output sample for `dst_ch`.
///
/// mono to stereo duplicates, stereo to mono averages, anything wider takes the
/// nearest source channel. `st.pos` advances after the last destination channel.
fn next_sample_mapped(st: &mut LocalBuffer, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get = |ch: usize, st: &LocalBuffer| -> f32 {
        st.src
            .get(frame_start + ch)
            .filter(|_| ch < st.src_channels)
            .copied()
            .unwrap_or(0.0)
    };

    let out = match (st.src_channels, dst_channels) {
        (2, 1) => 0.5 * (get(0, st) + get(1, st)),
        (1, _) => get(0, st),
        _ => get(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
