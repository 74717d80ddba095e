//! Runtime helpers: device enumeration and local playback.

use anyhow::Result;
use cpal::traits::DeviceTrait;
use pcm_feed::main_loop::LoopChannels;
use pcm_feed::{device, pipeline};

use crate::config::PlayConfig;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Play the configured file until it ends, fails, or `channels` is told to quit.
pub fn run_play(config: PlayConfig, channels: LoopChannels) -> Result<pipeline::PlayReport> {
    let host = cpal::default_host();
    let device_name = normalize_device_name(config.device);
    let device = device::pick_device(&host, device_name.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");
    tracing::info!(
        path = ?config.path,
        channels = config.feed.channels,
        rate_hz = config.feed.sample_rate,
        chunk_bytes = config.feed.chunk_bytes,
        "source (raw pcm)"
    );
    pipeline::play_file(&device, &config.path, &config.feed, config.mode, channels)
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
