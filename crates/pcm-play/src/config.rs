//! Configuration loading and merging.
//!
//! Values come from built-in defaults, then an optional TOML file, then CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pcm_feed::config::FeedConfig;
use pcm_feed::pipeline::FeedMode;
use serde::Deserialize;

use crate::cli::{Args, Mode};

/// Config file schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Output device substring.
    pub device: Option<String>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    pub chunk_bytes: Option<usize>,
    /// `"cooperative"` or `"threaded"`.
    pub mode: Option<FileMode>,
    pub max_queue_bytes: Option<usize>,
    /// Defaults to half of `max_queue_bytes`.
    pub min_queue_bytes: Option<usize>,
    pub refill_max_frames: Option<usize>,
    /// Resampler input block, used only when the device rate differs.
    pub resample_chunk_frames: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    Cooperative,
    Threaded,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<FileConfig>(raw)?)
    }
}

/// Fully resolved settings for one `play` run.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub mode: FeedMode,
    pub feed: FeedConfig,
}

/// Merge `file` and `args` over the defaults and validate the result.
pub fn resolve(args: &Args, path: PathBuf, file: FileConfig) -> Result<PlayConfig> {
    let defaults = FeedConfig::default();
    let max_queue_bytes = file.max_queue_bytes.unwrap_or(defaults.max_queue_bytes);
    let feed = FeedConfig {
        chunk_bytes: args
            .chunk_bytes
            .or(file.chunk_bytes)
            .unwrap_or(defaults.chunk_bytes),
        sample_rate: args
            .sample_rate
            .or(file.sample_rate)
            .unwrap_or(defaults.sample_rate),
        channels: args.channels.or(file.channels).unwrap_or(defaults.channels),
        max_queue_bytes,
        min_queue_bytes: file.min_queue_bytes.unwrap_or(max_queue_bytes / 2),
        refill_max_frames: file
            .refill_max_frames
            .unwrap_or(defaults.refill_max_frames),
        resample_chunk_frames: file
            .resample_chunk_frames
            .unwrap_or(defaults.resample_chunk_frames),
    };
    feed.validate().context("invalid feed settings")?;

    let mode = match (args.mode, file.mode) {
        (Some(Mode::Threaded), _) | (None, Some(FileMode::Threaded)) => FeedMode::Threaded,
        _ => FeedMode::Cooperative,
    };

    Ok(PlayConfig {
        path,
        device: args.device.clone().or(file.device),
        mode,
        feed,
    })
}
