//! pcm-play: stream a raw S16LE PCM file to an output device.
//!
//! The file is read in fixed-size chunks that are timestamped from a running frame
//! counter and pushed into a bounded queue. The queue asks for data when it drains
//! and tells the producer to stop when it fills; the output callback pulls from it
//! without blocking.

mod cli;
mod config;
mod runtime;

use anyhow::{Result, anyhow};
use clap::Parser;
use pcm_feed::main_loop::{ExitReason, LoopChannels};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_feed=info,pcm_play=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let Some(cli::Command::Play { path }) = &args.cmd else {
        return Err(anyhow!("nothing to do; try `pcm-play play <path>`"));
    };

    let file = match &args.config {
        Some(p) => config::FileConfig::load(p)?,
        None => config::FileConfig::default(),
    };
    let play = config::resolve(&args, path.clone(), file)?;

    let channels = LoopChannels::new();
    let quit = channels.quit_handle();
    if let Err(e) = ctrlc::set_handler(move || quit.quit()) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    let report = runtime::run_play(play, channels)?;
    match &report.outcome.exit {
        ExitReason::Eos => tracing::info!(chunks = report.outcome.chunks, "playback finished"),
        ExitReason::Quit => tracing::info!("playback stopped"),
        ExitReason::Error { source, message } => {
            tracing::error!(source = %source, "playback failed: {message}");
            std::process::exit(1);
        }
    }
    Ok(())
}
