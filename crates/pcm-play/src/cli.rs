use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pcm-play", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Interleaved channel count of the input (1 or 2)
    #[arg(long)]
    pub channels: Option<u16>,

    /// Input sample rate in Hz; the device must support it exactly
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Bytes read per chunk (must be a whole number of frames)
    #[arg(long)]
    pub chunk_bytes: Option<usize>,

    /// Where the producer runs
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// TOML file with defaults; flags given here take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a raw S16LE interleaved PCM file
    Play {
        /// Path to the raw PCM file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Feed from idle work on the main loop
    Cooperative,
    /// Feed from a dedicated thread
    Threaded,
}

impl From<Mode> for pcm_feed::pipeline::FeedMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cooperative => Self::Cooperative,
            Mode::Threaded => Self::Threaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_overrides() {
        let args = Args::try_parse_from([
            "pcm-play",
            "--channels",
            "1",
            "--mode",
            "threaded",
            "play",
            "input.raw",
        ])
        .unwrap();
        assert_eq!(args.channels, Some(1));
        assert_eq!(args.mode, Some(Mode::Threaded));
        let Some(Command::Play { path }) = args.cmd else {
            panic!("expected play subcommand");
        };
        assert_eq!(path, PathBuf::from("input.raw"));
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["pcm-play", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Args::try_parse_from(["pcm-play", "--mode", "busy", "play", "x"]).is_err());
    }
}
