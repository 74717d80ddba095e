//! Stream capabilities advertised to the consumer before the first chunk.

use std::fmt;

use crate::config::FeedConfig;

/// Raw sample encoding. Only signed 16-bit little-endian is carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
        }
    }
}

/// How chunks are framed for the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Every chunk carries a presentation time and a duration.
    Time,
}

/// Fixed description of the stream a sink accepts.
///
/// A sink is constructed with its caps, so they are in place before any push and
/// there is no way to change them afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioCaps {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u16,
    pub framing: Framing,
}

impl AudioCaps {
    pub fn from_config(cfg: &FeedConfig) -> Self {
        Self {
            format: SampleFormat::S16Le,
            rate: cfg.sample_rate,
            channels: cfg.channels,
            framing: Framing::Time,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

impl fmt::Display for AudioCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = match self.format {
            SampleFormat::S16Le => "S16LE",
        };
        write!(
            f,
            "audio/x-raw, format={format}, layout=interleaved, rate={}, channels={}",
            self.rate, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_follow_config() {
        let caps = AudioCaps::from_config(&FeedConfig::default());
        assert_eq!(caps.rate, 44_100);
        assert_eq!(caps.channels, 2);
        assert_eq!(caps.bytes_per_frame(), 4);
        assert_eq!(caps.framing, Framing::Time);
    }

    #[test]
    fn caps_render_like_raw_audio_caps() {
        let caps = AudioCaps::from_config(&FeedConfig {
            channels: 1,
            ..FeedConfig::default()
        });
        assert_eq!(
            caps.to_string(),
            "audio/x-raw, format=S16LE, layout=interleaved, rate=44100, channels=1"
        );
    }
}
