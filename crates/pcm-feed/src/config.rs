use anyhow::{Result, anyhow};

/// Bytes handed to the consumer per chunk.
pub const CHUNK_SIZE: usize = 4096;
/// Sample rate of the raw input, in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
/// Interleaved channel count of the raw input.
pub const CHANNELS: u16 = 2;
/// Queue capacity before the consumer signals `enough-data`.
pub const MAX_QUEUE_BYTES: usize = 200_000;

/// Feeding parameters shared by the producer, the app-source queue and playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedConfig {
    /// Bytes read from the source per chunk.
    pub chunk_bytes: usize,
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Input channel count (1 or 2).
    pub channels: u16,
    /// Queue level at which `enough-data` is signalled.
    pub max_queue_bytes: usize,
    /// Queue level at or below which `need-data` is signalled.
    pub min_queue_bytes: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Input frames per resampler call, used when the device runs at another rate.
    pub resample_chunk_frames: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: CHUNK_SIZE,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            max_queue_bytes: MAX_QUEUE_BYTES,
            min_queue_bytes: MAX_QUEUE_BYTES / 2,
            refill_max_frames: 4096,
            resample_chunk_frames: 1024,
        }
    }
}

impl FeedConfig {
    /// Bytes per interleaved frame (16-bit samples).
    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels as usize
    }

    /// Frames carried by a full chunk.
    pub fn frames_per_chunk(&self) -> u64 {
        (self.chunk_bytes / self.bytes_per_frame()) as u64
    }

    /// Reject combinations the feeding core cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(anyhow!("sample rate must be non-zero"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(anyhow!("unsupported channel count: {}", self.channels));
        }
        if self.chunk_bytes == 0 || self.chunk_bytes % self.bytes_per_frame() != 0 {
            return Err(anyhow!(
                "chunk size {} is not a whole number of {}-byte frames",
                self.chunk_bytes,
                self.bytes_per_frame()
            ));
        }
        if self.max_queue_bytes < self.chunk_bytes {
            return Err(anyhow!(
                "queue capacity {} is smaller than one chunk ({})",
                self.max_queue_bytes,
                self.chunk_bytes
            ));
        }
        if self.resample_chunk_frames == 0 {
            return Err(anyhow!("resample chunk must be at least one frame"));
        }
        if self.min_queue_bytes >= self.max_queue_bytes {
            return Err(anyhow!(
                "low watermark {} must be below capacity {}",
                self.min_queue_bytes,
                self.max_queue_bytes
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FeedConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bytes_per_frame(), 4);
        assert_eq!(cfg.frames_per_chunk(), 1024);
    }

    #[test]
    fn mono_halves_frame_size() {
        let cfg = FeedConfig {
            channels: 1,
            ..FeedConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.frames_per_chunk(), 2048);
    }

    #[test]
    fn validate_rejects_partial_frames() {
        let cfg = FeedConfig {
            chunk_bytes: 4094,
            ..FeedConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_channels_and_rate() {
        let cfg = FeedConfig {
            channels: 6,
            ..FeedConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = FeedConfig {
            sample_rate: 0,
            ..FeedConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_resample_chunk() {
        let cfg = FeedConfig {
            resample_chunk_frames: 0,
            ..FeedConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_watermarks() {
        let cfg = FeedConfig {
            min_queue_bytes: MAX_QUEUE_BYTES,
            ..FeedConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
