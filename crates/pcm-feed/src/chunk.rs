use std::time::Duration;

use crate::clock;

/// One timestamped unit of raw interleaved audio handed to the consumer.
///
/// Built right before it is pushed; the producer gives up ownership on push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioChunk {
    payload: Vec<u8>,
    offset: u64,
    frames: u64,
    pts: Duration,
    duration: Duration,
}

impl AudioChunk {
    /// Wrap `payload` starting at frame `offset` of the stream.
    ///
    /// `payload.len()` must be a whole number of `bytes_per_frame` frames.
    pub fn new(payload: Vec<u8>, offset: u64, bytes_per_frame: usize, rate: u32) -> Self {
        let frames = (payload.len() / bytes_per_frame.max(1)) as u64;
        Self {
            pts: clock::frames_to_time(offset, rate),
            duration: clock::frames_to_time(frames, rate),
            payload,
            offset,
            frames,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Stream frame index of the first frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Presentation time of the first frame, relative to stream start.
    pub fn pts(&self) -> Duration {
        self.pts
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_from_offset_and_length() {
        let chunk = AudioChunk::new(vec![0; 4096], 1024, 4, 44_100);
        assert_eq!(chunk.frames(), 1024);
        assert_eq!(chunk.pts().as_nanos(), 23_219_954);
        assert_eq!(chunk.duration(), chunk.pts());
    }

    #[test]
    fn partial_chunk_duration_tracks_its_frames() {
        let chunk = AudioChunk::new(vec![0; 400], 0, 4, 44_100);
        assert_eq!(chunk.frames(), 100);
        assert_eq!(chunk.pts(), Duration::ZERO);
        assert_eq!(chunk.duration(), clock::frames_to_time(100, 44_100));
    }
}
