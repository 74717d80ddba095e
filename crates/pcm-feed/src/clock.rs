//! Frame-count to stream-time conversion.
//!
//! Times are nanosecond counts scaled with a 128-bit intermediate, so a timestamp
//! computed from a running frame counter is exact (rounded down) no matter how many
//! chunks came before it.

use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// `value * num / denom`, rounded down, saturating at `u64::MAX`.
///
/// Returns `u64::MAX` when `denom` is zero.
pub fn scale(value: u64, num: u64, denom: u64) -> u64 {
    if denom == 0 {
        return u64::MAX;
    }
    let wide = u128::from(value) * u128::from(num) / u128::from(denom);
    u64::try_from(wide).unwrap_or(u64::MAX)
}

/// Stream time of frame `frames` at `rate` Hz.
pub fn frames_to_time(frames: u64, rate: u32) -> Duration {
    Duration::from_nanos(scale(frames, NANOS_PER_SEC, u64::from(rate)))
}

/// Milliseconds covered by `frames` at `rate` Hz.
pub fn frames_to_ms(frames: u64, rate: u32) -> u64 {
    scale(frames, 1000, u64::from(rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_chunk_of_stereo_frames() {
        let t = frames_to_time(1024, 44_100);
        assert_eq!(t.as_nanos(), 23_219_954);
    }

    #[test]
    fn scale_does_not_overflow_u64_intermediate() {
        let big = u64::MAX / 2;
        assert_eq!(scale(big, 2, 2), big);
        assert_eq!(scale(u64::MAX, u64::MAX, 1), u64::MAX);
        assert_eq!(scale(5, 1, 0), u64::MAX);
    }

    #[test]
    fn timestamps_from_counter_do_not_drift() {
        // Summing rounded per-chunk durations drifts; scaling the counter does not.
        let rate = 44_100;
        let per_chunk = 1024u64;
        let chunks = 1_000_000u64;
        let direct = frames_to_time(per_chunk * chunks, rate);
        let summed = frames_to_time(per_chunk, rate) * chunks as u32;
        assert_eq!(direct.as_nanos(), 23_219_954_648_526);
        assert!(summed < direct);
    }

    #[test]
    fn whole_second_is_exact() {
        assert_eq!(frames_to_time(44_100, 44_100), Duration::from_secs(1));
        assert_eq!(frames_to_ms(88_200, 44_100), 2000);
    }
}
