// [libs/core/keyspace/src/chunking.rs]
/*!
 * Keyspace-splitting arithmetic: given a total keyspace and a benchmark
 * rate, produce a sequence of `(skip, limit)` windows such that an agent
 * running at that rate finishes each chunk in approximately
 * `target_chunk_duration_secs`, with the final chunk allowed to deviate by
 * `fluctuation_percent` to avoid a tiny remainder chunk.
 */

use crate::errors::KeyspaceError;

/// A half-open `[skip, skip+limit)` word-position window, in wordlist-word units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub skip: u64,
    pub limit: u64,
}

impl ChunkWindow {
    pub fn end(&self) -> u64 {
        self.skip + self.limit
    }
}

/// Splits `total_keyspace` into sequential windows sized so that an agent
/// benchmarked at `benchmark_rate_per_sec` finishes one in roughly
/// `target_chunk_duration_secs`. The final window absorbs any remainder
/// that falls within `fluctuation_percent` of the target size; otherwise it
/// becomes its own (shorter) final chunk.
pub fn compute_chunk_windows(
    total_keyspace: u64,
    benchmark_rate_per_sec: u64,
    target_chunk_duration_secs: u64,
    fluctuation_percent: u8,
) -> Result<Vec<ChunkWindow>, KeyspaceError> {
    if total_keyspace == 0 {
        return Err(KeyspaceError::EmptyKeyspace);
    }
    if benchmark_rate_per_sec == 0 {
        return Err(KeyspaceError::ZeroBenchmarkRate);
    }

    let chunk_size = (benchmark_rate_per_sec.saturating_mul(target_chunk_duration_secs)).max(1);

    if chunk_size >= total_keyspace {
        return Ok(vec![ChunkWindow { skip: 0, limit: total_keyspace }]);
    }

    let full_chunks = total_keyspace / chunk_size;
    let remainder = total_keyspace % chunk_size;

    let mut windows = Vec::with_capacity(full_chunks as usize + 1);
    for i in 0..full_chunks {
        windows.push(ChunkWindow { skip: i * chunk_size, limit: chunk_size });
    }

    if remainder > 0 {
        let fluctuation_allowance = chunk_size.saturating_mul(fluctuation_percent as u64) / 100;
        if remainder <= fluctuation_allowance {
            // Absorb the remainder into the last chunk rather than spawn a sliver chunk.
            if let Some(last) = windows.last_mut() {
                last.limit += remainder;
            } else {
                windows.push(ChunkWindow { skip: 0, limit: remainder });
            }
        } else {
            windows.push(ChunkWindow { skip: full_chunks * chunk_size, limit: remainder });
        }
    }

    Ok(windows)
}

/// Re-derives windows for the *pending* tail of a job's chunk plan after a
/// cascade correction revises the effective multiplier. `already_covered`
/// is the sum of keyspace already claimed by assigned/running/completed
/// chunks and must not be re-split; the remaining span is re-windowed
/// against the new rate.
pub fn recompute_pending_tail(
    total_effective_keyspace: u64,
    already_covered: u64,
    benchmark_rate_per_sec: u64,
    target_chunk_duration_secs: u64,
    fluctuation_percent: u8,
) -> Result<Vec<ChunkWindow>, KeyspaceError> {
    let remaining = total_effective_keyspace.saturating_sub(already_covered);
    if remaining == 0 {
        return Ok(Vec::new());
    }

    let mut windows = compute_chunk_windows(
        remaining,
        benchmark_rate_per_sec,
        target_chunk_duration_secs,
        fluctuation_percent,
    )?;

    for window in &mut windows {
        window.skip += already_covered;
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_dictionary_ten_even_chunks() {
        // base=1,000,000 words, benchmark=100,000 H/s, target=1000s -> chunk_size=100,000.
        let windows = compute_chunk_windows(1_000_000, 100_000, 1000, 20).unwrap();
        assert_eq!(windows.len(), 10);
        assert_eq!(windows[0], ChunkWindow { skip: 0, limit: 100_000 });
        assert_eq!(windows[9], ChunkWindow { skip: 900_000, limit: 100_000 });
        assert_eq!(windows.iter().map(|w| w.limit).sum::<u64>(), 1_000_000);
    }

    #[test]
    fn small_remainder_absorbed_into_last_chunk() {
        // chunk_size=100_000, total=1_005_000 -> remainder 5_000 is 5% <= 20% fluctuation.
        let windows = compute_chunk_windows(1_005_000, 100_000, 1000, 20).unwrap();
        assert_eq!(windows.len(), 10);
        assert_eq!(windows.last().unwrap().limit, 105_000);
    }

    #[test]
    fn large_remainder_becomes_own_chunk() {
        // chunk_size=100_000, total=1_150_000 -> remainder 150_000 exceeds one chunk entirely.
        let windows = compute_chunk_windows(1_150_000, 100_000, 1000, 20).unwrap();
        assert_eq!(windows.len(), 12);
        assert_eq!(windows.iter().map(|w| w.limit).sum::<u64>(), 1_150_000);
    }

    #[test]
    fn single_chunk_when_keyspace_smaller_than_target() {
        let windows = compute_chunk_windows(500, 100_000, 1000, 20).unwrap();
        assert_eq!(windows, vec![ChunkWindow { skip: 0, limit: 500 }]);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(
            compute_chunk_windows(1000, 0, 1000, 20).unwrap_err(),
            KeyspaceError::ZeroBenchmarkRate
        );
    }

    #[test]
    fn cascade_recompute_skips_already_covered_span() {
        // Chunk 1 (0..100_000) already ran; effective keyspace revised down to 950_000.
        let windows = recompute_pending_tail(950_000, 100_000, 100_000, 1000, 20).unwrap();
        assert_eq!(windows.first().unwrap().skip, 100_000);
        let covered: u64 = windows.iter().map(|w| w.limit).sum();
        assert_eq!(covered, 850_000);
    }

    proptest::proptest! {
        #[test]
        fn windows_always_sum_to_total(total in 1u64..10_000_000, rate in 1u64..500_000, duration in 1u64..7200) {
            let windows = compute_chunk_windows(total, rate, duration, 20).unwrap();
            let sum: u64 = windows.iter().map(|w| w.limit).sum();
            proptest::prop_assert_eq!(sum, total);
        }
    }
}
