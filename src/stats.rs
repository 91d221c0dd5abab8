use crate::engine::sampler::InterruptionEvent;

/// Summary statistics over one core's recorded gaps, in that core's cycle
/// units. All fields are zero when no event was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub median: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub p9999: u64,
    pub p99999: u64,
}

/// Floor-rank index for percentile p over n sorted values. Deliberately no
/// interpolation and no rounding: changing this would change reported
/// numbers for identical input data.
fn rank(n: usize, p: f64) -> usize {
    (n as f64 * p) as usize
}

/// Reduces a frozen event sequence to summary statistics.
///
/// Pure and deterministic: the same input always produces the identical
/// output, and the input is never mutated (gaps are copied before sorting).
/// Ties between equal gaps need no ordering; only the values are consumed.
pub fn reduce(events: &[InterruptionEvent]) -> JitterStats {
    if events.is_empty() {
        return JitterStats::default();
    }

    let mut gaps: Vec<u64> = events.iter().map(|e| e.gap).collect();
    gaps.sort_unstable();
    let n = gaps.len();
    let sum: u64 = gaps.iter().sum();

    JitterStats {
        count: n as u64,
        min: gaps[0],
        max: gaps[n - 1],
        mean: sum / n as u64,
        median: gaps[n / 2],
        p90: gaps[rank(n, 0.9)],
        p99: gaps[rank(n, 0.99)],
        p999: gaps[rank(n, 0.999)],
        p9999: gaps[rank(n, 0.9999)],
        p99999: gaps[rank(n, 0.99999)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_from_gaps(gaps: &[u64]) -> Vec<InterruptionEvent> {
        let mut ts = 0;
        gaps.iter()
            .map(|&gap| {
                ts += gap;
                InterruptionEvent { ts, gap }
            })
            .collect()
    }

    #[test]
    fn test_zero_events_all_zero() {
        let stats = reduce(&[]);
        assert_eq!(stats, JitterStats::default());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0);
        assert_eq!(stats.p99999, 0);
    }

    #[test]
    fn test_single_event() {
        let stats = reduce(&events_from_gaps(&[42]));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.min, 42);
        assert_eq!(stats.max, 42);
        assert_eq!(stats.mean, 42);
        assert_eq!(stats.median, 42);
        assert_eq!(stats.p99999, 42);
    }

    #[test]
    fn test_percentiles_are_floor_rank_n100() {
        // Gaps 1..=100; sorted[i] == i + 1.
        let gaps: Vec<u64> = (1..=100).collect();
        let stats = reduce(&events_from_gaps(&gaps));
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 100);
        // median = sorted[100 / 2] = sorted[50]
        assert_eq!(stats.median, 51);
        // p90 = sorted[(100 * 0.9) as usize] = sorted[90]
        assert_eq!(stats.p90, 91);
        // p99 = sorted[99], the last element
        assert_eq!(stats.p99, 100);
        assert_eq!(stats.p999, 100);
        assert_eq!(stats.p9999, 100);
        assert_eq!(stats.p99999, 100);
        // Integer mean of 1..=100 truncates: 5050 / 100
        assert_eq!(stats.mean, 50);
    }

    #[test]
    fn test_percentiles_are_floor_rank_n37() {
        // Non-round n: floor truncation must match exactly.
        let gaps: Vec<u64> = (1..=37).map(|i| i * 10).collect();
        let stats = reduce(&events_from_gaps(&gaps));
        // (37 * 0.5) path is median = sorted[37 / 2] = sorted[18]
        assert_eq!(stats.median, 190);
        // (37 * 0.9) = 33.3 -> sorted[33]
        assert_eq!(stats.p90, 340);
        // (37 * 0.99) = 36.63 -> sorted[36]
        assert_eq!(stats.p99, 370);
        assert_eq!(stats.p999, 370);
    }

    #[test]
    fn test_input_order_is_immaterial() {
        let ascending = reduce(&events_from_gaps(&[10, 20, 30, 40, 50]));
        let shuffled = reduce(&events_from_gaps(&[40, 10, 50, 30, 20]));
        assert_eq!(ascending.min, shuffled.min);
        assert_eq!(ascending.max, shuffled.max);
        assert_eq!(ascending.median, shuffled.median);
        assert_eq!(ascending.mean, shuffled.mean);
    }

    #[test]
    fn test_idempotent() {
        let events = events_from_gaps(&[3, 1, 4, 1, 5, 9, 2, 6]);
        let first = reduce(&events);
        let second = reduce(&events);
        assert_eq!(first, second);
    }

    #[test]
    fn test_does_not_mutate_input() {
        let events = events_from_gaps(&[9, 1, 5]);
        let copy = events.clone();
        reduce(&events);
        assert_eq!(events, copy);
    }

    #[test]
    fn test_mean_is_integer_division() {
        let stats = reduce(&events_from_gaps(&[1, 2]));
        assert_eq!(stats.mean, 1); // 3 / 2 truncates
    }

    #[test]
    fn test_randomized_invariants() {
        use rand_chacha::ChaCha20Rng;
        use rand_core::{RngCore, SeedableRng};

        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let gaps: Vec<u64> = (0..10_000).map(|_| rng.next_u64() % 1_000_000).collect();
        let events = events_from_gaps(&gaps);

        let stats = reduce(&events);
        assert_eq!(stats.count, 10_000);
        assert!(stats.min <= stats.median);
        assert!(stats.median <= stats.p90);
        assert!(stats.p90 <= stats.p99);
        assert!(stats.p99 <= stats.p999);
        assert!(stats.p999 <= stats.p9999);
        assert!(stats.p9999 <= stats.p99999);
        assert!(stats.p99999 <= stats.max);
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);

        // Deterministic across invocations on the frozen input.
        assert_eq!(stats, reduce(&events));
    }
}
