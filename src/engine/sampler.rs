use super::state::{ExperimentState, Phase};

/// One recorded interruption: the counter reading at which it was detected
/// and the gap to the previous reading, both in this core's cycle units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptionEvent {
    pub ts: u64,
    pub gap: u64,
}

/// Fixed-capacity event arena. Append writes at the current length and
/// never grows; the backing memory is written once up front so no page
/// fault can land inside the sampling loop.
pub struct EventBuf {
    events: Vec<InterruptionEvent>,
    capacity: usize,
}

impl EventBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        // Fill then clear: touches every page while keeping the allocation.
        let mut events = vec![InterruptionEvent::default(); capacity];
        events.clear();
        Self { events, capacity }
    }

    #[inline(always)]
    pub fn push(&mut self, event: InterruptionEvent) {
        debug_assert!(self.events.len() < self.capacity);
        self.events.push(event);
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.events.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn into_events(self) -> Vec<InterruptionEvent> {
        self.events
    }
}

/// The measurement hot loop. Per iteration: one clock read, a subtraction,
/// a comparison, and a conditional store. Anything more would raise the
/// sampler's own floor of detectable gap size.
///
/// Runs until the shared phase leaves Go, or until the buffer fills, in
/// which case the worker itself ends the pass for every core. Returns the
/// cumulative interrupted-cycle total, which by construction equals the sum
/// of recorded gaps.
///
/// The clock is injected so tests can drive the loop with a deterministic
/// gap script; workers pass the hardware counter read.
#[inline]
pub fn sample(
    clock: &mut impl FnMut() -> u64,
    state: &ExperimentState,
    threshold_cycles: u64,
    buf: &mut EventBuf,
) -> u64 {
    let mut int_total: u64 = 0;
    let mut prev = clock();

    while state.phase() == Phase::Go {
        let ts = clock();
        let gap = ts.wrapping_sub(prev);
        prev = ts;
        if gap >= threshold_cycles {
            int_total += gap;
            buf.push(InterruptionEvent { ts, gap });
            if buf.is_full() {
                state.request_stop();
                break;
            }
        }
    }

    int_total
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock that replays a fixed gap sequence as cumulative timestamps,
    /// then flips the experiment to Stop once the script runs out.
    fn scripted_clock<'a>(
        gaps: Vec<u64>,
        start: u64,
        state: &'a ExperimentState,
    ) -> impl FnMut() -> u64 + 'a {
        let mut ts = start;
        let mut next = 0usize;
        move || {
            if next < gaps.len() {
                ts += gaps[next];
                next += 1;
            } else {
                state.request_stop();
            }
            ts
        }
    }

    fn go_state(threshold_ns: u32, capacity: usize) -> ExperimentState {
        let state = ExperimentState::new(1, threshold_ns, capacity);
        state.set_phase(Phase::Go);
        state
    }

    #[test]
    fn test_records_only_gaps_at_or_above_threshold() {
        let state = go_state(0, 100);
        let gaps = vec![10, 999, 1000, 1001, 50, 4000];
        let mut clock = scripted_clock(gaps, 5, &state);
        let mut buf = EventBuf::with_capacity(100);

        let total = sample(&mut clock, &state, 1000, &mut buf);

        let events = buf.into_events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.gap >= 1000));
        assert_eq!(
            events.iter().map(|e| e.gap).collect::<Vec<_>>(),
            vec![1000, 1001, 4000]
        );
        assert_eq!(total, 1000 + 1001 + 4000);
    }

    #[test]
    fn test_total_equals_sum_of_recorded_gaps() {
        let state = go_state(0, 1000);
        let gaps: Vec<u64> = (0..500).map(|i| (i * 37) % 3000).collect();
        let mut clock = scripted_clock(gaps, 0, &state);
        let mut buf = EventBuf::with_capacity(1000);

        let total = sample(&mut clock, &state, 1500, &mut buf);

        let events = buf.into_events();
        assert_eq!(total, events.iter().map(|e| e.gap).sum::<u64>());
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let state = go_state(0, 1000);
        let gaps: Vec<u64> = (0..300).map(|i| 500 + (i % 7) * 400).collect();
        let mut clock = scripted_clock(gaps, 123, &state);
        let mut buf = EventBuf::with_capacity(1000);

        sample(&mut clock, &state, 1000, &mut buf);

        let events = buf.into_events();
        assert!(!events.is_empty());
        assert!(events.windows(2).all(|w| w[0].ts <= w[1].ts));
    }

    #[test]
    fn test_overflow_stops_at_exactly_capacity() {
        let capacity = 5;
        let state = go_state(0, capacity);
        // Six over-threshold gaps scripted; only five may be recorded.
        let gaps = vec![2000; 6];
        let mut clock = scripted_clock(gaps, 0, &state);
        let mut buf = EventBuf::with_capacity(capacity);

        sample(&mut clock, &state, 1000, &mut buf);

        assert!(buf.is_full());
        assert_eq!(buf.len(), capacity);
        // The overflowing worker ends the pass itself.
        assert_eq!(state.phase(), Phase::Stop);
    }

    #[test]
    fn test_under_capacity_is_not_full() {
        let state = go_state(0, 10);
        let gaps = vec![2000; 4];
        let mut clock = scripted_clock(gaps, 0, &state);
        let mut buf = EventBuf::with_capacity(10);

        sample(&mut clock, &state, 1000, &mut buf);

        assert_eq!(buf.len(), 4);
        assert!(!buf.is_full());
    }

    #[test]
    fn test_quiet_core_records_nothing() {
        let state = go_state(0, 10);
        let gaps = vec![500; 200];
        let mut clock = scripted_clock(gaps, 0, &state);
        let mut buf = EventBuf::with_capacity(10);

        let total = sample(&mut clock, &state, 1000, &mut buf);

        assert_eq!(total, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_event_buf_pretouch_keeps_capacity() {
        let buf = EventBuf::with_capacity(1000);
        assert_eq!(buf.capacity(), 1000);
        assert!(buf.is_empty());
        assert!(buf.events.capacity() >= 1000);
    }

    #[test]
    fn test_event_buf_zero_capacity_is_immediately_full() {
        let buf = EventBuf::with_capacity(0);
        assert!(buf.is_full());
    }
}
