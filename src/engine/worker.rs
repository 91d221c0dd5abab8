use super::sampler::{self, EventBuf};
use super::state::{ExperimentState, Phase};
use super::CoreResult;
use crate::cores;
use crate::error::Error;
use crate::tsc;

/// Per-core worker thread body.
///
/// Order matters: bind first so the buffer allocation lands NUMA-local,
/// pre-touch before signaling started so no page fault can occur once the
/// pass is released, calibrate after the WAIT release (the cores are
/// already busy by then, so frequency scaling has settled to the loaded
/// state being measured).
///
/// Every exit path passes through all three barriers exactly once. A worker
/// that cannot bind or calibrate requests STOP so the doomed pass ends
/// quickly, but still arrives at each barrier so no sibling deadlocks.
pub fn run(core: usize, state: &ExperimentState) -> Result<CoreResult, Error> {
    let bound = cores::bind_to_core(core);
    let mut buf = EventBuf::with_capacity(state.capacity());

    state.arrive_started();
    state.await_go();

    let prepared = bound.and_then(|()| tsc::calibrate_mhz());
    if prepared.is_err() {
        state.request_stop();
    }

    match prepared {
        Ok(cpu_mhz) => {
            let threshold_cycles = tsc::cycles_for_ns(state.threshold_ns(), cpu_mhz);
            state.arrive_running();

            let mut clock = tsc::read;
            let frc_start = tsc::read();
            let int_total = sampler::sample(&mut clock, state, threshold_cycles, &mut buf);
            let frc_stop = tsc::read();

            state.arrive_finished();

            let capacity = buf.capacity();
            Ok(CoreResult {
                core,
                cpu_mhz,
                capacity,
                int_total,
                frc_start,
                frc_stop,
                events: buf.into_events(),
            })
        }
        Err(e) => {
            state.arrive_running();
            while state.phase() == Phase::Go {
                std::hint::spin_loop();
            }
            state.arrive_finished();
            Err(match e {
                Error::Calibration(msg) => Error::Calibration(format!("core {}: {}", core, msg)),
                other => other,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbindable_core_errors_and_stops_pass() {
        // One bit past the end of cpu_set_t is never settable, so the bind
        // fails no matter what the host's affinity mask looks like.
        let core = 8 * std::mem::size_of::<libc::cpu_set_t>();
        let state = ExperimentState::new(1, 1000, 16);
        state.set_phase(Phase::Go);

        // Must return rather than hang: the sole worker passes every
        // barrier itself, and the failed bind has already forced STOP.
        match run(core, &state) {
            Err(Error::Affinity(msg)) => assert!(msg.contains(&format!("core {}", core))),
            other => panic!("expected affinity error, got {:?}", other),
        }
        assert_eq!(state.phase(), Phase::Stop);
    }

    #[test]
    fn test_worker_measures_on_allowed_core() {
        let core = cores::affinity_cores().unwrap()[0];
        let state = ExperimentState::new(1, 1_000_000, 64);
        state.set_phase(Phase::Go);

        let result = std::thread::scope(|s| {
            let stopper = s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(200));
                state.request_stop();
            });
            let r = run(core, &state);
            stopper.join().unwrap();
            r
        })
        .unwrap();

        assert_eq!(result.core, core);
        assert!(result.cpu_mhz > 0);
        assert!(result.events.len() <= result.capacity);
        assert!(result.frc_stop >= result.frc_start);
        assert_eq!(
            result.int_total,
            result.events.iter().map(|e| e.gap).sum::<u64>()
        );
        assert_eq!(state.phase(), Phase::Stop);
    }
}
