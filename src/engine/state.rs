use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

/// Run phase, driven by the orchestrator and read by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Wait = 0,
    Go = 1,
    Stop = 2,
}

/// Shared coordination state for one measurement pass.
///
/// Configuration fields are written once before any worker starts and never
/// mutate afterwards; only the phase and the three counters change during a
/// run, via atomic store or increment. None of the waits below touch a
/// blocking primitive: mutex contention and condvar wakeups are themselves
/// scheduling interactions that would contaminate the measurement. The
/// atomics are for visibility only; exclusive buffer ownership plus the
/// final join() provide the happens-before for reading results.
pub struct ExperimentState {
    threshold_ns: u32,
    capacity: usize,
    n_workers: u32,

    phase: AtomicU8,
    started: AtomicU32,
    running: AtomicU32,
    finished: AtomicU32,
}

impl ExperimentState {
    pub fn new(n_workers: usize, threshold_ns: u32, capacity: usize) -> Self {
        Self {
            threshold_ns,
            capacity,
            n_workers: n_workers as u32,
            phase: AtomicU8::new(Phase::Wait as u8),
            started: AtomicU32::new(0),
            running: AtomicU32::new(0),
            finished: AtomicU32::new(0),
        }
    }

    pub fn threshold_ns(&self) -> u32 {
        self.threshold_ns
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn n_workers(&self) -> u32 {
        self.n_workers
    }

    #[inline(always)]
    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            0 => Phase::Wait,
            1 => Phase::Go,
            _ => Phase::Stop,
        }
    }

    /// Orchestrator-side phase transition.
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Worker-side early termination: a full buffer or a doomed worker ends
    /// the pass for every core. Storing Stop is idempotent.
    pub fn request_stop(&self) {
        self.phase.store(Phase::Stop as u8, Ordering::Release);
    }

    /// First-stage arrival: the worker is bound to its core and its buffer
    /// is pre-touched.
    pub fn arrive_started(&self) {
        self.started.fetch_add(1, Ordering::AcqRel);
    }

    pub fn all_started(&self) -> bool {
        self.started.load(Ordering::Acquire) == self.n_workers
    }

    /// Polls with a coarse sleep until the orchestrator releases the pass.
    /// No timing is active yet, so sleeping here is free.
    pub fn await_go(&self) {
        while self.phase() == Phase::Wait {
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Second-stage barrier: no worker leaves until every worker has
    /// arrived, so all cores start sampling within a bounded skew. Time is
    /// already being measured, so this spin never sleeps or yields.
    pub fn arrive_running(&self) {
        self.running.fetch_add(1, Ordering::AcqRel);
        while self.running.load(Ordering::Acquire) != self.n_workers {
            std::hint::spin_loop();
        }
    }

    pub fn running_count(&self) -> u32 {
        self.running.load(Ordering::Acquire)
    }

    /// Exit barrier: no worker returns from its thread body until every
    /// worker has stopped sampling, so one thread's exit bookkeeping cannot
    /// disturb a sibling still finishing up.
    pub fn arrive_finished(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
        while self.finished.load(Ordering::Acquire) != self.n_workers {
            std::hint::spin_loop();
        }
    }
}
