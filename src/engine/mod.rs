pub mod sampler;
pub mod state;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Error;
use sampler::InterruptionEvent;
use state::{ExperimentState, Phase};

/// Length of the preliminary pass used only to estimate event rates.
const CALIBRATION_PASS_SECS: u32 = 1;

/// Rate floor for the capacity planner: with few events per second the
/// observed rate has high variance, so never plan below this.
const MIN_EVENTS_PER_SEC: usize = 1000;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Fixed configuration for a full experiment (both passes).
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Gap threshold in nanoseconds; each worker converts it to its own
    /// cycle units after calibrating.
    pub threshold_ns: u32,
    /// Real-run length in seconds.
    pub runtime_secs: u32,
    /// Event capacity of the calibration pass; the real run's capacity
    /// comes from the planner.
    pub max_events: usize,
    /// Core the orchestrator pins itself to.
    pub reference_core: usize,
}

/// Everything one core produced in a pass. Owned by its worker while the
/// pass runs; read-only once the worker has rejoined.
#[derive(Debug)]
pub struct CoreResult {
    pub core: usize,
    pub cpu_mhz: u32,
    pub events: Vec<InterruptionEvent>,
    pub capacity: usize,
    pub int_total: u64,
    pub frc_start: u64,
    pub frc_stop: u64,
}

impl CoreResult {
    pub fn runtime_cycles(&self) -> u64 {
        self.frc_stop.wrapping_sub(self.frc_start)
    }

    /// The buffer filled before the pass ended; recorded events are a
    /// truncated, threshold-biased sample of the true distribution.
    pub fn overflowed(&self) -> bool {
        self.events.len() == self.capacity
    }

    pub fn cycles_to_ns(&self, cycles: u64) -> u64 {
        cycles * 1000 / self.cpu_mhz as u64
    }

    pub fn cycles_to_us(&self, cycles: u64) -> u64 {
        cycles / self.cpu_mhz as u64
    }

    pub fn cycles_to_secs(&self, cycles: u64) -> f64 {
        cycles as f64 / (self.cpu_mhz as f64 * 1e6)
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = signal_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Sizes the real run's per-core buffers from a calibration pass: twice the
/// highest observed per-core event rate, floored, times the real runtime.
/// The rate comes from each core's measured counter window, not the nominal
/// pass length: a full buffer or an interrupt ends the pass early, and
/// dividing a truncated count by the full length would under-size the real
/// run, which would then overflow in turn.
fn plan_capacity(calibration: &[CoreResult], runtime_secs: u32) -> usize {
    let per_sec = calibration
        .iter()
        .map(|r| {
            let secs = r.cycles_to_secs(r.runtime_cycles());
            if secs > 0.0 {
                (r.events.len() as f64 / secs) as usize
            } else {
                0
            }
        })
        .max()
        .unwrap_or(0)
        .max(MIN_EVENTS_PER_SEC);
    per_sec * 2 * runtime_secs as usize
}

/// Arms the deadline for a pass: coarse 250ms sleeps, ending early if a
/// worker already stopped the pass (buffer full, doomed worker) or a
/// shutdown signal arrived. The orchestrator is the only sleeper; workers
/// never block while the pass runs.
fn await_deadline(state: &ExperimentState, secs: u32) {
    let deadline = Instant::now() + Duration::from_secs(secs as u64);
    let step = Duration::from_millis(250);
    loop {
        if state.phase() == Phase::Stop || shutdown_requested() {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
}

/// Drives one WAIT -> GO -> STOP pass over the given cores and hands back
/// every core's frozen results. Any worker error aborts the whole pass.
fn run_pass(
    cores: &[usize],
    threshold_ns: u32,
    secs: u32,
    capacity: usize,
) -> Result<Vec<CoreResult>, Error> {
    let state = Arc::new(ExperimentState::new(cores.len(), threshold_ns, capacity));

    let mut handles = Vec::with_capacity(cores.len());
    for &core in cores {
        let state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name(format!("sampler-{}", core))
            .spawn(move || worker::run(core, &state))?;
        handles.push(handle);
    }

    while !state.all_started() {
        thread::sleep(Duration::from_millis(1));
    }
    state.set_phase(Phase::Go);

    await_deadline(&state, secs);
    state.set_phase(Phase::Stop);

    // Joining is what makes each worker's buffer safely readable here.
    let mut results = Vec::with_capacity(cores.len());
    let mut first_err: Option<Error> = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(_) => {
                if first_err.is_none() {
                    first_err = Some(Error::Io(std::io::Error::other("worker thread panicked")));
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }
    Ok(results)
}

/// Runs the full experiment: a short calibration pass to size buffers, then
/// the real pass. Returns one CoreResult per selected core.
pub fn run(cores: &[usize], config: &RunConfig) -> Result<Vec<CoreResult>, Error> {
    if cores.is_empty() {
        return Err(Error::InvalidArgs("no cores selected".into()));
    }

    crate::cores::bind_to_core(config.reference_core)?;
    install_signal_handlers();

    log::info!(
        target: "corejitter::engine",
        "calibration pass: {} cores, {}s, capacity {}",
        cores.len(),
        CALIBRATION_PASS_SECS,
        config.max_events,
    );
    let calibration = run_pass(
        cores,
        config.threshold_ns,
        CALIBRATION_PASS_SECS,
        config.max_events,
    )?;

    let capacity = plan_capacity(&calibration, config.runtime_secs);
    drop(calibration);

    if shutdown_requested() {
        return Err(Error::InvalidArgs("interrupted before measurement".into()));
    }

    log::info!(
        target: "corejitter::engine",
        "measurement pass: {} cores, {}s, threshold {}ns, capacity {}",
        cores.len(),
        config.runtime_secs,
        config.threshold_ns,
        capacity,
    );
    let results = run_pass(cores, config.threshold_ns, config.runtime_secs, capacity)?;

    for result in &results {
        log::debug!(
            target: "corejitter::engine",
            "core {}: {} MHz, {} events{}",
            result.core,
            result.cpu_mhz,
            result.events.len(),
            if result.overflowed() { " (overflowed)" } else { "" },
        );
    }

    Ok(results)
}
