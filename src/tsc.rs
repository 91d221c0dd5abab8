use std::time::Instant;

use crate::error::Error;

/// Minimum counter ticks per calibration measurement. The wall-clock time
/// the spin actually takes is measured separately, so the window does not
/// need to be a round number of anything.
const CALIBRATION_TICKS: u64 = 1_000_000;

/// Consecutive measurements must agree within 0.1% before the frequency is
/// accepted.
const MAX_CALIBRATION_ATTEMPTS: u32 = 25;

/// Reads the free-running cycle counter.
///
/// On x86_64 this is RDTSC, deliberately without fencing: a serialized read
/// costs tens of cycles and would raise the sampler's own floor of
/// detectable gap size. On aarch64 it is CNTVCT_EL0 (fixed-frequency
/// virtual timer, userspace-readable). Elsewhere it falls back to
/// clock_gettime(CLOCK_MONOTONIC) in nanoseconds, which costs a vDSO call
/// per read and limits resolution accordingly.
#[inline(always)]
pub fn read() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC is always available on x86_64.
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(target_arch = "aarch64")]
    {
        let val: u64;
        // SAFETY: CNTVCT_EL0 is readable from EL0 on Linux.
        unsafe {
            core::arch::asm!("mrs {}, cntvct_el0", out(reg) val, options(nomem, nostack));
        }
        val
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        clock_monotonic_ns()
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn clock_monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: clock_gettime writes into the timespec we own.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

/// One calibration measurement: spin until CALIBRATION_TICKS counter ticks
/// have passed, then divide by the wall-clock time the spin took.
fn measure_hz() -> u64 {
    let start = read();
    let mut end = start;
    let t0 = Instant::now();
    while end.wrapping_sub(start) < CALIBRATION_TICKS {
        end = read();
    }
    let secs = t0.elapsed().as_secs_f64();
    (end.wrapping_sub(start) as f64 / secs) as u64
}

/// Calibrates the counter frequency of the calling core in whole MHz.
///
/// Repeats the measurement until two consecutive values agree within 0.1%.
/// Frequency can differ per core and can change between runs under
/// frequency scaling, so callers run this once per worker per run, pinned.
/// Under pathological scheduling the loop may never settle; the attempt
/// count is bounded and non-convergence is surfaced as an error.
pub fn calibrate_mhz() -> Result<u32, Error> {
    let mut prev = measure_hz();
    for _ in 0..MAX_CALIBRATION_ATTEMPTS {
        let cur = measure_hz();
        let delta = cur.abs_diff(prev);
        if delta <= cur / 1000 {
            let mhz = (cur / 1_000_000) as u32;
            if mhz == 0 {
                return Err(Error::Calibration(format!(
                    "counter runs at {} Hz, below 1 MHz; gaps cannot be resolved",
                    cur
                )));
            }
            return Ok(mhz);
        }
        prev = cur;
    }
    Err(Error::Calibration(format!(
        "counter frequency did not settle within 0.1% after {} attempts",
        MAX_CALIBRATION_ATTEMPTS
    )))
}

/// Converts a core-independent nanosecond threshold into this core's
/// counter-cycle units, so the hot loop compares without dividing.
pub fn cycles_for_ns(ns: u32, cpu_mhz: u32) -> u64 {
    ns as u64 * cpu_mhz as u64 / 1000
}
