use std::io;
use std::mem;

use crate::error::Error;

/// Parses a comma-separated list of core ids and inclusive ranges,
/// e.g. "0,2-4,7" => [0, 2, 3, 4, 7].
pub fn parse_core_list(spec: &str) -> Result<Vec<usize>, Error> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::InvalidArgs("empty core list".into()));
    }

    let mut cores = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        match token.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().map_err(|_| bad_token(token))?;
                let hi: usize = hi.trim().parse().map_err(|_| bad_token(token))?;
                if lo > hi {
                    return Err(Error::InvalidArgs(format!(
                        "descending core range: {}",
                        token
                    )));
                }
                cores.extend(lo..=hi);
            }
            None => {
                cores.push(token.parse().map_err(|_| bad_token(token))?);
            }
        }
    }
    Ok(cores)
}

fn bad_token(token: &str) -> Error {
    Error::InvalidArgs(format!("bad core id or range: {:?}", token))
}

/// Returns the cores the process is allowed to run on, in ascending order.
pub fn affinity_cores() -> Result<Vec<usize>, Error> {
    // SAFETY: zeroed cpu_set_t is a valid empty set; sched_getaffinity
    // fills the set we own.
    let set = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        if libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return Err(Error::Affinity(format!(
                "sched_getaffinity failed: {}",
                io::Error::last_os_error()
            )));
        }
        set
    };

    let mut cores = Vec::new();
    for core in 0..(8 * mem::size_of::<libc::cpu_set_t>()) {
        // SAFETY: CPU_ISSET only reads the set within its fixed size.
        if unsafe { libc::CPU_ISSET(core, &set) } {
            cores.push(core);
        }
    }
    Ok(cores)
}

/// Pins the calling thread to a single core for the rest of its lifetime.
pub fn bind_to_core(core: usize) -> Result<(), Error> {
    // SAFETY: the set is built with the libc helpers and passed with its
    // own size; affects only the calling thread (pid 0).
    let rc = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(Error::Affinity(format!(
            "cannot bind to core {}: {}",
            core,
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Resolves the core set for a run. An explicit list is validated against
/// the process affinity mask; with no list, every allowed core is used.
/// Unusable cores are a fatal configuration error, found before any
/// measurement starts.
pub fn select_cores(explicit: Option<&str>) -> Result<Vec<usize>, Error> {
    let allowed = affinity_cores()?;
    match explicit {
        None => Ok(allowed),
        Some(spec) => {
            let cores = parse_core_list(spec)?;
            for &core in &cores {
                if !allowed.contains(&core) {
                    return Err(Error::Affinity(format!(
                        "core {} is not in the process affinity mask",
                        core
                    )));
                }
            }
            Ok(cores)
        }
    }
}
