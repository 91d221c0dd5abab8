use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::engine::CoreResult;
use crate::error::Error;
use crate::stats::JitterStats;

/// One summary row: a label followed by one cell per core. The summary is
/// laid out field-per-line, column-per-core, so cores line up for diffing.
fn put_row(out: &mut dyn Write, label: &str, cells: &[String]) -> io::Result<()> {
    write!(out, "{}:", label)?;
    for cell in cells {
        write!(out, " {}", cell)?;
    }
    writeln!(out)
}

fn cycles_row(
    out: &mut dyn Write,
    label: &str,
    results: &[(CoreResult, JitterStats)],
    pick: impl Fn(&JitterStats) -> u64,
) -> io::Result<()> {
    let cells: Vec<String> = results
        .iter()
        .map(|(r, s)| format!("{}", r.cycles_to_ns(pick(s))))
        .collect();
    put_row(out, &format!("{}(ns)", label), &cells)
}

/// Writes the cross-core summary. Statistics are converted from each core's
/// cycle units to nanoseconds via that core's calibrated frequency.
pub fn write_summary(
    results: &[(CoreResult, JitterStats)],
    threshold_ns: u32,
    verbose: bool,
    out: &mut dyn Write,
) -> io::Result<()> {
    let cell =
        |f: &dyn Fn(&CoreResult, &JitterStats) -> String| -> Vec<String> {
            results.iter().map(|(r, s)| f(r, s)).collect()
        };

    put_row(out, "core_i", &cell(&|r, _| format!("{}", r.core)))?;
    put_row(
        out,
        "threshold(ns)",
        &cell(&|_, _| format!("{}", threshold_ns)),
    )?;
    put_row(out, "cpu_mhz", &cell(&|r, _| format!("{}", r.cpu_mhz)))?;
    put_row(
        out,
        "runtime(ns)",
        &cell(&|r, _| format!("{}", r.cycles_to_ns(r.runtime_cycles()))),
    )?;
    put_row(
        out,
        "runtime(s)",
        &cell(&|r, _| format!("{:.3}", r.cycles_to_secs(r.runtime_cycles()))),
    )?;
    put_row(out, "int_n", &cell(&|_, s| format!("{}", s.count)))?;
    put_row(
        out,
        "int_n_per_sec",
        &cell(&|r, s| {
            let secs = r.cycles_to_secs(r.runtime_cycles());
            if secs > 0.0 {
                format!("{:.3}", s.count as f64 / secs)
            } else {
                "0.000".into()
            }
        }),
    )?;
    cycles_row(out, "int_min", results, |s| s.min)?;
    cycles_row(out, "int_median", results, |s| s.median)?;
    cycles_row(out, "int_mean", results, |s| s.mean)?;
    cycles_row(out, "int_90", results, |s| s.p90)?;
    cycles_row(out, "int_99", results, |s| s.p99)?;
    cycles_row(out, "int_999", results, |s| s.p999)?;
    cycles_row(out, "int_9999", results, |s| s.p9999)?;
    cycles_row(out, "int_99999", results, |s| s.p99999)?;
    cycles_row(out, "int_max", results, |s| s.max)?;
    put_row(
        out,
        "int_total(ns)",
        &cell(&|r, _| format!("{}", r.cycles_to_ns(r.int_total))),
    )?;
    put_row(
        out,
        "int_total(%)",
        &cell(&|r, _| {
            let runtime = r.runtime_cycles();
            if runtime > 0 {
                format!("{:.3}", 100.0 * r.int_total as f64 / runtime as f64)
            } else {
                "0.000".into()
            }
        }),
    )?;
    put_row(
        out,
        "overflow",
        &cell(&|r, _| if r.overflowed() { "1".into() } else { "0".into() }),
    )?;
    if verbose {
        put_row(out, "frc_start", &cell(&|r, _| format!("{:x}", r.frc_start)))?;
        put_row(out, "frc_stop", &cell(&|r, _| format!("{:x}", r.frc_stop)))?;
    }
    Ok(())
}

/// Writes one core's raw event sequence with a commented header, either in
/// recorded (timestamp) order or sorted by gap size.
pub fn write_raw(
    result: &CoreResult,
    threshold_ns: u32,
    sort: bool,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "# cpu_mhz: {}", result.cpu_mhz)?;
    writeln!(out, "# threshold: {}ns", threshold_ns)?;
    writeln!(out, "# n_interruptions: {}", result.events.len())?;
    if result.events.is_empty() {
        return Ok(());
    }

    let runtime = result.runtime_cycles();
    writeln!(
        out,
        "# interruption: {}%",
        if runtime > 0 {
            format!("{:.6}", 100.0 * result.int_total as f64 / runtime as f64)
        } else {
            "0".into()
        }
    )?;
    writeln!(out, "# total_interruption: {} cycles", result.int_total)?;
    writeln!(out, "# total_runtime: {} cycles", runtime)?;
    writeln!(
        out,
        "# total_interruption: {:.9} seconds",
        result.cycles_to_secs(result.int_total)
    )?;
    writeln!(
        out,
        "# total_runtime: {:.9} seconds",
        result.cycles_to_secs(runtime)
    )?;
    writeln!(out, "#")?;

    if !sort {
        writeln!(out, "#      Timestamp      delta   <== interruption =>")?;
        writeln!(out, "#         (nsec)     (usec)   (cycles)     (nsec)")?;
        let mut prev_ts = result.events[0].ts;
        for event in &result.events {
            let delta = event.ts.wrapping_sub(prev_ts);
            prev_ts = event.ts;
            writeln!(
                out,
                "{:16} {:10} {:10} {:10}",
                result.cycles_to_ns(event.ts.wrapping_sub(result.frc_start)),
                result.cycles_to_us(delta),
                event.gap,
                result.cycles_to_ns(event.gap),
            )?;
        }
    } else {
        writeln!(out, "#      Timestamp   <== interruption =>")?;
        writeln!(out, "#         (nsec)   (cycles)     (nsec)")?;
        let mut sorted = result.events.clone();
        sorted.sort_unstable_by_key(|e| e.gap);
        for event in &sorted {
            writeln!(
                out,
                "{:16} {:10} {:10}",
                result.cycles_to_ns(event.ts.wrapping_sub(result.frc_start)),
                event.gap,
                result.cycles_to_ns(event.gap),
            )?;
        }
    }
    Ok(())
}

/// Writes one raw dump file per core, named PREFIX.<core> with the core id
/// zero-padded to the width of the largest selected core. Every core is
/// attempted even if an earlier file fails; the first failure is returned.
pub fn write_raw_files(
    results: &[(CoreResult, JitterStats)],
    prefix: &str,
    threshold_ns: u32,
    sort: bool,
) -> Result<(), Error> {
    let max_core = results.iter().map(|(r, _)| r.core).max().unwrap_or(0);
    let width = format!("{}", max_core).len();

    let mut first_err = None;
    for (result, _) in results {
        let path = format!("{}.{:0width$}", prefix, result.core, width = width);
        let written = File::create(&path).and_then(|f| {
            let mut out = BufWriter::new(f);
            write_raw(result, threshold_ns, sort, &mut out)?;
            out.flush()
        });
        if let Err(e) = written {
            log::error!("could not write raw file {}: {}", path, e);
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
