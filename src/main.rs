mod cli;
mod config;
mod cores;
mod engine;
mod error;
mod logging;
mod output;
mod stats;
mod tsc;

use std::io;
use std::path::Path;
use std::process;

use clap::Parser;

use cli::{CalibrateArgs, Cli, Command, MeasureArgs};
use config::MeasureConfig;
use engine::CoreResult;
use error::Error;
use stats::JitterStats;

/// Build a MeasureConfig by layering: defaults → TOML file → CLI overrides.
fn build_measure_config(config_file: Option<&Path>, args: &MeasureArgs) -> MeasureConfig {
    let mut cfg = match config::load_config(config_file) {
        Ok(c) => c.measure,
        Err(e) => {
            log::warn!("{}", e);
            MeasureConfig::default()
        }
    };

    // Apply CLI overrides (only if explicitly set)
    if let Some(v) = args.runtime {
        cfg.runtime_secs = v;
    }
    if let Some(v) = args.max_events {
        cfg.max_events = v;
    }
    if let Some(v) = args.reference_core {
        cfg.reference_core = v;
    }

    cfg.validate();
    cfg
}

fn run_calibrate(args: &CalibrateArgs) -> Result<(), Error> {
    let cores = cores::select_cores(args.cores.as_deref())?;
    for &core in &cores {
        cores::bind_to_core(core)?;
        let mhz = tsc::calibrate_mhz()?;
        println!("core {}: {} MHz", core, mhz);
    }
    Ok(())
}

fn run_measure(cli: &Cli) -> Result<i32, Error> {
    let threshold_ns = cli
        .threshold_ns
        .ok_or_else(|| Error::InvalidArgs("THRESHOLD_NS is required".into()))?;

    let cfg = build_measure_config(cli.config_file.as_deref(), &cli.measure);
    let cores = cores::select_cores(cli.cores.as_deref())?;

    let run_config = engine::RunConfig {
        threshold_ns,
        runtime_secs: cfg.runtime_secs,
        max_events: cfg.max_events,
        reference_core: cfg.reference_core,
    };
    let results = engine::run(&cores, &run_config)?;

    let rows: Vec<(CoreResult, JitterStats)> = results
        .into_iter()
        .map(|r| {
            let reduced = stats::reduce(&r.events);
            (r, reduced)
        })
        .collect();

    let raw_failed = match &cli.raw_prefix {
        Some(prefix) => output::write_raw_files(&rows, prefix, threshold_ns, cli.sort).is_err(),
        None => false,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_summary(&rows, threshold_ns, cli.verbose, &mut out)?;

    let mut overflowed = false;
    for (result, _) in &rows {
        if result.overflowed() {
            overflowed = true;
            log::error!(
                "core {} filled its event buffer ({} events) before the run ended; \
                 its statistics cover a truncated sample",
                result.core,
                result.capacity,
            );
        }
    }
    if overflowed {
        log::error!("you probably need to increase the interruption threshold");
        return Ok(2);
    }
    if raw_failed {
        return Ok(3);
    }
    Ok(0)
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Calibrate(args)) => {
            logging::init(&args.log, false);
            if let Err(e) = run_calibrate(args) {
                log::error!("{}", e);
                process::exit(1);
            }
        }
        None => {
            logging::init(&cli.log, true);
            match run_measure(&cli) {
                Ok(code) => process::exit(code),
                Err(e) => {
                    log::error!("{}", e);
                    process::exit(1);
                }
            }
        }
    }
}
