use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogArgs;

#[derive(Debug, Args)]
pub struct MeasureArgs {
    /// Run length in seconds
    #[arg(long = "runtime")]
    pub runtime: Option<u32>,

    /// Event buffer capacity of the calibration pass
    #[arg(long = "max")]
    pub max_events: Option<usize>,

    /// Core to pin the control thread to
    #[arg(long = "reference-core")]
    pub reference_core: Option<usize>,
}

#[derive(Debug, Parser)]
#[command(name = "corejitter", about = "Measures OS-induced scheduling jitter per CPU core")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Gap threshold in nanoseconds; gaps at or above it are recorded
    #[arg(value_name = "THRESHOLD_NS")]
    pub threshold_ns: Option<u32>,

    /// Comma-separated list of cores or ranges (default: all allowed cores)
    #[arg(long = "cores")]
    pub cores: Option<String>,

    /// Write per-core raw event dumps to FILENAME-PREFIX.<core>
    #[arg(long = "raw", value_name = "FILENAME-PREFIX")]
    pub raw_prefix: Option<String>,

    /// Order raw dumps by gap size instead of timestamp
    #[arg(long)]
    pub sort: bool,

    /// Include raw counter start/stop readings in the summary
    #[arg(long)]
    pub verbose: bool,

    /// Configuration file path (default: /etc/corejitter.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub measure: MeasureArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report the calibrated cycle-counter frequency of each selected core
    Calibrate(CalibrateArgs),
}

#[derive(Debug, Parser)]
pub struct CalibrateArgs {
    /// Comma-separated list of cores or ranges (default: all allowed cores)
    #[arg(long = "cores")]
    pub cores: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}
