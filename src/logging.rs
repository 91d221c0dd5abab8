use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> LevelFilter {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log level (default: info for a measurement run, warn otherwise)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Append log messages to a file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Send log messages to syslog
    #[arg(long)]
    pub syslog: bool,
}

/// Fans every record out to stderr, plus the optional file and syslog
/// sinks. stderr is unconditional so a dying measurement run always says
/// why, even when no sink was configured.
struct JitterLogger {
    file: Option<Mutex<File>>,
    syslog: Option<Mutex<SyslogLogger>>,
}

impl JitterLogger {
    fn severity(level: Level) -> &'static str {
        match level {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug | Level::Trace => "debug",
        }
    }

    fn forward_syslog(logger: &mut SyslogLogger, record: &Record) {
        let text = record.args().to_string();
        let _ = match record.level() {
            Level::Error => logger.err(&text),
            Level::Warn => logger.warning(&text),
            Level::Info => logger.info(&text),
            Level::Debug | Level::Trace => logger.debug(&text),
        };
    }
}

impl Log for JitterLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let component = if record.target().contains("engine") {
            "corejitter engine"
        } else {
            "corejitter"
        };
        let line = format!(
            "[{}] {}: {}",
            component,
            Self::severity(record.level()),
            record.args()
        );

        let _ = writeln!(std::io::stderr().lock(), "{}", line);
        if let Some(ref file) = self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", line);
            }
        }
        if let Some(ref logger) = self.syslog {
            if let Ok(mut l) = logger.lock() {
                Self::forward_syslog(&mut l, record);
            }
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

fn open_log_file(path: &PathBuf) -> Option<Mutex<File>> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("corejitter: cannot open log file {}: {}", path.display(), e);
            None
        }
    }
}

pub fn init(args: &LogArgs, is_measurement: bool) {
    let level = match (args.log_level, is_measurement) {
        (Some(level), _) => level,
        (None, true) => LogLevel::Info,
        (None, false) => LogLevel::Warn,
    };

    let file = args.log_file.as_ref().and_then(open_log_file);

    let syslog = args.syslog.then(|| {
        syslog::unix(syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "corejitter".into(),
            pid: std::process::id(),
        })
        .ok()
        .map(Mutex::new)
    });

    let logger = JitterLogger {
        file,
        syslog: syslog.flatten(),
    };
    let _ = log::set_boxed_logger(Box::new(logger));
    log::set_max_level(level.into());
}
