use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter, Record};
use yansi::Paint;

use crate::error::{ButterflyError, Result};

/// Crates whose debug output drowns the analysis log
const NOISY_CRATES: &[&str] = &["hyper", "reqwest", "rustls", "h2", "r2d2"];

/// Initializes the CLI logger at `log_level` unless `RUST_LOG` says otherwise
///
/// Valid log levels are: error, warn, info, debug, trace
pub fn init(log_level: &str) -> Result<()> {
    let level = parse_log_level(log_level);
    let env = Env::default()
        .filter_or("RUST_LOG", level.as_str())
        .write_style_or("RUST_LOG_STYLE", "auto");

    let mut builder = Builder::from_env(env);
    for name in NOISY_CRATES {
        builder.filter_module(name, LevelFilter::Warn);
    }

    builder
        .format(|buf, record| writeln!(buf, "{}", format_log(record)))
        .try_init()
        .map_err(|e| ButterflyError::Config(format!("logger already initialised: {}", e)))
}

/// Formats one record as `[timestamp] LEVEL [target] message`
pub fn format_log(record: &Record) -> String {
    let level = match record.level() {
        Level::Error => Paint::red("ERROR").bold(),
        Level::Warn => Paint::yellow("WARN ").bold(),
        Level::Info => Paint::cyan("INFO ").bold(),
        Level::Debug => Paint::blue("DEBUG").bold(),
        Level::Trace => Paint::new("TRACE"),
    };

    let target = if record.target().is_empty() {
        record.module_path().unwrap_or("unknown")
    } else {
        record.target()
    };

    format!(
        "[{}] {} [{}] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        level,
        target,
        record.args()
    )
}

/// Parses a log level string, defaulting to `Info` for anything unknown
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
