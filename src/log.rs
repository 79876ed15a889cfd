//! Run logging.
//!
//! Every run appends to `~/.skylift/skylift.log` so a failed migration can
//! be reconstructed after the fact. One line per event,
//! `<utc timestamp> <LEVEL> <message>`; task-level events carry a
//! `<phase>/<task>:` prefix so grepping a task name yields its whole story
//! across phases and branches.
//!
//! Verbosity comes from `--debug`, `SKYLIFT_DEBUG=1`, or an explicit
//! `SKYLIFT_LOG=<error|warn|info|debug>` override.

use crate::engine::Phase;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Severity of a run-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Open the run log and pick the verbosity.
///
/// `SKYLIFT_LOG` wins over `--debug`/`SKYLIFT_DEBUG`, which win over the
/// Info default. Appends a start marker so consecutive runs are
/// separable in the same file.
pub fn init_with_debug(debug: bool) {
    let env_debug = std::env::var("SKYLIFT_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let mut min = if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    if let Ok(spec) = std::env::var("SKYLIFT_LOG") {
        if let Ok(parsed) = spec.parse() {
            min = parsed;
        }
    }
    set_level(min);

    if let Some(dir) = dirs::home_dir().map(|h| h.join(".skylift")) {
        let _ = std::fs::create_dir_all(&dir);
        if LOG_FILE.set(dir.join("skylift.log")).is_ok() {
            write(
                LogLevel::Info,
                &format!("---- skylift started (pid {}, level {}) ----", std::process::id(), min),
            );
        }
    }
}

/// Lower bound below which events are dropped.
pub fn level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
}

/// Change the verbosity for the rest of the run.
pub fn set_level(min: LogLevel) {
    MIN_LEVEL.store(min as u8, Ordering::SeqCst);
}

/// Append one event to the run log.
pub fn write(level: LogLevel, msg: &str) {
    if level > self::level() {
        return;
    }
    let Some(path) = LOG_FILE.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let _ = writeln!(file, "{} {:5} {}", timestamp, level, msg);
    }
}

/// Append one task-level event, prefixed `<phase>/<task>:`.
///
/// The scheduler routes per-task outcomes (failures, advances, joins)
/// through here so every line about a task is grep-able by its name.
pub fn task_event(level: LogLevel, phase: Phase, task: &str, msg: &str) {
    write(level, &format!("{}/{}: {}", phase, task, msg));
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! slog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! slog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! slog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

/// Log macro for DEBUG level (dropped unless debug verbosity is on).
#[macro_export]
macro_rules! slog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

/// Task-level log macro: `slog_task!(Error, phase, task_name, "failed: {}", err)`.
#[macro_export]
macro_rules! slog_task {
    ($level:ident, $phase:expr, $task:expr, $($arg:tt)*) => {
        $crate::log::task_event(
            $crate::log::LogLevel::$level,
            $phase,
            $task,
            &format!($($arg)*),
        )
    };
}
