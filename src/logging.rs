//! Message routing.
//!
//! Everything the library has to say goes through a single process-wide
//! handler `fn(domain, level, message)`. The default handler writes
//! `[domain.level] message` to standard error; [`log_facade_handler`] forwards
//! to the `log` crate instead.
//!
//! ```rust
//! use pixform::logging::{self, LogLevel};
//!
//! logging::logging_settings(Some(Box::new(logging::log_facade_handler)), LogLevel::Warning);
//! ```

use std::fmt;
use std::sync::{LazyLock, RwLock};

/// Domain used for messages emitted by this crate.
pub const DOMAIN: &str = "pixform";

/// Severity of a log message. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error = 0,
    Critical = 1,
    Warning = 2,
    Message = 3,
    Info = 4,
    Debug = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Warning => "warning",
            LogLevel::Message => "message",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logging handler receives `(domain, level, message)`.
pub type LoggingHandler = Box<dyn Fn(&str, LogLevel, &str) + Send + Sync>;

struct Settings {
    handler: Option<LoggingHandler>,
    min_level: LogLevel,
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| {
    RwLock::new(Settings {
        handler: None,
        min_level: LogLevel::Info,
    })
});

/// Install a handler and verbosity. `None` restores the default stderr handler.
///
/// Messages with `level <= min_level` are delivered.
pub fn logging_settings(handler: Option<LoggingHandler>, min_level: LogLevel) {
    let mut settings = SETTINGS.write().unwrap_or_else(|e| e.into_inner());
    settings.handler = handler;
    settings.min_level = min_level;
}

/// Whether a message at `level` would currently be delivered.
pub fn enabled(level: LogLevel) -> bool {
    let settings = SETTINGS.read().unwrap_or_else(|e| e.into_inner());
    level <= settings.min_level
}

/// Deliver a message to the installed handler.
pub fn emit(domain: &str, level: LogLevel, message: &str) {
    let settings = SETTINGS.read().unwrap_or_else(|e| e.into_inner());
    if level > settings.min_level {
        return;
    }
    match &settings.handler {
        Some(handler) => handler(domain, level, message),
        None => default_handler(domain, level, message),
    }
}

/// Writes `[domain.level] message` to standard error.
pub fn default_handler(domain: &str, level: LogLevel, message: &str) {
    eprintln!("{}", format_message(domain, level, message));
}

/// Forwards to the `log` facade, using the domain as the log target.
pub fn log_facade_handler(domain: &str, level: LogLevel, message: &str) {
    let level = match level {
        LogLevel::Error | LogLevel::Critical => log::Level::Error,
        LogLevel::Warning => log::Level::Warn,
        LogLevel::Message | LogLevel::Info => log::Level::Info,
        LogLevel::Debug => log::Level::Debug,
    };
    log::log!(target: domain, level, "{message}");
}

pub(crate) fn format_message(domain: &str, level: LogLevel, message: &str) -> String {
    format!("[{domain}.{level}] {message}")
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($level) {
            $crate::logging::emit($crate::logging::DOMAIN, $level, &format!($($arg)*));
        }
    };
}

macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::logging::log_at!($crate::logging::LogLevel::Debug, $($arg)*) };
}

macro_rules! log_info {
    ($($arg:tt)*) => { $crate::logging::log_at!($crate::logging::LogLevel::Info, $($arg)*) };
}

macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::logging::log_at!($crate::logging::LogLevel::Warning, $($arg)*) };
}

macro_rules! log_error {
    ($($arg:tt)*) => { $crate::logging::log_at!($crate::logging::LogLevel::Error, $($arg)*) };
}

pub(crate) use {log_at, log_debug, log_error, log_info, log_warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Debug);
        assert_eq!(LogLevel::Error as u8, 0);
        assert_eq!(LogLevel::Debug as u8, 5);
    }

    #[test]
    fn default_format() {
        assert_eq!(
            format_message("pixform", LogLevel::Warning, "truncated image"),
            "[pixform.warning] truncated image"
        );
    }

    #[test]
    fn level_names() {
        let names: Vec<&str> = [
            LogLevel::Error,
            LogLevel::Critical,
            LogLevel::Warning,
            LogLevel::Message,
            LogLevel::Info,
            LogLevel::Debug,
        ]
        .iter()
        .map(|l| l.as_str())
        .collect();
        assert_eq!(
            names,
            vec!["error", "critical", "warning", "message", "info", "debug"]
        );
    }
}
