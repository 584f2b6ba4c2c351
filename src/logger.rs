//! Levelled logger with a fixed prefix.
//!
//! Writes to the Workers console on `wasm32`, to stderr elsewhere.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
    None = 4,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "none" | "off" => Ok(LogLevel::None),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
    prefix: String,
}

impl Logger {
    pub fn new(level: LogLevel, prefix: impl Into<String>) -> Self {
        Self {
            level,
            prefix: prefix.into(),
        }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && self.level <= level
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            emit(level, &format!("{} {}", self.prefix, message));
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn emit(level: LogLevel, line: &str) {
    match level {
        LogLevel::Warn => worker::console_warn!("{}", line),
        LogLevel::Error => worker::console_error!("{}", line),
        _ => worker::console_log!("{}", line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn emit(_level: LogLevel, line: &str) {
    eprintln!("{}", line);
}
