//! Logging configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Raise the level by `-v` occurrences from the command line
    pub fn raised_by(self, verbosity: u8) -> Self {
        let order = [Self::Error, Self::Warn, Self::Info, Self::Debug, Self::Trace];
        let current = order.iter().position(|l| *l == self).unwrap_or(2);
        let idx = (current + verbosity as usize).min(order.len() - 1);
        order[idx]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    /// Include the module target in each line
    #[serde(default)]
    pub with_target: bool,
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Info,
            with_target: false,
        }
    }
}
