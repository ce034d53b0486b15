use serde::Serialize;
use std::fmt;
use tracing::Level;

/// Severity of a Cloud Logging entry.
///
/// Discriminants follow the backend's `LogSeverity` numbering. Only
/// `Default`, `Debug`, `Info`, `Warning` and `Error` are produced by the
/// level table; the rest exist so that entries built by hand can carry
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u16)]
pub enum Severity {
    /// No severity assigned.
    #[default]
    Default = 0,
    Debug = 100,
    Info = 200,
    Notice = 300,
    Warning = 400,
    Error = 500,
    Critical = 600,
    Alert = 700,
    Emergency = 800,
}

impl Severity {
    /// Translate a `tracing` level using the fixed table.
    ///
    /// `TRACE` has no counterpart in the backend and becomes
    /// [`Severity::Default`].
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::DEBUG => Self::Debug,
            Level::INFO => Self::Info,
            Level::WARN => Self::Warning,
            Level::ERROR => Self::Error,
            _ => Self::Default,
        }
    }

    /// Numeric code as used by the backend.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        Self::from_level(level)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
