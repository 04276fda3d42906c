//! Unified error types for the dome supervisor.
//!
//! Every port has its own error enum so the controller can decide, per
//! failure, whether it is transient (log and carry on) or fatal for the
//! dome loop.  Port errors other than hardware are handled inside the
//! cycle; only what ends a dome loop travels as the top-level [`Error`].

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Failure that ends a dome loop and reaches the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A dome hardware command or query failed.
    Hardware(HardwareError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The controller refused the command (e.g. "Estop active").
    CommandRejected { command: &'static str, detail: String },
    /// No answer within the driver's timeout.
    Timeout { command: &'static str },
    /// The controller could not be reached this time; may recover.
    Unreachable(String),
    /// The driver does not implement the requested operation.
    Unsupported(&'static str),
    /// The session is gone for good; the dome loop cannot continue.
    SessionLost(String),
}

impl HardwareError {
    /// Fatal errors end the dome loop and are escalated to the supervisor.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRejected { command, detail } => {
                write!(f, "{command} rejected: {detail}")
            }
            Self::Timeout { command } => write!(f, "{command} timed out"),
            Self::Unreachable(msg) => write!(f, "controller unreachable: {msg}"),
            Self::Unsupported(op) => write!(f, "{op} not supported by this driver"),
            Self::SessionLost(msg) => write!(f, "session lost: {msg}"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Weather errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherError {
    /// The source has no data right now (file missing, daemon down).
    Unavailable(String),
    /// Data was present but could not be parsed.
    Malformed(String),
}

impl fmt::Display for WeatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "weather unavailable: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed weather data: {msg}"),
        }
    }
}

impl std::error::Error for WeatherError {}

// ---------------------------------------------------------------------------
// Override errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// The backing store could not be read or written.
    Io(String),
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "override I/O error: {msg}"),
        }
    }
}

impl std::error::Error for OverrideError {}

// ---------------------------------------------------------------------------
// Status record errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The exclusive lock could not be taken in time.
    LockTimeout(String),
    /// Writing or renaming the record failed.
    Io(String),
    /// An existing record could not be parsed.
    Malformed(String),
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockTimeout(path) => write!(f, "timed out waiting for lock {path}"),
            Self::Io(msg) => write!(f, "status I/O error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed status record: {msg}"),
        }
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    Io(String),
    /// The config file is not valid JSON for [`SiteConfig`](crate::config::SiteConfig).
    Parse(String),
    /// A field failed validation.  The message names the field and why.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read config: {msg}"),
            Self::Parse(msg) => write!(f, "cannot parse config: {msg}"),
            Self::Invalid(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
