/// Core types shared by the launcher, the classifier and the request boundary
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of the sandboxed subprocess before any interpretation.
///
/// `returncode` is `None` only when no process was started (payload rejected
/// before spawn). `stderr` is `None` in the same case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutcome {
    /// Exit code of the isolation binary (`128 + signal` if it was itself killed)
    pub returncode: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: Option<String>,
    /// Whether either stream hit the capture ceiling
    pub truncated: bool,
    /// Records parsed from the isolation layer's diagnostic channel
    pub diagnostics: Vec<LogRecord>,
}

impl RawOutcome {
    /// Outcome for a payload that never reached the isolation layer.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            returncode: None,
            stdout: message.into(),
            stderr: None,
            truncated: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Semantic outcome of one execution - STABLE TAXONOMY
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Exit code 0
    #[serde(rename = "success")]
    Success,
    /// Interpreter-level error (exit code 1)
    #[serde(rename = "runtime_error")]
    RuntimeError,
    /// Killed by the isolation layer's time or memory enforcement
    #[serde(rename = "resource_exceeded")]
    ResourceExceeded,
    /// Terminated by a fatal signal
    #[serde(rename = "signal_terminated")]
    SignalTerminated,
    /// Payload rejected before spawn
    #[serde(rename = "input_rejected")]
    InputRejected,
    /// Anything else, including an unavailable isolation layer
    #[serde(rename = "unknown_error")]
    UnknownError,
}

impl Classification {
    pub fn is_success(self) -> bool {
        self == Classification::Success
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Success => write!(f, "success"),
            Classification::RuntimeError => write!(f, "runtime_error"),
            Classification::ResourceExceeded => write!(f, "resource_exceeded"),
            Classification::SignalTerminated => write!(f, "signal_terminated"),
            Classification::InputRejected => write!(f, "input_rejected"),
            Classification::UnknownError => write!(f, "unknown_error"),
        }
    }
}

/// The only value that crosses the boundary to the result publisher.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// Raw return code, absent when no process ran
    pub returncode: Option<i32>,
    /// Outcome category
    pub classification: Classification,
    /// Text shown to the submitter
    pub output: String,
}

impl ExecutionResult {
    pub fn new(
        returncode: Option<i32>,
        classification: Classification,
        output: impl Into<String>,
    ) -> Self {
        Self {
            returncode,
            classification,
            output: output.into(),
        }
    }
}

/// Diagnostic severity, ordered from least to most severe.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    #[serde(rename = "DEBUG")]
    Debug,
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "FATAL")]
    Fatal,
}

impl LogLevel {
    /// Map a single-letter nsjail tag.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'D' => Some(LogLevel::Debug),
            'I' => Some(LogLevel::Info),
            'W' => Some(LogLevel::Warning),
            'E' => Some(LogLevel::Error),
            'F' => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// `log` has no fatal level; fatal diagnostics surface as errors.
    pub fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Fatal => log::Level::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Fatal => write!(f, "FATAL"),
        }
    }
}

/// One leveled record derived from one diagnostic line.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// False when this is the "failed to parse" wrapper
    pub parsed: bool,
}

/// Custom error types for snekbox
#[derive(Error, Debug)]
pub enum SnekboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<nix::errno::Errno> for SnekboxError {
    fn from(err: nix::errno::Errno) -> Self {
        SnekboxError::Process(err.to_string())
    }
}

impl From<serde_json::Error> for SnekboxError {
    fn from(err: serde_json::Error) -> Self {
        SnekboxError::Protocol(err.to_string())
    }
}

/// Result type alias for snekbox operations
pub type Result<T> = std::result::Result<T, SnekboxError>;
