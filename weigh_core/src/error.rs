use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown slot {0} (expected 1, 2 or 3)")]
    UnknownSlot(u8),
    #[error("a scan is already in progress")]
    AlreadyScanning,
    #[error("scan error: {0}")]
    Scan(String),
    #[error("no matching device advertised within {} ms", .0.as_millis())]
    TimedOut(Duration),
    #[error("connect error: {0}")]
    Connect(String),
    #[error("write error: {0}")]
    Write(String),
    #[error("malformed reading: {0:?}")]
    MalformedReading(String),
    #[error("session busy: an attempt is already in flight")]
    SessionBusy,
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("cancelled by caller")]
    Cancelled,
}

impl SessionError {
    /// Stable machine-readable tag, used in JSON output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownSlot(_) => "unknown_slot",
            Self::AlreadyScanning => "already_scanning",
            Self::Scan(_) => "scan",
            Self::TimedOut(_) => "timed_out",
            Self::Connect(_) => "connect",
            Self::Write(_) => "write",
            Self::MalformedReading(_) => "malformed_reading",
            Self::SessionBusy => "session_busy",
            Self::NotReady(_) => "not_ready",
            Self::Cancelled => "cancelled",
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
