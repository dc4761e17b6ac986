//! Session state and the caller-facing projection of it.

use std::fmt;

use serde::Serialize;
use weigh_traits::DiscoveredDevice;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Measuring,
    Stable,
    Confirmed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Measuring => "measuring",
            Self::Stable => "stable",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the caller should present, produced while the session consumes
/// transport events or completes an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Scan matched; connecting.
    DeviceFound(DiscoveredDevice),
    /// Connected, services discovered and user info written.
    Ready { identifier: String },
    /// A decoded weight. `stable` mirrors the session's latched verdict.
    Reading { weight: f64, stable: bool },
    /// The weight settled; emitted once per measurement.
    Settled { weight: f64 },
    Confirmed { weight: f64 },
    /// A notification could not be decoded and was dropped.
    ReadingRejected(SessionError),
    /// The attempt ended; the session is back to `Idle`.
    Aborted(SessionError),
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub scanning: bool,
    pub connected_device_id: Option<String>,
    pub selected_slot: Option<u8>,
    pub current_weight: Option<f64>,
    pub is_weight_stable: bool,
    pub confirmed_weight: Option<f64>,
    pub last_error: Option<String>,
}
