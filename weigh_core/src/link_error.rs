//! Maps `Box<dyn Error>` from the `Link` boundary to typed `SessionError`.
//!
//! The `Link` trait uses `Box<dyn Error + Send + Sync>` so any radio stack can
//! sit behind it; this module converts those errors into the session's error
//! enum, with an optional feature-gated path for `weigh_sim::SimError`.

use crate::error::SessionError;

/// Which kind of transport request produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Connect,
    Write,
}

impl Stage {
    fn wrap(self, msg: String) -> SessionError {
        match self {
            Self::Scan => SessionError::Scan(msg),
            Self::Connect => SessionError::Connect(msg),
            Self::Write => SessionError::Write(msg),
        }
    }
}

/// Map a transport error raised during `stage` to a typed `SessionError`.
///
/// Known simulator errors are downcast first; anything else falls back to
/// string heuristics.
pub fn map_link_error(stage: Stage, e: &(dyn std::error::Error + 'static)) -> SessionError {
    #[cfg(feature = "sim-errors")]
    {
        use weigh_sim::error::SimError;
        if let Some(sim) = e.downcast_ref::<SimError>() {
            return match sim {
                // The peer is gone, whatever we were trying to do.
                SimError::NotConnected => SessionError::Connect(format!("link lost: {sim}")),
                SimError::AckTimeout(_) => stage.wrap(format!("timed out: {sim}")),
                other => stage.wrap(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        stage.wrap(format!("timed out: {s}"))
    } else {
        stage.wrap(s)
    }
}
