//! Discovery of one target device among ambient advertisements.
//!
//! `Idle → Scanning → {Found | TimedOut | Failed | cancelled} → Idle`.
//! The scanner never blocks: the owner feeds it advertisements and scan
//! errors as they arrive and polls the deadline with its own clock.
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use weigh_traits::{DiscoveredDevice, Link};

use crate::error::{SessionError, SessionResult};
use crate::link_error::{Stage, map_link_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// How a scan resolved. Each scan resolves at most once.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Found(DiscoveredDevice),
    TimedOut(Duration),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DeviceScanner {
    timeout: Duration,
    state: ScanState,
    target: Option<String>,
    deadline: Option<Instant>,
}

impl DeviceScanner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: ScanState::Idle,
            target: None,
            deadline: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start observing advertisements for `target`. Rejected without side
    /// effects while a scan is already running.
    pub fn start<L: Link>(&mut self, link: &mut L, target: &str, now: Instant) -> SessionResult<()> {
        if self.is_scanning() {
            return Err(SessionError::AlreadyScanning);
        }
        link.start_scan()
            .map_err(|e| map_link_error(Stage::Scan, e.as_ref()))?;
        self.state = ScanState::Scanning;
        self.target = Some(target.to_owned());
        self.deadline = Some(now.checked_add(self.timeout).unwrap_or(now));
        debug!(target, timeout_ms = self.timeout.as_millis(), "scan started");
        Ok(())
    }

    /// Feed one advertisement. Returns `Found` for the first match only.
    pub fn on_advertisement<L: Link>(
        &mut self,
        link: &mut L,
        device: &DiscoveredDevice,
    ) -> Option<ScanOutcome> {
        if !self.is_scanning() {
            return None;
        }
        let target = self.target.as_deref()?;
        if !device.matches(target) {
            trace!(
                identifier = %device.identifier,
                name = device.advertised_name.as_deref().unwrap_or(""),
                "ignoring advertisement"
            );
            return None;
        }
        info!(
            target,
            identifier = %device.identifier,
            "target device found"
        );
        self.finish(link);
        Some(ScanOutcome::Found(device.clone()))
    }

    /// Resolve as `TimedOut` once `now` reaches the deadline.
    pub fn poll_deadline<L: Link>(&mut self, link: &mut L, now: Instant) -> Option<ScanOutcome> {
        if !self.is_scanning() || now < self.deadline? {
            return None;
        }
        warn!(
            target = self.target.as_deref().unwrap_or(""),
            timeout_ms = self.timeout.as_millis(),
            "no matching device before the scan deadline"
        );
        self.finish(link);
        Some(ScanOutcome::TimedOut(self.timeout))
    }

    /// The transport failed mid-scan. No retry.
    pub fn on_scan_error<L: Link>(&mut self, link: &mut L, reason: &str) -> Option<ScanOutcome> {
        if !self.is_scanning() {
            return None;
        }
        warn!(reason, "scan failed");
        self.finish(link);
        Some(ScanOutcome::Failed(reason.to_owned()))
    }

    /// Stop without resolving. Idempotent.
    pub fn cancel<L: Link>(&mut self, link: &mut L) {
        if self.is_scanning() {
            debug!("scan cancelled");
            self.finish(link);
        }
    }

    fn finish<L: Link>(&mut self, link: &mut L) {
        self.state = ScanState::Idle;
        self.target = None;
        self.deadline = None;
        if let Err(e) = link.stop_scan() {
            warn!(error = %e, "stop_scan failed");
        }
    }
}
