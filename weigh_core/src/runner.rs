//! Blocking drivers for the CLI and integration tests.
//!
//! `run_measurement` walks a `ScaleSession` from `begin` to a settled (and
//! optionally confirmed) weight. `scan_for` runs discovery only. Both poll a
//! shutdown flag so Ctrl-C maps to a clean cancel.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use serde::Serialize;
use tracing::{debug, info};
use weigh_traits::{Clock, DiscoveredDevice, Link, LinkEvent};

use crate::error::{Result, SessionError};
use crate::protocol::Material;
use crate::scanner::{DeviceScanner, ScanOutcome};
use crate::session::ScaleSession;
use crate::status::SessionUpdate;

/// Upper bound on how long a driver blocks before rechecking the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct MeasureParams {
    pub slot: u8,
    pub user_id: String,
    pub material: Material,
    /// Write `CONFIRM_RESULT` as soon as the weight settles.
    pub auto_confirm: bool,
    /// Give up if no weight settled within this long after `begin`.
    pub max_wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementReport {
    pub slot: u8,
    pub identifier: String,
    pub weight_g: f64,
    pub confirmed: bool,
    pub readings: usize,
    pub rejected: usize,
}

/// Error message used when the weight never settles within `max_wait`.
pub const NOT_SETTLED: &str = "weight did not settle";

pub fn run_measurement<L: Link, C: Clock>(
    session: &mut ScaleSession<L, C>,
    params: &MeasureParams,
    shutdown: &AtomicBool,
    mut on_update: impl FnMut(&SessionUpdate),
) -> Result<MeasurementReport> {
    session.begin(params.slot, &params.user_id, params.material)?;
    let started = session.clock().now();
    let mut identifier = String::new();
    let mut readings = 0usize;
    let mut rejected = 0usize;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            session.cancel();
            return Err(SessionError::Cancelled.into());
        }
        if session.clock().now().saturating_duration_since(started) >= params.max_wait {
            session.cancel();
            eyre::bail!("{NOT_SETTLED} within {} ms", params.max_wait.as_millis());
        }
        let Some(update) = session.next_update(POLL_INTERVAL) else {
            continue;
        };
        on_update(&update);
        match update {
            SessionUpdate::Ready { identifier: id } => {
                identifier = id;
                session.start_measurement()?;
            }
            SessionUpdate::Reading { .. } => readings += 1,
            SessionUpdate::ReadingRejected(_) => rejected += 1,
            SessionUpdate::Settled { weight } => {
                let confirmed = if params.auto_confirm {
                    session.confirm()?;
                    while let Some(update) = session.next_update(Duration::ZERO) {
                        on_update(&update);
                    }
                    true
                } else {
                    false
                };
                session.close();
                info!(weight, confirmed, readings, rejected, "measurement finished");
                return Ok(MeasurementReport {
                    slot: params.slot,
                    identifier,
                    weight_g: weight,
                    confirmed,
                    readings,
                    rejected,
                });
            }
            SessionUpdate::Aborted(e) => return Err(e.into()),
            SessionUpdate::DeviceFound(_) | SessionUpdate::Confirmed { .. } => {}
        }
    }
}

/// Scan for `target` without connecting.
pub fn scan_for<L: Link, C: Clock>(
    link: &mut L,
    events: &xch::Receiver<LinkEvent>,
    clock: &C,
    target: &str,
    timeout: Duration,
    shutdown: &AtomicBool,
) -> Result<DiscoveredDevice> {
    let mut scanner = DeviceScanner::new(timeout);
    scanner.start(link, target, clock.now())?;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            scanner.cancel(link);
            return Err(SessionError::Cancelled.into());
        }
        if let Some(outcome) = scanner.poll_deadline(link, clock.now()) {
            return resolve(outcome);
        }
        let outcome = match events.recv_timeout(POLL_INTERVAL) {
            Ok(LinkEvent::Advertisement(device)) => scanner.on_advertisement(link, &device),
            Ok(LinkEvent::ScanFailed { reason }) => scanner.on_scan_error(link, &reason),
            Ok(other) => {
                debug!(?other, "event ignored while scanning");
                None
            }
            Err(xch::RecvTimeoutError::Timeout) => None,
            Err(xch::RecvTimeoutError::Disconnected) => {
                scanner.cancel(link);
                eyre::bail!("link event channel closed while scanning");
            }
        };
        if let Some(outcome) = outcome {
            return resolve(outcome);
        }
    }
}

fn resolve(outcome: ScanOutcome) -> Result<DiscoveredDevice> {
    match outcome {
        ScanOutcome::Found(device) => Ok(device),
        ScanOutcome::TimedOut(after) => Err(SessionError::TimedOut(after).into()),
        ScanOutcome::Failed(reason) => Err(SessionError::Scan(reason).into()),
    }
}
