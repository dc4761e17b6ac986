//! The scale-session orchestrator.
//!
//! `ScaleSession` owns the transport, the event receiver and one attempt at a
//! time. All transport completions are consumed here, on the caller's thread,
//! through [`ScaleSession::poll`] or [`ScaleSession::next_update`]; nothing in
//! the session is shared across threads.
//!
//! ```text
//! Idle --begin--> Scanning --found--> Connecting --ready--> Connected
//!   --start_measurement--> Measuring --settled--> Stable --confirm--> Confirmed
//! ```
//! Any failure, `cancel()` or `close()` returns to `Idle`.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use weigh_traits::{Clock, DiscoveredDevice, Link, LinkEvent, MonotonicClock, Ticket};

use crate::config::SessionCfg;
use crate::connection::{ConnectionState, SessionConnection};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{self, Command, Material};
use crate::registry::TargetRegistry;
use crate::scanner::{DeviceScanner, ScanOutcome};
use crate::stability::StabilityDetector;
use crate::status::{SessionSnapshot, SessionState, SessionUpdate};

/// Who is weighing what, fixed for the lifetime of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub slot: u8,
    pub user_id: String,
    pub material: Material,
}

impl SessionContext {
    /// Surrounding whitespace of `user_id` is trimmed before validation.
    pub fn new(slot: u8, user_id: &str, material: Material) -> SessionResult<Self> {
        let user_id = user_id.trim();
        protocol::validate_user_id(user_id)?;
        Ok(Self {
            slot,
            user_id: user_id.to_owned(),
            material,
        })
    }
}

/// Everything that lives exactly as long as one `begin` .. `Idle` cycle.
struct Attempt {
    context: SessionContext,
    scanner: DeviceScanner,
    connection: SessionConnection,
    detector: StabilityDetector,
    current_weight: Option<f64>,
}

impl Attempt {
    fn new(context: SessionContext, cfg: &SessionCfg) -> Self {
        Self {
            context,
            scanner: DeviceScanner::new(cfg.scan_timeout),
            connection: SessionConnection::new(cfg.write_timeout),
            detector: StabilityDetector::new(cfg.stability),
            current_weight: None,
        }
    }

    fn teardown<L: Link>(&mut self, link: &mut L) {
        self.scanner.cancel(link);
        self.connection.disconnect(link);
        self.detector.reset();
    }
}

/// Unbounded channel for transport events; the sender goes to the `Link`.
pub fn link_channel() -> (xch::Sender<LinkEvent>, xch::Receiver<LinkEvent>) {
    xch::unbounded()
}

pub struct ScaleSession<L: Link, C: Clock = MonotonicClock> {
    link: L,
    events: xch::Receiver<LinkEvent>,
    clock: C,
    registry: TargetRegistry,
    cfg: SessionCfg,
    state: SessionState,
    attempt: Option<Attempt>,
    tickets: Ticket,
    confirmed_weight: Option<f64>,
    last_error: Option<SessionError>,
    outbox: VecDeque<SessionUpdate>,
}

impl<L: Link> ScaleSession<L, MonotonicClock> {
    pub fn new(
        link: L,
        events: xch::Receiver<LinkEvent>,
        registry: TargetRegistry,
        cfg: SessionCfg,
    ) -> Self {
        Self::with_clock(link, events, registry, cfg, MonotonicClock::new())
    }
}

impl<L: Link, C: Clock> ScaleSession<L, C> {
    pub fn with_clock(
        link: L,
        events: xch::Receiver<LinkEvent>,
        registry: TargetRegistry,
        cfg: SessionCfg,
        clock: C,
    ) -> Self {
        Self {
            link,
            events,
            clock,
            registry,
            cfg,
            state: SessionState::Idle,
            attempt: None,
            tickets: Ticket::default(),
            confirmed_weight: None,
            last_error: None,
            outbox: VecDeque::new(),
        }
    }

    // ── Observable state ──

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> Option<&SessionContext> {
        self.attempt.as_ref().map(|a| &a.context)
    }

    pub fn current_weight(&self) -> Option<f64> {
        self.attempt.as_ref().and_then(|a| a.current_weight)
    }

    pub fn is_weight_stable(&self) -> bool {
        matches!(self.state, SessionState::Stable | SessionState::Confirmed)
    }

    pub fn is_scanning(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.scanner.is_scanning())
    }

    pub fn connected_device_id(&self) -> Option<&str> {
        self.attempt.as_ref().and_then(|a| {
            (a.connection.state() == crate::connection::ConnectionState::Connected)
                .then(|| a.connection.identifier())
                .flatten()
        })
    }

    pub fn confirmed_weight(&self) -> Option<f64> {
        self.confirmed_weight
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn cfg(&self) -> &SessionCfg {
        &self.cfg
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            scanning: self.is_scanning(),
            connected_device_id: self.connected_device_id().map(str::to_owned),
            selected_slot: self.context().map(|c| c.slot),
            current_weight: self.current_weight(),
            is_weight_stable: self.is_weight_stable(),
            confirmed_weight: self.confirmed_weight,
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    // ── Caller operations ──

    /// Start an attempt: validate, resolve the slot and start scanning.
    ///
    /// Fails before any I/O on bad input. Rejected with `SessionBusy` unless
    /// the session is `Idle`.
    pub fn begin(&mut self, slot: u8, user_id: &str, material: Material) -> SessionResult<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::SessionBusy);
        }
        let context = SessionContext::new(slot, user_id, material)?;
        let target = self.registry.resolve(slot)?.to_owned();

        let mut attempt = Attempt::new(context, &self.cfg);
        self.outbox.clear();
        self.confirmed_weight = None;
        self.last_error = None;

        attempt
            .scanner
            .start(&mut self.link, &target, self.clock.now())
            .inspect_err(|e| error!(error = %e, slot, "could not start scan"))?;
        info!(
            slot,
            target = %target,
            user = %attempt.context.user_id,
            material = %material,
            "session started, scanning"
        );
        self.attempt = Some(attempt);
        self.state = SessionState::Scanning;
        Ok(())
    }

    /// Requires `Connected`: reset the detector, write `START` and subscribe
    /// to weight notifications.
    pub fn start_measurement(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotReady(format!(
                "start_measurement requires a connected session (state: {})",
                self.state
            )));
        }
        self.arm_measurement()
    }

    /// Drop local readings and start over on the same connection.
    pub fn reset_and_measure_again(&mut self) -> SessionResult<()> {
        if !matches!(self.state, SessionState::Measuring | SessionState::Stable) {
            return Err(SessionError::NotReady(format!(
                "nothing to measure again (state: {})",
                self.state
            )));
        }
        info!("measuring again");
        self.arm_measurement()
    }

    /// Write `CONFIRM_RESULT` for the current weight and return it.
    pub fn confirm(&mut self) -> SessionResult<f64> {
        if !matches!(self.state, SessionState::Measuring | SessionState::Stable) {
            return Err(SessionError::NotReady(format!(
                "confirm requires a measurement (state: {})",
                self.state
            )));
        }
        let gatt = self.cfg.gatt;
        let attempt = self
            .attempt
            .as_mut()
            .ok_or_else(|| SessionError::NotReady("no active attempt".into()))?;
        let weight = attempt
            .current_weight
            .ok_or_else(|| SessionError::Validation("no reading to confirm yet".into()))?;

        let written = attempt.connection.write(
            &mut self.link,
            gatt.service,
            gatt.command,
            &protocol::encode_command(Command::ConfirmResult),
        );
        if let Err(e) = written {
            self.abort(e.clone());
            return Err(e);
        }
        if let Err(e) = attempt
            .connection
            .unsubscribe(&mut self.link, gatt.service, gatt.weight_data)
        {
            warn!(error = %e, "unsubscribe after confirm failed");
        }
        self.state = SessionState::Confirmed;
        self.confirmed_weight = Some(weight);
        self.outbox.push_back(SessionUpdate::Confirmed { weight });
        info!(weight, "result confirmed");
        Ok(weight)
    }

    /// Abandon whatever is in flight and return to `Idle`. Safe from any
    /// state; completions of the abandoned requests are discarded.
    pub fn cancel(&mut self) {
        if let Some(mut attempt) = self.attempt.take() {
            info!(state = %self.state, "session cancelled");
            attempt.teardown(&mut self.link);
        }
        self.state = SessionState::Idle;
    }

    /// Release the connection once the caller is done with a result.
    /// Returns the confirmed weight, if any.
    pub fn close(&mut self) -> Option<f64> {
        if let Some(mut attempt) = self.attempt.take() {
            debug!(state = %self.state, "session closed");
            attempt.teardown(&mut self.link);
        }
        self.state = SessionState::Idle;
        self.confirmed_weight
    }

    // ── Event loop ──

    /// Check the scan deadline, consume every queued transport event and
    /// return the updates produced.
    /// The deadline is checked first, so an advertisement that arrives after
    /// it no longer connects.
    pub fn poll(&mut self) -> Vec<SessionUpdate> {
        self.check_scan_deadline();
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        self.outbox.drain(..).collect()
    }

    /// Block up to `max_wait` of clock time for the next update.
    ///
    /// A quiet wait that the clock did not see pass (a `ManualClock`) is
    /// made up with `Clock::sleep`, so deadlines fire under any clock.
    pub fn next_update(&mut self, max_wait: Duration) -> Option<SessionUpdate> {
        let give_up = self.clock.now() + max_wait;
        loop {
            self.check_scan_deadline();
            if let Some(update) = self.outbox.pop_front() {
                return Some(update);
            }
            let now = self.clock.now();
            if now >= give_up {
                return None;
            }
            let mut wait = give_up - now;
            if let Some(deadline) = self.scan_deadline() {
                wait = wait.min(deadline.saturating_duration_since(now));
            }
            match self.events.recv_timeout(wait) {
                Ok(event) => self.handle_event(event),
                Err(xch::RecvTimeoutError::Timeout) => {
                    let seen = self.clock.now().saturating_duration_since(now);
                    if seen < wait {
                        self.clock.sleep(wait - seen);
                    }
                }
                Err(xch::RecvTimeoutError::Disconnected) => {
                    self.check_scan_deadline();
                    return self.outbox.pop_front();
                }
            }
        }
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: LinkEvent) {
        trace!(?event, state = %self.state, "link event");
        match event {
            LinkEvent::Advertisement(device) => self.on_advertisement(&device),
            LinkEvent::ScanFailed { reason } => self.on_scan_failed(&reason),
            LinkEvent::Connected { ticket, identifier } => self.on_connected(ticket, &identifier),
            LinkEvent::ConnectFailed { ticket, reason } => self.on_connect_failed(ticket, reason),
            LinkEvent::ServicesDiscovered { ticket } => self.on_services_discovered(ticket),
            LinkEvent::DiscoveryFailed { ticket, reason } => {
                self.on_discovery_failed(ticket, reason);
            }
            LinkEvent::Notification {
                service,
                characteristic,
                value,
            } => self.on_notification(service, characteristic, &value),
            LinkEvent::Disconnected { identifier } => self.on_link_lost(&identifier),
        }
    }

    fn scan_deadline(&self) -> Option<Instant> {
        self.attempt.as_ref().and_then(|a| a.scanner.deadline())
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.tickets = self.tickets.next();
        self.tickets
    }

    fn check_scan_deadline(&mut self) {
        if self.state != SessionState::Scanning {
            return;
        }
        let now = self.clock.now();
        let outcome = self
            .attempt
            .as_mut()
            .and_then(|a| a.scanner.poll_deadline(&mut self.link, now));
        if let Some(ScanOutcome::TimedOut(after)) = outcome {
            self.abort(SessionError::TimedOut(after));
        }
    }

    fn on_advertisement(&mut self, device: &DiscoveredDevice) {
        if self.state != SessionState::Scanning {
            return;
        }
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let Some(ScanOutcome::Found(found)) =
            attempt.scanner.on_advertisement(&mut self.link, device)
        else {
            return;
        };
        self.state = SessionState::Connecting;
        self.tickets = self.tickets.next();
        let ticket = self.tickets;
        let requested = attempt
            .connection
            .connect(&mut self.link, ticket, &found.identifier);
        self.outbox.push_back(SessionUpdate::DeviceFound(found));
        if let Err(e) = requested {
            self.abort(e);
        }
    }

    fn on_scan_failed(&mut self, reason: &str) {
        if self.state != SessionState::Scanning {
            return;
        }
        let outcome = self
            .attempt
            .as_mut()
            .and_then(|a| a.scanner.on_scan_error(&mut self.link, reason));
        if let Some(ScanOutcome::Failed(reason)) = outcome {
            self.abort(SessionError::Scan(reason));
        }
    }

    fn on_connected(&mut self, ticket: Ticket, identifier: &str) {
        if self.state != SessionState::Connecting {
            debug!(%ticket, "connect completion outside an attempt discarded");
            return;
        }
        let discovery = self.issue_ticket();
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        if !attempt.connection.on_connected(ticket, identifier) {
            debug!(%ticket, "stale connect completion discarded");
            return;
        }
        if let Err(e) = attempt
            .connection
            .discover_services(&mut self.link, discovery)
        {
            self.abort(e);
        }
    }

    fn on_connect_failed(&mut self, ticket: Ticket, reason: String) {
        if self.state != SessionState::Connecting {
            return;
        }
        let current = self
            .attempt
            .as_mut()
            .is_some_and(|a| a.connection.on_connect_failed(ticket));
        if current {
            self.abort(SessionError::Connect(reason));
        } else {
            debug!(%ticket, "stale connect failure discarded");
        }
    }

    fn on_discovery_failed(&mut self, ticket: Ticket, reason: String) {
        if self.state != SessionState::Connecting {
            return;
        }
        let current = self
            .attempt
            .as_mut()
            .is_some_and(|a| a.connection.on_discovery_failed(ticket));
        if current {
            self.abort(SessionError::Connect(format!(
                "service discovery failed: {reason}"
            )));
        }
    }

    fn on_services_discovered(&mut self, ticket: Ticket) {
        if self.state != SessionState::Connecting {
            return;
        }
        let gatt = self.cfg.gatt;
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        if !attempt.connection.on_services_discovered(ticket) {
            debug!(%ticket, "stale discovery completion discarded");
            return;
        }
        let payload =
            match protocol::encode_user_info(&attempt.context.user_id, attempt.context.material) {
                Ok(p) => p,
                Err(e) => {
                    self.abort(e);
                    return;
                }
            };
        let written =
            attempt
                .connection
                .write(&mut self.link, gatt.service, gatt.user_info, &payload);
        match written {
            Ok(()) => {
                let identifier = attempt
                    .connection
                    .identifier()
                    .unwrap_or_default()
                    .to_owned();
                info!(
                    identifier = %identifier,
                    user = %attempt.context.user_id,
                    material = %attempt.context.material,
                    "user info written, ready to measure"
                );
                self.state = SessionState::Connected;
                self.outbox.push_back(SessionUpdate::Ready { identifier });
            }
            Err(e) => self.abort(e),
        }
    }

    fn on_notification(&mut self, service: Uuid, characteristic: Uuid, value: &[u8]) {
        if !matches!(self.state, SessionState::Measuring | SessionState::Stable) {
            trace!(%characteristic, "notification outside a measurement ignored");
            return;
        }
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        if !attempt.connection.accepts(service, characteristic) {
            trace!(%characteristic, "notification without a route ignored");
            return;
        }
        let weight = match protocol::decode_reading(value) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "reading dropped");
                self.outbox.push_back(SessionUpdate::ReadingRejected(e));
                return;
            }
        };
        attempt.current_weight = Some(weight);
        let verdict = attempt.detector.update(weight);
        debug!(weight, stable = verdict, "reading");

        if self.state == SessionState::Measuring && verdict {
            self.state = SessionState::Stable;
            info!(weight, "weight settled");
            self.outbox.push_back(SessionUpdate::Reading {
                weight,
                stable: true,
            });
            self.outbox.push_back(SessionUpdate::Settled { weight });
        } else {
            self.outbox.push_back(SessionUpdate::Reading {
                weight,
                stable: self.state == SessionState::Stable,
            });
        }
    }

    /// Only an established link can be lost; a connect still in flight fails
    /// through `ConnectFailed` instead.
    fn on_link_lost(&mut self, identifier: &str) {
        let ours = self
            .attempt
            .as_ref()
            .filter(|a| a.connection.state() == ConnectionState::Connected)
            .and_then(|a| a.connection.identifier())
            .is_some_and(|id| id == identifier);
        if !ours {
            debug!(identifier, state = %self.state, "disconnect outside an established link ignored");
            return;
        }
        self.abort(SessionError::Connect("link lost".into()));
    }

    fn arm_measurement(&mut self) -> SessionResult<()> {
        let gatt = self.cfg.gatt;
        let attempt = self
            .attempt
            .as_mut()
            .ok_or_else(|| SessionError::NotReady("no active attempt".into()))?;
        attempt.detector.reset();
        attempt.current_weight = None;

        let start = protocol::encode_command(Command::Start);
        let mut armed = attempt
            .connection
            .write(&mut self.link, gatt.service, gatt.command, &start);
        if armed.is_ok() {
            armed = attempt
                .connection
                .subscribe(&mut self.link, gatt.service, gatt.weight_data);
        }
        match armed {
            Ok(()) => {
                self.state = SessionState::Measuring;
                info!("measurement started");
                Ok(())
            }
            Err(e) => {
                self.abort(e.clone());
                Err(e)
            }
        }
    }

    /// End the attempt with `err` and return to `Idle`.
    fn abort(&mut self, err: SessionError) {
        error!(error = %err, state = %self.state, "attempt aborted");
        if let Some(mut attempt) = self.attempt.take() {
            attempt.teardown(&mut self.link);
        }
        self.state = SessionState::Idle;
        self.last_error = Some(err.clone());
        self.outbox.push_back(SessionUpdate::Aborted(err));
    }
}

impl<L: Link, C: Clock> Drop for ScaleSession<L, C> {
    fn drop(&mut self) {
        if let Some(mut attempt) = self.attempt.take() {
            attempt.teardown(&mut self.link);
        }
    }
}
