//! Lifecycle of the one connection a session may hold.
//!
//! `Disconnected → Connecting → Connected → (services ready) → Disconnected`.
//! Connect and discovery are two-phase: the request goes out through the
//! `Link` and the completion comes back as an event with the same ticket.
//! Completions whose ticket is not the pending one are stale and ignored.
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use weigh_traits::{Link, Ticket};

use crate::error::{SessionError, SessionResult};
use crate::link_error::{Stage, map_link_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub identifier: String,
    pub state: ConnectionState,
    pub services_discovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Connect(Ticket),
    Discovery(Ticket),
}

#[derive(Debug, Clone)]
pub struct SessionConnection {
    state: ConnectionState,
    identifier: Option<String>,
    services_discovered: bool,
    pending: Option<Pending>,
    subscriptions: Vec<(Uuid, Uuid)>,
    write_timeout: Duration,
}

impl SessionConnection {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identifier: None,
            services_discovered: false,
            pending: None,
            subscriptions: Vec::new(),
            write_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn services_discovered(&self) -> bool {
        self.services_discovered
    }

    pub fn current(&self) -> Option<Connection> {
        self.identifier.as_ref().map(|id| Connection {
            identifier: id.clone(),
            state: self.state,
            services_discovered: self.services_discovered,
        })
    }

    pub fn is_subscribed(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.subscriptions.contains(&(service, characteristic))
    }

    /// Request a connection. One attempt at a time, one connection per session.
    pub fn connect<L: Link>(
        &mut self,
        link: &mut L,
        ticket: Ticket,
        identifier: &str,
    ) -> SessionResult<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(SessionError::SessionBusy);
        }
        link.connect(ticket, identifier)
            .map_err(|e| map_link_error(Stage::Connect, e.as_ref()))?;
        self.state = ConnectionState::Connecting;
        self.identifier = Some(identifier.to_owned());
        self.pending = Some(Pending::Connect(ticket));
        debug!(identifier, %ticket, "connect requested");
        Ok(())
    }

    /// Apply a connect completion. Returns false if it was stale.
    pub fn on_connected(&mut self, ticket: Ticket, identifier: &str) -> bool {
        if self.state != ConnectionState::Connecting
            || self.pending != Some(Pending::Connect(ticket))
        {
            return false;
        }
        if self.identifier.as_deref() != Some(identifier) {
            debug!(
                requested = self.identifier.as_deref().unwrap_or(""),
                reported = identifier,
                "transport reported a different identifier"
            );
            self.identifier = Some(identifier.to_owned());
        }
        self.state = ConnectionState::Connected;
        self.pending = None;
        info!(identifier, "connected");
        true
    }

    /// Apply a connect failure. Returns false if it was stale.
    pub fn on_connect_failed(&mut self, ticket: Ticket) -> bool {
        if self.pending != Some(Pending::Connect(ticket)) {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        self.identifier = None;
        self.pending = None;
        true
    }

    pub fn discover_services<L: Link>(&mut self, link: &mut L, ticket: Ticket) -> SessionResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotReady(
                "service discovery requires a connection".into(),
            ));
        }
        if self.pending.is_some() {
            return Err(SessionError::NotReady(
                "service discovery already in progress".into(),
            ));
        }
        link.discover_services(ticket)
            .map_err(|e| map_link_error(Stage::Connect, e.as_ref()))?;
        self.pending = Some(Pending::Discovery(ticket));
        debug!(%ticket, "service discovery requested");
        Ok(())
    }

    pub fn on_services_discovered(&mut self, ticket: Ticket) -> bool {
        if self.pending != Some(Pending::Discovery(ticket)) {
            return false;
        }
        self.pending = None;
        self.services_discovered = true;
        debug!("services discovered");
        true
    }

    pub fn on_discovery_failed(&mut self, ticket: Ticket) -> bool {
        if self.pending != Some(Pending::Discovery(ticket)) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Write with acknowledgement. Failures surface as `Write`, no retry.
    pub fn write<L: Link>(
        &mut self,
        link: &mut L,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> SessionResult<()> {
        self.ensure_ready()?;
        link.write(service, characteristic, value, self.write_timeout)
            .map_err(|e| map_link_error(Stage::Write, e.as_ref()))?;
        debug!(%characteristic, len = value.len(), "write acknowledged");
        Ok(())
    }

    /// Route notifications of `characteristic` to the session. Subscribing
    /// again replaces the existing route.
    pub fn subscribe<L: Link>(
        &mut self,
        link: &mut L,
        service: Uuid,
        characteristic: Uuid,
    ) -> SessionResult<()> {
        self.ensure_ready()?;
        if self.is_subscribed(service, characteristic) {
            debug!(%characteristic, "already subscribed, route replaced");
            return Ok(());
        }
        link.set_notify(service, characteristic, true)
            .map_err(|e| map_link_error(Stage::Write, e.as_ref()))?;
        self.subscriptions.push((service, characteristic));
        debug!(%characteristic, "subscribed");
        Ok(())
    }

    pub fn unsubscribe<L: Link>(
        &mut self,
        link: &mut L,
        service: Uuid,
        characteristic: Uuid,
    ) -> SessionResult<()> {
        if !self.is_subscribed(service, characteristic) {
            return Ok(());
        }
        self.subscriptions.retain(|s| *s != (service, characteristic));
        link.set_notify(service, characteristic, false)
            .map_err(|e| map_link_error(Stage::Write, e.as_ref()))
    }

    /// Whether a notification of this characteristic has a route.
    pub fn accepts(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.state == ConnectionState::Connected && self.is_subscribed(service, characteristic)
    }

    /// Unsubscribe everything and release the link. Safe from any state.
    pub fn disconnect<L: Link>(&mut self, link: &mut L) {
        if self.state == ConnectionState::Disconnected && self.pending.is_none() {
            return;
        }
        for (service, characteristic) in std::mem::take(&mut self.subscriptions) {
            if let Err(e) = link.set_notify(service, characteristic, false) {
                warn!(error = %e, %characteristic, "unsubscribe failed during teardown");
            }
        }
        if let Err(e) = link.disconnect() {
            warn!(error = %e, "disconnect failed");
        }
        info!(
            identifier = self.identifier.as_deref().unwrap_or(""),
            "disconnected"
        );
        self.state = ConnectionState::Disconnected;
        self.identifier = None;
        self.services_discovered = false;
        self.pending = None;
    }

    fn ensure_ready(&self) -> SessionResult<()> {
        if self.state != ConnectionState::Connected || !self.services_discovered {
            return Err(SessionError::NotReady(
                "characteristic I/O before service discovery".into(),
            ));
        }
        Ok(())
    }
}
