//! GATT-style transport seam.
//!
//! Requests that take a round trip through the radio (`connect`,
//! `discover_services`) return as soon as the request is accepted; their
//! completion arrives later as a [`LinkEvent`] carrying the same [`Ticket`].
//! Scan results, notifications and unsolicited link loss arrive the same way.
//! Writes are acknowledged synchronously.
use std::fmt;
use std::time::Duration;

use uuid::Uuid;

/// Error type crossing the transport boundary.
pub type LinkError = Box<dyn std::error::Error + Send + Sync>;

/// Correlates an asynchronous request with its completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ticket(pub u64);

impl Ticket {
    /// The ticket issued after this one.
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One advertisement observed while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub advertised_name: Option<String>,
    pub identifier: String,
}

impl DiscoveredDevice {
    pub fn new(identifier: impl Into<String>, advertised_name: Option<&str>) -> Self {
        Self {
            advertised_name: advertised_name.map(str::to_owned),
            identifier: identifier.into(),
        }
    }

    /// A device matches when either its advertised name or its identifier
    /// equals the target exactly.
    pub fn matches(&self, target: &str) -> bool {
        self.advertised_name.as_deref() == Some(target) || self.identifier == target
    }
}

/// Everything the transport reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Advertisement(DiscoveredDevice),
    ScanFailed {
        reason: String,
    },
    Connected {
        ticket: Ticket,
        identifier: String,
    },
    ConnectFailed {
        ticket: Ticket,
        reason: String,
    },
    ServicesDiscovered {
        ticket: Ticket,
    },
    DiscoveryFailed {
        ticket: Ticket,
        reason: String,
    },
    Notification {
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    /// The peer dropped an established link without being asked to.
    ///
    /// Implementations must not report a disconnect the session requested
    /// through [`Link::disconnect`]; the session only honours this event
    /// while its own connection to `identifier` is established.
    Disconnected {
        identifier: String,
    },
}

pub trait Link {
    fn start_scan(&mut self) -> Result<(), LinkError>;
    fn stop_scan(&mut self) -> Result<(), LinkError>;

    /// Ask for a connection; completes with `Connected` or `ConnectFailed`.
    fn connect(&mut self, ticket: Ticket, identifier: &str) -> Result<(), LinkError>;

    /// Ask for service discovery; completes with `ServicesDiscovered` or
    /// `DiscoveryFailed`.
    fn discover_services(&mut self, ticket: Ticket) -> Result<(), LinkError>;

    /// Write with response. Returns once the peer acknowledged or `timeout`
    /// elapsed.
    fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        timeout: Duration,
    ) -> Result<(), LinkError>;

    fn set_notify(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), LinkError>;

    /// Release the link. Also aborts a pending connect. Completes silently:
    /// no `LinkEvent::Disconnected` follows.
    fn disconnect(&mut self) -> Result<(), LinkError>;
}
