//! Test and helper mocks for weigh_core

use std::time::Duration;

use uuid::Uuid;
use weigh_traits::{Link, LinkError, Ticket};

/// One request the session made of its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    StartScan,
    StopScan,
    Connect { ticket: Ticket, identifier: String },
    DiscoverServices { ticket: Ticket },
    Write { characteristic: Uuid, value: Vec<u8> },
    SetNotify { characteristic: Uuid, enabled: bool },
    Disconnect,
}

/// A link that records every call and never produces events by itself.
///
/// Tests drive completions by sending `LinkEvent`s on the channel the
/// session reads from; the `fail_*` knobs make the next matching call fail.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    calls: Vec<LinkCall>,
    pub fail_start_scan: Option<String>,
    pub fail_connect: Option<String>,
    /// Fail writes to this characteristic.
    pub fail_write_to: Option<Uuid>,
    pub fail_set_notify: Option<String>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[LinkCall] {
        &self.calls
    }

    pub fn count(&self, pred: impl Fn(&LinkCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Payloads written to `characteristic`, in order.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                LinkCall::Write {
                    characteristic: ch,
                    value,
                } if *ch == characteristic => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ticket of the most recent connect request.
    pub fn connect_ticket(&self) -> Option<Ticket> {
        self.calls.iter().rev().find_map(|c| match c {
            LinkCall::Connect { ticket, .. } => Some(*ticket),
            _ => None,
        })
    }

    /// Ticket of the most recent service discovery request.
    pub fn discovery_ticket(&self) -> Option<Ticket> {
        self.calls.iter().rev().find_map(|c| match c {
            LinkCall::DiscoverServices { ticket } => Some(*ticket),
            _ => None,
        })
    }
}

fn fail(reason: &str) -> LinkError {
    Box::new(std::io::Error::other(reason.to_owned()))
}

impl Link for ScriptedLink {
    fn start_scan(&mut self) -> Result<(), LinkError> {
        self.calls.push(LinkCall::StartScan);
        self.fail_start_scan.as_deref().map_or(Ok(()), |r| Err(fail(r)))
    }

    fn stop_scan(&mut self) -> Result<(), LinkError> {
        self.calls.push(LinkCall::StopScan);
        Ok(())
    }

    fn connect(&mut self, ticket: Ticket, identifier: &str) -> Result<(), LinkError> {
        self.calls.push(LinkCall::Connect {
            ticket,
            identifier: identifier.to_owned(),
        });
        self.fail_connect.as_deref().map_or(Ok(()), |r| Err(fail(r)))
    }

    fn discover_services(&mut self, ticket: Ticket) -> Result<(), LinkError> {
        self.calls.push(LinkCall::DiscoverServices { ticket });
        Ok(())
    }

    fn write(
        &mut self,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        _timeout: Duration,
    ) -> Result<(), LinkError> {
        self.calls.push(LinkCall::Write {
            characteristic,
            value: value.to_vec(),
        });
        if self.fail_write_to == Some(characteristic) {
            return Err(fail("gatt write rejected by peer"));
        }
        Ok(())
    }

    fn set_notify(
        &mut self,
        _service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), LinkError> {
        self.calls.push(LinkCall::SetNotify {
            characteristic,
            enabled,
        });
        self.fail_set_notify.as_deref().map_or(Ok(()), |r| Err(fail(r)))
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.calls.push(LinkCall::Disconnect);
        Ok(())
    }
}
