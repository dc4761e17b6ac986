#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Simulated scale peripheral.
//!
//! `SimulatedScale` implements `weigh_traits::Link` the way the scale
//! firmware behaves: it advertises (next to some unrelated devices) while a
//! scan runs, accepts USER_INFO and COMMAND writes, and after `START` pushes
//! WEIGHT_DATA notifications from a scripted list whose last value repeats.
//! Everything it reports goes out on the session's event channel.
pub mod error;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel as xch;
use uuid::Uuid;
use weigh_traits::{DiscoveredDevice, Link, LinkError, LinkEvent, Ticket};

use crate::error::SimError;
use crate::worker::{Worker, pause};

/// Identifiers of the simulated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimGatt {
    pub service: Uuid,
    pub user_info: Uuid,
    pub command: Uuid,
    pub weight_data: Uuid,
}

#[derive(Debug, Clone)]
pub struct SimProfile {
    pub gatt: SimGatt,
    pub identifier: String,
    pub advertised_name: Option<String>,
    pub advert_interval: Duration,
    pub notify_interval: Duration,
    /// Weights sent after `START`; the last one repeats.
    pub readings: Vec<f64>,
    /// Names of unrelated devices advertised alongside the scale.
    pub ambient_devices: Vec<String>,
    /// Reject every write as unacknowledged.
    pub fail_writes: bool,
}

impl SimProfile {
    pub fn new(gatt: SimGatt, identifier: impl Into<String>) -> Self {
        Self {
            gatt,
            identifier: identifier.into(),
            advertised_name: None,
            advert_interval: Duration::from_millis(100),
            notify_interval: Duration::from_millis(50),
            readings: Vec::new(),
            ambient_devices: Vec::new(),
            fail_writes: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.advertised_name = Some(name.into());
        self
    }

    pub fn with_readings(mut self, readings: impl Into<Vec<f64>>) -> Self {
        self.readings = readings.into();
        self
    }

    pub fn with_intervals(mut self, advert: Duration, notify: Duration) -> Self {
        self.advert_interval = advert;
        self.notify_interval = notify;
        self
    }

    pub fn with_ambient(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ambient_devices = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A write the simulated peripheral acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWrite {
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

/// Observation and fault injection for a `SimulatedScale` that has been
/// moved into a session.
#[derive(Clone)]
pub struct SimHandle {
    identifier: String,
    events: xch::Sender<LinkEvent>,
    writes: Arc<Mutex<Vec<SimWrite>>>,
}

impl SimHandle {
    /// Acknowledged writes to `characteristic`, as text.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<String> {
        self.writes
            .lock()
            .map(|w| {
                w.iter()
                    .filter(|w| w.characteristic == characteristic)
                    .map(|w| String::from_utf8_lossy(&w.value).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Report an unsolicited link loss.
    pub fn drop_link(&self) {
        let _ = self.events.send(LinkEvent::Disconnected {
            identifier: self.identifier.clone(),
        });
    }

    /// Push an arbitrary event, e.g. a garbled notification.
    pub fn inject(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}

pub struct SimulatedScale {
    profile: SimProfile,
    events: xch::Sender<LinkEvent>,
    advertiser: Option<Worker>,
    notifier: Option<Worker>,
    connected: bool,
    services_discovered: bool,
    notify_enabled: Arc<AtomicBool>,
    writes: Arc<Mutex<Vec<SimWrite>>>,
}

impl SimulatedScale {
    pub fn new(profile: SimProfile, events: xch::Sender<LinkEvent>) -> Self {
        Self {
            profile,
            events,
            advertiser: None,
            notifier: None,
            connected: false,
            services_discovered: false,
            notify_enabled: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            identifier: self.profile.identifier.clone(),
            events: self.events.clone(),
            writes: self.writes.clone(),
        }
    }

    pub fn profile(&self) -> &SimProfile {
        &self.profile
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_scanning(&self) -> bool {
        self.advertiser.is_some()
    }

    fn emit(&self, event: LinkEvent) -> Result<(), SimError> {
        self.events.send(event).map_err(|_| SimError::ChannelClosed)
    }

    fn start_notifier(&mut self) {
        // Restart from the first reading on every START.
        self.notifier = None;
        let readings = self.profile.readings.clone();
        let interval = self.profile.notify_interval;
        let service = self.profile.gatt.service;
        let characteristic = self.profile.gatt.weight_data;
        let enabled = self.notify_enabled.clone();
        let tx = self.events.clone();
        self.notifier = Some(Worker::spawn(move |shutdown| {
            let mut next = 0usize;
            while pause(shutdown, interval) {
                if !enabled.load(Ordering::Relaxed) {
                    continue;
                }
                let Some(weight) = readings.get(next).or(readings.last()) else {
                    break;
                };
                next += 1;
                let value = format!("{weight}").into_bytes();
                if tx
                    .send(LinkEvent::Notification {
                        service,
                        characteristic,
                        value,
                    })
                    .is_err()
                {
                    tracing::debug!("sim notifier consumer disconnected, exiting");
                    break;
                }
            }
        }));
    }

    fn ensure_services(&self) -> Result<(), SimError> {
        if !self.connected {
            return Err(SimError::NotConnected);
        }
        if !self.services_discovered {
            return Err(SimError::NoServices);
        }
        Ok(())
    }

    fn apply_write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<(), SimError> {
        let gatt = self.profile.gatt;
        if characteristic == gatt.command {
            match value {
                b"START" => self.start_notifier(),
                b"CONFIRM_RESULT" => self.notifier = None,
                other => {
                    return Err(SimError::UnknownCommand(
                        String::from_utf8_lossy(other).into_owned(),
                    ));
                }
            }
        } else if characteristic != gatt.user_info {
            return Err(SimError::UnknownCharacteristic(characteristic));
        }
        if let Ok(mut log) = self.writes.lock() {
            log.push(SimWrite {
                characteristic,
                value: value.to_vec(),
            });
        }
        Ok(())
    }
}

impl Link for SimulatedScale {
    fn start_scan(&mut self) -> Result<(), LinkError> {
        if self.advertiser.is_some() {
            return Err(SimError::ScanBusy.into());
        }
        let mut adverts: Vec<DiscoveredDevice> = self
            .profile
            .ambient_devices
            .iter()
            .enumerate()
            .map(|(i, name)| DiscoveredDevice::new(format!("5C:F3:70:00:00:{i:02X}"), Some(name.as_str())))
            .collect();
        adverts.push(DiscoveredDevice::new(
            self.profile.identifier.clone(),
            self.profile.advertised_name.as_deref(),
        ));
        let interval = self.profile.advert_interval;
        let tx = self.events.clone();
        self.advertiser = Some(Worker::spawn(move |shutdown| {
            'scan: loop {
                for advert in &adverts {
                    if shutdown.load(Ordering::Relaxed) {
                        break 'scan;
                    }
                    if tx.send(LinkEvent::Advertisement(advert.clone())).is_err() {
                        tracing::debug!("sim advertiser consumer disconnected, exiting");
                        break 'scan;
                    }
                }
                if !pause(shutdown, interval) {
                    break;
                }
            }
        }));
        tracing::debug!(identifier = %self.profile.identifier, "sim advertising");
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), LinkError> {
        self.advertiser = None;
        Ok(())
    }

    fn connect(&mut self, ticket: Ticket, identifier: &str) -> Result<(), LinkError> {
        if identifier == self.profile.identifier {
            self.connected = true;
            self.emit(LinkEvent::Connected {
                ticket,
                identifier: identifier.to_owned(),
            })?;
        } else {
            self.emit(LinkEvent::ConnectFailed {
                ticket,
                reason: format!("no device {identifier} in range"),
            })?;
        }
        Ok(())
    }

    fn discover_services(&mut self, ticket: Ticket) -> Result<(), LinkError> {
        if !self.connected {
            return Err(SimError::NotConnected.into());
        }
        self.services_discovered = true;
        self.emit(LinkEvent::ServicesDiscovered { ticket })?;
        Ok(())
    }

    fn write(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        timeout: Duration,
    ) -> Result<(), LinkError> {
        self.ensure_services()?;
        if service != self.profile.gatt.service {
            return Err(SimError::UnknownCharacteristic(characteristic).into());
        }
        if self.profile.fail_writes {
            return Err(SimError::AckTimeout(timeout).into());
        }
        self.apply_write(characteristic, value)?;
        Ok(())
    }

    fn set_notify(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), LinkError> {
        self.ensure_services()?;
        if service != self.profile.gatt.service || characteristic != self.profile.gatt.weight_data {
            return Err(SimError::UnknownCharacteristic(characteristic).into());
        }
        self.notify_enabled.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.notifier = None;
        self.notify_enabled.store(false, Ordering::Relaxed);
        self.connected = false;
        self.services_discovered = false;
        Ok(())
    }
}
