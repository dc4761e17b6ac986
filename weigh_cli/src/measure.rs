//! Command bodies: wire a simulated scale into a session and drive it.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::Result;
use serde_json::json;
use weigh_config::Config;
use weigh_core::runner::{MeasureParams, MeasurementReport, run_measurement, scan_for};
use weigh_core::{
    GattProfile, Material, ScaleSession, SessionCfg, SessionSnapshot, SessionUpdate, TargetRegistry,
    link_channel,
};
use weigh_sim::{SimGatt, SimProfile, SimulatedScale};
use weigh_traits::{DiscoveredDevice, MonotonicClock};

use crate::cli::{DEFAULT_MAX_WAIT_MS, json_mode};

pub struct MeasureArgs {
    pub slot: u8,
    pub user: String,
    pub material: String,
    pub auto_confirm: bool,
    pub max_wait_ms: Option<u64>,
}

/// Simulator profile for `target`. The simulator advertises the slot's target
/// unless the config pins a name.
pub fn sim_profile(cfg: &Config, gatt: &GattProfile, target: &str) -> SimProfile {
    let sim = &cfg.simulator;
    let sim_gatt = SimGatt {
        service: gatt.service,
        user_info: gatt.user_info,
        command: gatt.command,
        weight_data: gatt.weight_data,
    };
    let mut profile = SimProfile::new(sim_gatt, sim.identifier.clone())
        .with_name(sim.advertised_name.as_deref().unwrap_or(target))
        .with_intervals(
            Duration::from_millis(sim.advert_interval_ms),
            Duration::from_millis(sim.notify_interval_ms),
        )
        .with_readings(sim.readings.clone())
        .with_ambient(sim.ambient_devices.iter().cloned());
    profile.fail_writes = sim.fail_writes;
    profile
}

pub fn run_measure(cfg: &Config, args: MeasureArgs, shutdown: &AtomicBool) -> Result<()> {
    let material: Material = args.material.parse()?;
    let registry: TargetRegistry = (&cfg.targets).into();
    let session_cfg: SessionCfg = cfg.into();
    // An unknown slot is reported by `begin`; the simulator only needs a name.
    let target = registry.resolve(args.slot).unwrap_or_default().to_owned();

    let (tx, rx) = link_channel();
    let link = SimulatedScale::new(sim_profile(cfg, &session_cfg.gatt, &target), tx);
    let mut session = ScaleSession::new(link, rx, registry, session_cfg);

    let params = MeasureParams {
        slot: args.slot,
        user_id: args.user,
        material,
        auto_confirm: args.auto_confirm,
        max_wait: Duration::from_millis(args.max_wait_ms.unwrap_or(DEFAULT_MAX_WAIT_MS)),
    };
    tracing::info!(
        slot = params.slot,
        material = %params.material,
        auto_confirm = params.auto_confirm,
        max_wait_ms = millis(params.max_wait),
        "measure start"
    );

    let json = json_mode();
    let report = run_measurement(&mut session, &params, shutdown, |update| {
        if json {
            println!("{}", update_json(update));
        } else if let Some(line) = update_text(update) {
            println!("{line}");
        }
    })?;
    print_report(&report, &session.snapshot(), json);
    Ok(())
}

pub fn run_scan(cfg: &Config, slot: u8, shutdown: &AtomicBool) -> Result<()> {
    let registry: TargetRegistry = (&cfg.targets).into();
    let session_cfg: SessionCfg = cfg.into();
    let target = registry.resolve(slot)?.to_owned();
    let device = discover(cfg, &session_cfg, &target, shutdown)?;
    if json_mode() {
        println!(
            "{}",
            json!({
                "event": "found",
                "slot": slot,
                "identifier": device.identifier,
                "name": device.advertised_name,
            })
        );
    } else {
        println!(
            "slot {slot}: found {} ({})",
            device.identifier,
            device.advertised_name.as_deref().unwrap_or("unnamed")
        );
    }
    Ok(())
}

/// Config already validated by the caller; check that every slot resolves and
/// that slot 1's scale answers a scan.
pub fn self_check(cfg: &Config, shutdown: &AtomicBool) -> Result<()> {
    let registry: TargetRegistry = (&cfg.targets).into();
    let session_cfg: SessionCfg = cfg.into();
    for (slot, target) in registry.iter() {
        tracing::debug!(slot, target, "target ok");
    }
    let target = registry.resolve(1)?.to_owned();
    let device = discover(cfg, &session_cfg, &target, shutdown)?;
    if json_mode() {
        println!(
            "{}",
            json!({ "event": "self_check", "ok": true, "identifier": device.identifier })
        );
    } else {
        println!("self-check ok: scale {} answers", device.identifier);
    }
    Ok(())
}

fn discover(
    cfg: &Config,
    session_cfg: &SessionCfg,
    target: &str,
    shutdown: &AtomicBool,
) -> Result<DiscoveredDevice> {
    let (tx, rx) = link_channel();
    let mut link = SimulatedScale::new(sim_profile(cfg, &session_cfg.gatt, target), tx);
    scan_for(
        &mut link,
        &rx,
        &MonotonicClock::new(),
        target,
        session_cfg.scan_timeout,
        shutdown,
    )
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn update_json(update: &SessionUpdate) -> serde_json::Value {
    match update {
        SessionUpdate::DeviceFound(d) => {
            json!({ "event": "device_found", "identifier": d.identifier, "name": d.advertised_name })
        }
        SessionUpdate::Ready { identifier } => json!({ "event": "ready", "identifier": identifier }),
        SessionUpdate::Reading { weight, stable } => {
            json!({ "event": "reading", "weight_g": weight, "stable": stable })
        }
        SessionUpdate::Settled { weight } => json!({ "event": "settled", "weight_g": weight }),
        SessionUpdate::Confirmed { weight } => json!({ "event": "confirmed", "weight_g": weight }),
        SessionUpdate::ReadingRejected(e) => {
            json!({ "event": "reading_rejected", "reason": e.kind(), "message": e.to_string() })
        }
        SessionUpdate::Aborted(e) => {
            json!({ "event": "aborted", "reason": e.kind(), "message": e.to_string() })
        }
    }
}

fn update_text(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::DeviceFound(d) => Some(format!("found scale {}", d.identifier)),
        SessionUpdate::Ready { identifier } => Some(format!("connected to {identifier}, measuring")),
        SessionUpdate::Reading { weight, .. } => Some(format!("  {weight:>8.1} g")),
        SessionUpdate::Settled { weight } => Some(format!("settled at {weight:.1} g")),
        SessionUpdate::Confirmed { weight } => Some(format!("confirmed {weight:.1} g")),
        // Logged by the session; the final error is printed by main.
        SessionUpdate::ReadingRejected(_) | SessionUpdate::Aborted(_) => None,
    }
}

fn print_report(report: &MeasurementReport, snapshot: &SessionSnapshot, json: bool) {
    if json {
        let mut v = json!(report);
        v["event"] = json!("complete");
        v["snapshot"] = json!(snapshot);
        println!("{v}");
    } else {
        println!(
            "complete: slot {} {:.1} g ({}, {} readings, {} rejected)",
            report.slot,
            report.weight_g,
            if report.confirmed { "confirmed" } else { "not confirmed" },
            report.readings,
            report.rejected
        );
    }
}
