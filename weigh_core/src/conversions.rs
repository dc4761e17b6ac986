//! Conversions from `weigh_config` structs to core runtime structs.

use std::time::Duration;

use crate::config::SessionCfg;
use crate::protocol::GattProfile;
use crate::registry::TargetRegistry;
use crate::stability::StabilityCfg;

// ── Stability ──
impl From<&weigh_config::Stability> for StabilityCfg {
    fn from(s: &weigh_config::Stability) -> Self {
        Self {
            window: s.window,
            readings: s.readings,
            threshold: s.threshold_g,
        }
    }
}

// ── GATT ──
impl From<&weigh_config::Gatt> for GattProfile {
    fn from(g: &weigh_config::Gatt) -> Self {
        let d = Self::default();
        Self {
            service: g.service.unwrap_or(d.service),
            user_info: g.user_info.unwrap_or(d.user_info),
            command: g.command.unwrap_or(d.command),
            weight_data: g.weight_data.unwrap_or(d.weight_data),
        }
    }
}

// ── Targets ──
impl From<&weigh_config::Targets> for TargetRegistry {
    fn from(t: &weigh_config::Targets) -> Self {
        Self::new([t.slot1.clone(), t.slot2.clone(), t.slot3.clone()])
    }
}

// ── Session ──
impl From<&weigh_config::Config> for SessionCfg {
    fn from(c: &weigh_config::Config) -> Self {
        Self {
            gatt: GattProfile::from(&c.gatt),
            scan_timeout: Duration::from_millis(c.scan.timeout_ms),
            write_timeout: Duration::from_millis(c.link.write_timeout_ms),
            stability: StabilityCfg::from(&c.stability),
        }
    }
}
