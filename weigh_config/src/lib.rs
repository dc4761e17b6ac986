#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the scale-session workspace.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Only `[targets]` is mandatory; every other section has defaults that
//!   match the deployed scales.
use serde::Deserialize;
use uuid::Uuid;

/// Slot → advertised name (or identifier) of the scale serving that slot.
#[derive(Debug, Deserialize, Clone)]
pub struct Targets {
    pub slot1: String,
    pub slot2: String,
    pub slot3: String,
}

impl Targets {
    pub fn as_array(&self) -> [&str; 3] {
        [&self.slot1, &self.slot2, &self.slot3]
    }
}

/// GATT identifiers. Absent entries fall back to the built-in profile.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct Gatt {
    pub service: Option<Uuid>,
    pub user_info: Option<Uuid>,
    pub command: Option<Uuid>,
    pub weight_data: Option<Uuid>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Scan {
    /// Give up discovery after this many ms without a matching advertisement.
    pub timeout_ms: u64,
}

impl Default for Scan {
    fn default() -> Self {
        Self { timeout_ms: 8000 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct LinkCfg {
    /// Max time to wait for a write acknowledgement.
    pub write_timeout_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Stability {
    /// Capacity of the reading window (oldest reading dropped beyond this).
    pub window: usize,
    /// Number of most recent readings that must agree.
    pub readings: usize,
    /// Max spread (max - min) of those readings, in grams.
    pub threshold_g: f64,
}

impl Default for Stability {
    fn default() -> Self {
        Self {
            window: 10,
            readings: 5,
            threshold_g: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Simulated scale used when no radio backend is available.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Simulator {
    /// Name to advertise. When absent the simulator advertises the target of
    /// the requested slot.
    pub advertised_name: Option<String>,
    pub identifier: String,
    pub advert_interval_ms: u64,
    pub notify_interval_ms: u64,
    /// Weights sent after START; the last one repeats until stopped.
    pub readings: Vec<f64>,
    /// Unrelated devices advertised alongside the scale.
    pub ambient_devices: Vec<String>,
    /// Reject every write with a transport error.
    pub fail_writes: bool,
}

impl Default for Simulator {
    fn default() -> Self {
        Self {
            advertised_name: None,
            identifier: "24:6F:28:AA:00:01".to_string(),
            advert_interval_ms: 100,
            notify_interval_ms: 50,
            readings: vec![0.0, 120.5, 240.1, 249.8, 250.0],
            ambient_devices: vec!["Galaxy Buds".to_string(), "LE-Bose QC35".to_string()],
            fail_writes: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub targets: Targets,
    #[serde(default)]
    pub gatt: Gatt,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub link: LinkCfg,
    #[serde(default)]
    pub stability: Stability,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulator: Simulator,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Targets
        let targets = self.targets.as_array();
        for (i, t) in targets.iter().enumerate() {
            if t.trim().is_empty() {
                eyre::bail!("targets.slot{} must not be empty", i + 1);
            }
        }
        for i in 0..targets.len() {
            for j in (i + 1)..targets.len() {
                if targets[i] == targets[j] {
                    eyre::bail!(
                        "targets.slot{} and targets.slot{} must be distinct (both '{}')",
                        i + 1,
                        j + 1,
                        targets[i]
                    );
                }
            }
        }

        // GATT: characteristics must differ from each other
        let chars = [self.gatt.user_info, self.gatt.command, self.gatt.weight_data];
        for i in 0..chars.len() {
            for j in (i + 1)..chars.len() {
                if let (Some(a), Some(b)) = (chars[i], chars[j])
                    && a == b
                {
                    eyre::bail!("gatt characteristics must be distinct, {a} is used twice");
                }
            }
        }

        // Scan / link
        if self.scan.timeout_ms == 0 {
            eyre::bail!("scan.timeout_ms must be >= 1");
        }
        if self.scan.timeout_ms > 10 * 60 * 1000 {
            eyre::bail!("scan.timeout_ms is unreasonably large (>10min)");
        }
        if self.link.write_timeout_ms == 0 {
            eyre::bail!("link.write_timeout_ms must be >= 1");
        }

        // Stability
        if self.stability.readings == 0 {
            eyre::bail!("stability.readings must be >= 1");
        }
        if self.stability.window < self.stability.readings {
            eyre::bail!("stability.window must be >= stability.readings");
        }
        if !self.stability.threshold_g.is_finite() || self.stability.threshold_g < 0.0 {
            eyre::bail!("stability.threshold_g must be a finite value >= 0.0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got '{rot}'");
        }

        // Simulator
        if self.simulator.identifier.trim().is_empty() {
            eyre::bail!("simulator.identifier must not be empty");
        }
        if self.simulator.advert_interval_ms == 0 {
            eyre::bail!("simulator.advert_interval_ms must be >= 1");
        }
        if self.simulator.notify_interval_ms == 0 {
            eyre::bail!("simulator.notify_interval_ms must be >= 1");
        }
        if self.simulator.readings.iter().any(|r| !r.is_finite()) {
            eyre::bail!("simulator.readings must all be finite");
        }

        Ok(())
    }
}
