//! Runtime configuration of a session.

use std::time::Duration;

use crate::protocol::GattProfile;
use crate::stability::StabilityCfg;

/// Give up discovery after this long without a matching advertisement.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionCfg {
    pub gatt: GattProfile,
    pub scan_timeout: Duration,
    pub write_timeout: Duration,
    pub stability: StabilityCfg,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            gatt: GattProfile::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stability: StabilityCfg::default(),
        }
    }
}
