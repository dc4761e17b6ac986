//! Slot → target device lookup.

use crate::error::{SessionError, SessionResult};

/// Valid weight slots.
pub const SLOTS: std::ops::RangeInclusive<u8> = 1..=3;

/// Immutable mapping from weight slot to the advertised name (or identifier)
/// of the scale serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: [String; 3],
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new([
            "ESP32_Weigh_1".to_string(),
            "ESP32_Weigh_2".to_string(),
            "ESP32_Weigh_3".to_string(),
        ])
    }
}

impl TargetRegistry {
    pub fn new(targets: [String; 3]) -> Self {
        Self { targets }
    }

    /// Target for `slot`; anything outside 1..=3 is a caller error.
    pub fn resolve(&self, slot: u8) -> SessionResult<&str> {
        if !SLOTS.contains(&slot) {
            return Err(SessionError::UnknownSlot(slot));
        }
        Ok(&self.targets[usize::from(slot - 1)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        SLOTS.zip(self.targets.iter().map(String::as_str))
    }
}
