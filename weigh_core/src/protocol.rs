//! Wire vocabulary of the scale service.
//!
//! Every payload is ASCII text:
//! - USER_INFO (write): `USER:<user id>;MAT:<material>`
//! - COMMAND (write): `START` or `CONFIRM_RESULT`
//! - WEIGHT_DATA (notify): a decimal weight in grams, e.g. `249.8`
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xab49b033_1163_48db_931c_9c2a3002ee1d);
pub const USER_INFO_CHAR_UUID: Uuid = Uuid::from_u128(0xab49b033_1163_48db_931c_9c2a3002ee1f);
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0xab49b033_1163_48db_931c_9c2a3002ee1e);
pub const WEIGHT_DATA_CHAR_UUID: Uuid = Uuid::from_u128(0xab49b033_1163_48db_931c_9c2a3002ee20);

/// Service and characteristic identifiers used by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,
    pub user_info: Uuid,
    pub command: Uuid,
    pub weight_data: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            user_info: USER_INFO_CHAR_UUID,
            command: COMMAND_CHAR_UUID,
            weight_data: WEIGHT_DATA_CHAR_UUID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Material {
    Alu,
    Steel,
    Plastic,
}

impl Material {
    pub const ALL: [Self; 3] = [Self::Alu, Self::Steel, Self::Plastic];

    /// Name carried on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alu => "ALU",
            Self::Steel => "STEEL",
            Self::Plastic => "PLASTIC",
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Material {
    type Err = SessionError;

    /// Case-insensitive; the Danish labels `STAAL` and `PLAST` used on the
    /// operator screens are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALU" => Ok(Self::Alu),
            "STEEL" | "STAAL" => Ok(Self::Steel),
            "PLASTIC" | "PLAST" => Ok(Self::Plastic),
            _ => Err(SessionError::Validation(format!(
                "unknown material '{s}' (expected ALU, STEEL or PLASTIC)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ConfirmResult,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::ConfirmResult => "CONFIRM_RESULT",
        }
    }
}

/// Reject user ids the USER_INFO framing cannot carry.
pub fn validate_user_id(user_id: &str) -> SessionResult<()> {
    if user_id.is_empty() {
        return Err(SessionError::Validation("user id must not be empty".into()));
    }
    if user_id.contains([':', ';']) {
        return Err(SessionError::Validation(format!(
            "user id '{user_id}' must not contain ':' or ';'"
        )));
    }
    Ok(())
}

pub fn encode_user_info(user_id: &str, material: Material) -> SessionResult<Vec<u8>> {
    validate_user_id(user_id)?;
    Ok(format!("USER:{user_id};MAT:{material}").into_bytes())
}

pub fn encode_command(cmd: Command) -> Vec<u8> {
    cmd.as_str().as_bytes().to_vec()
}

/// Parse a WEIGHT_DATA notification into grams.
///
/// Surrounding whitespace and NUL padding are ignored. Anything that is not a
/// finite decimal number is `MalformedReading`.
pub fn decode_reading(bytes: &[u8]) -> SessionResult<f64> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SessionError::MalformedReading(String::from_utf8_lossy(bytes).into_owned()))?;
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SessionError::MalformedReading(trimmed.to_owned())),
    }
}
