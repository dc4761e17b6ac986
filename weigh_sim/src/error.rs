use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("not connected")]
    NotConnected,
    #[error("scan already running")]
    ScanBusy,
    #[error("services not discovered yet")]
    NoServices,
    #[error("write acknowledgement timeout after {} ms", .0.as_millis())]
    AckTimeout(Duration),
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SimError>;
