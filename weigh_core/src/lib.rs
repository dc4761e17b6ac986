#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Scale-session core (transport-agnostic).
//!
//! This crate drives one weighing session against a remote scale. All radio
//! interaction goes through `weigh_traits::Link`; time comes from
//! `weigh_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Registry**: slot → target device (`registry` module)
//! - **Protocol**: USER_INFO / COMMAND / WEIGHT_DATA payloads (`protocol` module)
//! - **Stability**: sliding-window settle detection (`stability` module)
//! - **Discovery**: target matching with a deadline (`scanner` module)
//! - **Connection**: ticketed connect/discovery, writes, subscriptions (`connection` module)
//! - **Session**: the orchestrating state machine (`session` module)
//! - **Runner**: blocking drivers for a whole measurement or a bare scan (`runner` module)

pub mod config;
pub mod connection;
pub mod conversions;
pub mod error;
pub mod link_error;
pub mod mocks;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod scanner;
pub mod session;
pub mod stability;
pub mod status;

pub use config::SessionCfg;
pub use connection::{Connection, ConnectionState, SessionConnection};
pub use error::{SessionError, SessionResult};
pub use protocol::{Command, GattProfile, Material};
pub use registry::TargetRegistry;
pub use scanner::{DeviceScanner, ScanOutcome, ScanState};
pub use session::{ScaleSession, SessionContext, link_channel};
pub use stability::{StabilityCfg, StabilityDetector};
pub use status::{SessionSnapshot, SessionState, SessionUpdate};
