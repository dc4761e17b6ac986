//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Upper bound for a whole `measure` run unless overridden.
pub const DEFAULT_MAX_WAIT_MS: u64 = 60_000;

#[derive(Parser, Debug)]
#[command(name = "weigh", version, about = "Scale session CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/weigh.toml")]
    pub config: PathBuf,

    /// Emit JSON lines (progress, result, errors) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Weigh one item: discover the slot's scale, connect, measure until stable
    Measure {
        /// Weight slot (1, 2 or 3)
        #[arg(long)]
        slot: u8,
        /// Operator / user id sent to the scale
        #[arg(long)]
        user: String,
        /// ALU, STEEL or PLASTIC (STAAL and PLAST accepted)
        #[arg(long)]
        material: String,
        /// Confirm the result as soon as the weight settles
        #[arg(long, action = ArgAction::SetTrue)]
        auto_confirm: bool,
        /// Give up if no stable weight within this many ms
        #[arg(long, value_name = "MS")]
        max_wait_ms: Option<u64>,
    },
    /// Discover the slot's scale without connecting
    Scan {
        /// Weight slot (1, 2 or 3)
        #[arg(long)]
        slot: u8,
    },
    /// Validate config and check that the scale backend answers
    SelfCheck,
}

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}
