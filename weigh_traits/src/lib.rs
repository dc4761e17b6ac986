//! Seams between the scale-session core and the outside world.
//!
//! The core never talks to a radio stack or the wall clock directly: the
//! transport sits behind [`Link`] and time behind [`Clock`], so sessions can
//! be driven by real hardware, the simulator, or a scripted test double.
pub mod clock;
pub mod link;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use link::{DiscoveredDevice, Link, LinkError, LinkEvent, Ticket};
