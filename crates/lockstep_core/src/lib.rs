//! Lockstep Core
//!
//! Data model shared by every other crate:
//! - Deterministic 60Hz tick clock
//! - Packed per-tick player input
//! - Vector math and the reference motion rule

pub mod input;
pub mod math;
pub mod motion;
pub mod time;

pub use glam;

pub use input::{Button, InputFrame, InputSource, PackedInput};
pub use time::{Tick, TickClock};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
