//! Lockstep Services Layer
//!
//! Host-side plumbing around the engine: settings files and local input sources.

pub mod input;
pub mod settings;

pub use input::{HeldInput, ScriptedInput, SharedInput};
pub use settings::{RuntimeSettings, Settings, SettingsError, SimulationSettings};
