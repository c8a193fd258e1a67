//! Settings management
//!
//! JSON settings file. Every field has a default, so `{}` is a valid file.

use lockstep_core::time::TICK_RATE_HZ;
use lockstep_core::Button;
use lockstep_net::NetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("tick rate {0} Hz is not supported (only 60 Hz)")]
    UnsupportedTickRate(u32),

    #[error("run_seconds must be a finite, non-negative number, got {0}")]
    InvalidRunSeconds(f32),
}

/// Process settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub net: NetConfig,
    pub simulation: SimulationSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub tick_rate_hz: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: TICK_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Stop after this many seconds; run until killed when absent.
    pub run_seconds: Option<f32>,
    /// Log one tick line every N ticks; 0 disables it.
    pub log_every_ticks: u32,
    /// Buttons held down for the whole run.
    pub hold: Vec<Button>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            run_seconds: None,
            log_every_ticks: TICK_RATE_HZ,
            hold: Vec::new(),
        }
    }
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;

        tracing::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// `load(path)` if a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                tracing::info!("no settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.simulation.tick_rate_hz != TICK_RATE_HZ {
            return Err(SettingsError::UnsupportedTickRate(self.simulation.tick_rate_hz));
        }
        if let Some(secs) = self.runtime.run_seconds {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SettingsError::InvalidRunSeconds(secs));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn empty_object_is_all_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.net.port, 7777);
        assert_eq!(settings.runtime.log_every_ticks, 60);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let settings = Settings::from_json(
            r#"{
                "net": { "port": 9000, "host_address": "10.0.0.2" },
                "runtime": { "run_seconds": 2.5, "hold": ["forward", "primary"] }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.net.port, 9000);
        assert_eq!(settings.net.host_address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(settings.net.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(settings.runtime.run_seconds, Some(2.5));
        assert_eq!(settings.runtime.hold, vec![Button::Forward, Button::Primary]);
        assert_eq!(settings.runtime.log_every_ticks, 60);
    }

    #[test]
    fn other_tick_rates_are_rejected() {
        let settings = Settings::from_json(r#"{ "simulation": { "tick_rate_hz": 30 } }"#).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::UnsupportedTickRate(30))
        ));
    }

    #[test]
    fn run_limit_must_be_finite_and_non_negative() {
        let settings = Settings::from_json(r#"{ "runtime": { "run_seconds": -1.0 } }"#).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidRunSeconds(s)) if s == -1.0
        ));

        let mut settings = Settings::default();
        settings.runtime.run_seconds = Some(f32::NAN);
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidRunSeconds(_))));

        settings.runtime.run_seconds = Some(f32::INFINITY);
        assert!(settings.validate().is_err());

        settings.runtime.run_seconds = Some(0.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn unknown_button_fails_to_parse() {
        assert!(Settings::from_json(r#"{ "runtime": { "hold": ["crouch"] } }"#).is_err());
    }

    #[test]
    fn json_round_trip() {
        let mut settings = Settings::default();
        settings.runtime.hold = vec![Button::Left];
        settings.runtime.run_seconds = Some(1.0);

        let text = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&text).unwrap(), settings);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Settings::load("/nonexistent/lockstep.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));

        let none: Option<&str> = None;
        assert_eq!(Settings::load_or_default(none).unwrap(), Settings::default());
    }
}
