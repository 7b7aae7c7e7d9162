//! Settings loaded at startup using Figment.
//!
//! Settings are loaded from:
//! 1. a TOML file (default `config/lockin.toml`, optional)
//! 2. environment variables prefixed with `RUST_LOCKIN_`, nested with `__`
//!
//! Every field has a default, so a missing file yields a usable instrument.
//!
//! # Example
//! ```no_run
//! use rust_lockin::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Tick interval: {:?}", settings.tick_interval());
//! # Ok::<(), rust_lockin::error::LockinError>(())
//! ```

use crate::error::{AppResult, LockinError};
use crate::validation::is_in_range;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/lockin.toml";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Acquisition adapter parameters
    pub acquisition: AcquisitionSettings,
    /// Ring store horizons
    pub history: HistorySettings,
    /// Export settings
    pub storage: StorageSettings,
    /// Power-on values of the runtime configuration
    pub instrument: InstrumentDefaults,
    /// Control channel settings
    pub server: ServerSettings,
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "Rust Lock-in".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Number of analog input channels (1 or 2)
    pub channel_count: usize,
    /// Requested sample rate in Hz
    pub sample_rate: f64,
    /// Samples per channel delivered by each fetch
    pub buffer_length: usize,
    /// Tick period in milliseconds
    pub interval_ms: f64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 100_000.0,
            buffer_length: 1000,
            interval_ms: 10.0,
        }
    }
}

/// History horizons for the two ring stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Seconds kept by the long-history store
    pub seconds: f64,
    /// Seconds kept by the XY trace store
    pub xy_seconds: f64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            seconds: 600.0,
            xy_seconds: 10.0,
        }
    }
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory used for exports without an explicit path
    pub output_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

/// Power-on defaults, also restored by `reset` / `*rst`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentDefaults {
    /// Excitation and reference frequency in Hz
    pub frequency: f64,
    /// Excitation amplitude in volts
    pub amplitude: f64,
    /// Excitation phase in degrees
    pub phase: f64,
    /// High-pass cutoff on the demodulated stream in Hz (0 disables)
    pub hpf_cutoff: f64,
    /// XY plot limit in volts
    pub xy_limit: f64,
    /// Raw plot limit in volts
    pub raw_limit: f64,
}

impl Default for InstrumentDefaults {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            amplitude: 1.0,
            phase: 0.0,
            hpf_cutoff: 0.0,
            xy_limit: 1.0,
            raw_limit: 2.0,
        }
    }
}

/// Control channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address for `serve`
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5025".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default file and environment variables
    ///
    /// Environment variables can override settings with prefix RUST_LOCKIN_
    /// Example: RUST_LOCKIN_ACQUISITION__INTERVAL_MS=20
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUST_LOCKIN_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LockinError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let acq = &self.acquisition;
        is_in_range(acq.channel_count, 1..=2).map_err(|_| {
            LockinError::Configuration(format!(
                "Invalid channel_count {}. Must be 1 or 2",
                acq.channel_count
            ))
        })?;
        if !(acq.sample_rate.is_finite() && acq.sample_rate > 0.0) {
            return Err(LockinError::Configuration(format!(
                "Invalid sample_rate {}",
                acq.sample_rate
            )));
        }
        if acq.buffer_length < 2 {
            return Err(LockinError::Configuration(format!(
                "buffer_length {} is too short",
                acq.buffer_length
            )));
        }
        if !(acq.interval_ms.is_finite() && acq.interval_ms > 0.0) {
            return Err(LockinError::Configuration(format!(
                "Invalid interval_ms {}",
                acq.interval_ms
            )));
        }
        let buffer_seconds = acq.buffer_length as f64 * self.sample_interval();
        if buffer_seconds > self.tick_interval().as_secs_f64() + 1e-9 {
            return Err(LockinError::Configuration(format!(
                "One buffer lasts {:.3} ms, longer than the {:.3} ms tick interval",
                buffer_seconds * 1e3,
                acq.interval_ms
            )));
        }

        if self.history.seconds <= 0.0 || self.history.xy_seconds <= 0.0 {
            return Err(LockinError::Configuration(
                "History horizons must be positive".to_string(),
            ));
        }

        let (min, max) = self.frequency_limits();
        is_in_range(self.instrument.frequency, min..=max).map_err(|_| {
            LockinError::Configuration(format!(
                "Default frequency {} Hz outside {}..={} Hz",
                self.instrument.frequency, min, max
            ))
        })?;

        Ok(())
    }

    /// Seconds between two raw samples
    pub fn sample_interval(&self) -> f64 {
        1.0 / self.acquisition.sample_rate
    }

    /// Nominal period of one acquisition tick
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.acquisition.interval_ms / 1000.0)
    }

    /// Slots in the long-history store
    pub fn history_capacity(&self) -> usize {
        capacity_for(self.history.seconds, self.tick_interval())
    }

    /// Slots in the XY trace store
    pub fn xy_capacity(&self) -> usize {
        capacity_for(self.history.xy_seconds, self.tick_interval())
    }

    /// Settable reference frequency range in Hz.
    ///
    /// The lower bound keeps one full period inside a raw buffer, the upper bound
    /// keeps at least two samples per half-period.
    pub fn frequency_limits(&self) -> (f64, f64) {
        let rate = self.acquisition.sample_rate;
        let min = rate / self.acquisition.buffer_length as f64;
        let max = 0.25 * rate;
        (min, max)
    }
}

fn capacity_for(seconds: f64, interval: Duration) -> usize {
    ((seconds / interval.as_secs_f64()).ceil() as usize).max(1)
}
