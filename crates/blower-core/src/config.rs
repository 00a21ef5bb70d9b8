//! Rig configuration
//!
//! Static hardware and tuning values for the acquisition loop. The config is
//! plain serde data so it can be baked into firmware, stored in flash as a
//! postcard blob, or loaded from a file by the simulator.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Maximum length of a channel label used in logs.
pub const LABEL_CAPACITY: usize = 16;

pub type Label = heapless::String<LABEL_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config blob could not be decoded")]
    Decode,
    #[error("Config could not be encoded")]
    Encode,
    #[error("Sample period must be at least 1 ms")]
    InvalidSamplePeriod,
    #[error("I2C address 0x{0:02x} is outside the 7-bit range")]
    InvalidAddress(u8),
}

/// Bus wiring of one pressure sensor.
///
/// The acquisition loop never interprets these values itself; they are handed
/// to the sensor driver on every init attempt and echoed in diagnostics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub label: Label,
    pub i2c_bus: u8,
    pub i2c_address: u8,
    pub sda_pin: u8,
    pub scl_pin: u8,
    pub i2c_frequency_hz: u32,
}

impl PortConfig {
    /// Default wiring of the fan-duct sensor.
    pub fn fan_default() -> Self {
        Self {
            label: label("sensor0"),
            i2c_bus: 0,
            i2c_address: 0x25,
            sda_pin: 4,
            scl_pin: 5,
            i2c_frequency_hz: 100_000,
        }
    }

    /// Default wiring of the envelope sensor.
    pub fn envelope_default() -> Self {
        Self {
            label: label("sensor1"),
            i2c_bus: 1,
            i2c_address: 0x25,
            sda_pin: 6,
            scl_pin: 7,
            i2c_frequency_hz: 100_000,
        }
    }
}

/// Gains for the built-in linear models.
///
/// Non-positive gains are not rejected; the models fall back to a unit gain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    pub fan_pressure_to_speed_gain: f32,
    pub air_leakage_gain: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            fan_pressure_to_speed_gain: 1.0,
            air_leakage_gain: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RigConfig {
    /// Acquisition period in milliseconds
    pub sample_period_ms: u32,
    /// Emit a diagnostic line every N cycles, 0 disables it
    pub log_every_n_cycles: u32,
    pub fan_port: PortConfig,
    pub envelope_port: PortConfig,
    pub models: ModelConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 50,
            log_every_n_cycles: 20,
            fan_port: PortConfig::fan_default(),
            envelope_port: PortConfig::envelope_default(),
            models: ModelConfig::default(),
        }
    }
}

impl RigConfig {
    /// Decode and validate a postcard-encoded config.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|e| {
            log::error!("Failed to decode rig config: {:?}", e);
            ConfigError::Decode
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Encode the config as postcard bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_ms == 0 {
            return Err(ConfigError::InvalidSamplePeriod);
        }

        for port in [&self.fan_port, &self.envelope_port] {
            if port.i2c_address > 0x7f {
                return Err(ConfigError::InvalidAddress(port.i2c_address));
            }
        }

        Ok(())
    }
}

/// Build a label, leaving it empty if the text does not fit.
pub fn label(text: &str) -> Label {
    let mut label = Label::new();
    if label.push_str(text).is_err() {
        log::warn!("Label '{}' exceeds {} bytes, dropped", text, LABEL_CAPACITY);
    }
    label
}
