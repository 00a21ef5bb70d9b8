//! Physical models for the derived quantities
//!
//! Models run inside the metrics store's critical section on every update,
//! so implementations must be pure arithmetic: no I/O, no blocking and no
//! fallible allocation.

use crate::config::ModelConfig;

/// Converts raw pressures into derived engineering quantities.
pub trait BlowerModel {
    /// Airflow speed through the fan from the fan-duct pressure.
    fn fan_speed(&self, fan_pressure_pa: f32) -> f32;

    /// Envelope leakage estimate from fan speed and envelope pressure.
    fn air_leakage(&self, fan_speed_units: f32, envelope_pressure_pa: f32) -> f32;
}

/// Built-in proportional model.
///
/// - `fan_speed = |p_fan| * fan_gain`
/// - `air_leakage = fan_speed * |p_envelope| * leakage_gain`
///
/// Gains that are not strictly positive (including NaN) are treated as 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel {
    fan_gain: f32,
    leakage_gain: f32,
}

impl LinearModel {
    /// Unit gains on both models.
    pub const DEFAULT: Self = Self {
        fan_gain: 1.0,
        leakage_gain: 1.0,
    };

    pub fn new(fan_gain: f32, leakage_gain: f32) -> Self {
        Self {
            fan_gain: positive_or_unit(fan_gain),
            leakage_gain: positive_or_unit(leakage_gain),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.fan_pressure_to_speed_gain, config.air_leakage_gain)
    }

    pub fn fan_gain(&self) -> f32 {
        self.fan_gain
    }

    pub fn leakage_gain(&self) -> f32 {
        self.leakage_gain
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BlowerModel for LinearModel {
    fn fan_speed(&self, fan_pressure_pa: f32) -> f32 {
        fan_pressure_pa.abs() * self.fan_gain
    }

    fn air_leakage(&self, fan_speed_units: f32, envelope_pressure_pa: f32) -> f32 {
        fan_speed_units * envelope_pressure_pa.abs() * self.leakage_gain
    }
}

fn positive_or_unit(gain: f32) -> f32 {
    if gain > 0.0 { gain } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_values() {
        let model = LinearModel::default();

        let speed = model.fan_speed(-5.0);
        assert_eq!(speed, 5.0);
        assert_eq!(model.air_leakage(speed, 3.0), 15.0);
        assert_eq!(model.air_leakage(speed, -3.0), 15.0);
    }

    #[test]
    fn test_gains_are_applied() {
        let model = LinearModel::new(2.0, 0.5);

        let speed = model.fan_speed(10.0);
        assert_eq!(speed, 20.0);
        assert_eq!(model.air_leakage(speed, 4.0), 40.0);
    }

    #[test]
    fn test_non_positive_gains_fall_back_to_unit() {
        for gain in [0.0, -3.0, f32::NAN] {
            let model = LinearModel::new(gain, gain);
            assert_eq!(model.fan_gain(), 1.0);
            assert_eq!(model.leakage_gain(), 1.0);
        }
    }

    #[test]
    fn test_from_config() {
        let config = ModelConfig {
            fan_pressure_to_speed_gain: 0.8,
            air_leakage_gain: -1.0,
        };
        let model = LinearModel::from_config(&config);

        assert_eq!(model.fan_gain(), 0.8);
        assert_eq!(model.leakage_gain(), 1.0);
    }
}
