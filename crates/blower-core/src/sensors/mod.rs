//! Differential-pressure sensor abstraction
//!
//! The bus protocol of the physical sensors lives in a driver outside this
//! crate. The core only sees the [`PressureSensor`] trait: initialize the
//! sensor on its port, read one compensated sample, and report the last raw
//! bus result for diagnostics.

mod channel;
#[cfg(test)]
pub(crate) mod scripted;

use core::future::Future;

use thiserror_no_std::Error;

use crate::config::PortConfig;

pub use channel::*;

/// One compensated reading from a differential-pressure sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub corrected_pressure_pa: f32,
    pub temperature_c: f32,
}

impl Sample {
    pub const fn new(corrected_pressure_pa: f32, temperature_c: f32) -> Self {
        Self {
            corrected_pressure_pa,
            temperature_c,
        }
    }
}

/// Failure reported by a sensor driver.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("Invalid argument passed to the sensor driver")]
    InvalidArgument,
    #[error("Bus transaction failed")]
    BusError,
    #[error("Sensor not ready")]
    NotReady,
    #[error("CRC mismatch in sensor data")]
    CrcMismatch,
    #[error("Unrecognized sensor status code {0}")]
    Unrecognized(i32),
}

impl SensorError {
    /// Bus-level and not-ready failures are expected to clear up on their own
    /// and count towards the channel's read-error streak.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::BusError | Self::NotReady)
    }
}

/// Outcome of a driver call, as recorded in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Ok,
    InvalidArgument,
    BusError,
    NotReady,
    CrcMismatch,
    Unrecognized(i32),
}

impl SensorStatus {
    pub fn of<T>(result: &Result<T, SensorError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::from(*e),
        }
    }

    /// Short stable name used in log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid_argument",
            Self::BusError => "bus_error",
            Self::NotReady => "not_ready",
            Self::CrcMismatch => "crc_mismatch",
            Self::Unrecognized(_) => "unknown",
        }
    }
}

impl From<SensorError> for SensorStatus {
    fn from(value: SensorError) -> Self {
        match value {
            SensorError::InvalidArgument => Self::InvalidArgument,
            SensorError::BusError => Self::BusError,
            SensorError::NotReady => Self::NotReady,
            SensorError::CrcMismatch => Self::CrcMismatch,
            SensorError::Unrecognized(code) => Self::Unrecognized(code),
        }
    }
}

/// Per-status counters for one channel, covering both init and read calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCounters {
    pub ok: u32,
    pub invalid_argument: u32,
    pub bus_error: u32,
    pub not_ready: u32,
    pub crc_mismatch: u32,
    pub other: u32,
    pub last_status: SensorStatus,
}

impl Default for FaultCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultCounters {
    pub const fn new() -> Self {
        Self {
            ok: 0,
            invalid_argument: 0,
            bus_error: 0,
            not_ready: 0,
            crc_mismatch: 0,
            other: 0,
            last_status: SensorStatus::Ok,
        }
    }

    pub fn record(&mut self, status: SensorStatus) {
        self.last_status = status;

        let counter = match status {
            SensorStatus::Ok => &mut self.ok,
            SensorStatus::InvalidArgument => &mut self.invalid_argument,
            SensorStatus::BusError => &mut self.bus_error,
            SensorStatus::NotReady => &mut self.not_ready,
            SensorStatus::CrcMismatch => &mut self.crc_mismatch,
            SensorStatus::Unrecognized(_) => &mut self.other,
        };
        *counter = counter.saturating_add(1);
    }

    /// Total number of recorded calls.
    pub fn total(&self) -> u32 {
        [
            self.ok,
            self.invalid_argument,
            self.bus_error,
            self.not_ready,
            self.crc_mismatch,
            self.other,
        ]
        .iter()
        .fold(0u32, |acc, n| acc.saturating_add(*n))
    }
}

/// Driver-side interface of one differential-pressure sensor.
pub trait PressureSensor {
    /// Bring the sensor up on the given port.
    fn initialize(&mut self, port: &PortConfig) -> impl Future<Output = Result<(), SensorError>>;

    /// Read one compensated sample.
    fn read_sample(&mut self) -> impl Future<Output = Result<Sample, SensorError>>;

    /// Raw result of the last bus transaction, for diagnostics only.
    fn last_bus_result(&self) -> i32 {
        0
    }
}
