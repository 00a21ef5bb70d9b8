//! Per-sensor health tracking
//!
//! A [`SensorChannel`] owns one sensor driver plus the bookkeeping that keeps
//! it alive: lazy initialization with a fixed retry backoff, and a short
//! streak counter that forces a clean re-initialization when bus transients
//! keep happening back to back.

use embassy_time::{Duration, Instant};
use log::{info, warn};

use super::{FaultCounters, PressureSensor, Sample, SensorStatus};
use crate::config::PortConfig;

/// Delay between failed init attempts. Constant, not exponential.
pub const INIT_RETRY_BACKOFF: Duration = Duration::from_millis(1000);

/// Consecutive transient read failures that force a re-initialization.
pub const READ_ERROR_STREAK_TO_REINIT: u8 = 3;

/// Point-in-time view of a channel's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHealth {
    pub ready: bool,
    pub next_retry_at: Instant,
    pub read_error_streak: u8,
    pub last_status: SensorStatus,
}

pub struct SensorChannel<S> {
    port: PortConfig,
    sensor: S,
    diag: FaultCounters,
    ready: bool,
    next_retry_at: Instant,
    sample: Option<Sample>,
    last_read_status: SensorStatus,
    read_error_streak: u8,
}

impl<S: PressureSensor> SensorChannel<S> {
    /// Create a channel that will initialize its sensor on the first cycle.
    pub fn new(port: PortConfig, sensor: S) -> Self {
        Self {
            port,
            sensor,
            diag: FaultCounters::new(),
            ready: false,
            next_retry_at: Instant::MIN,
            sample: None,
            last_read_status: SensorStatus::NotReady,
            read_error_streak: 0,
        }
    }

    /// Drop the previous cycle's sample before a new init/read round.
    pub fn reset_cycle(&mut self) {
        self.sample = None;
        self.last_read_status = SensorStatus::NotReady;
    }

    /// Attempt to bring the sensor up, unless it already is or the backoff
    /// from the last failed attempt has not yet expired.
    pub async fn try_init(&mut self, now: Instant) {
        if self.ready || now < self.next_retry_at {
            return;
        }

        let result = self.sensor.initialize(&self.port).await;
        let status = SensorStatus::of(&result);
        self.diag.record(status);
        self.read_error_streak = 0;

        if let Err(e) = result {
            self.ready = false;
            self.next_retry_at = now + INIT_RETRY_BACKOFF;
            warn!(
                "Pressure sensor {} init failed: {} ({}) bus={} addr=0x{:02x} sda={} scl={} hz={} io={}",
                self.port.label,
                status.name(),
                e,
                self.port.i2c_bus,
                self.port.i2c_address,
                self.port.sda_pin,
                self.port.scl_pin,
                self.port.i2c_frequency_hz,
                self.sensor.last_bus_result(),
            );
            return;
        }

        self.ready = true;
        info!(
            "Pressure sensor {} ready bus={} addr=0x{:02x} sda={} scl={} hz={}",
            self.port.label,
            self.port.i2c_bus,
            self.port.i2c_address,
            self.port.sda_pin,
            self.port.scl_pin,
            self.port.i2c_frequency_hz,
        );
    }

    /// Read one sample from a ready sensor.
    ///
    /// Transient failures build up the error streak; reaching
    /// [`READ_ERROR_STREAK_TO_REINIT`] drops the channel back to uninitialized
    /// and schedules the next init attempt one backoff period after `now`.
    pub async fn read(&mut self, now: Instant) {
        if !self.ready {
            return;
        }

        let result = self.sensor.read_sample().await;
        self.last_read_status = SensorStatus::of(&result);
        self.diag.record(self.last_read_status);

        let error = match result {
            Ok(sample) => {
                self.sample = Some(sample);
                self.read_error_streak = 0;
                return;
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            return;
        }

        self.read_error_streak = self.read_error_streak.saturating_add(1);
        warn!(
            "Pressure sensor {} read failed: {} streak={} io={}",
            self.port.label,
            self.last_read_status.name(),
            self.read_error_streak,
            self.sensor.last_bus_result(),
        );

        if self.read_error_streak >= READ_ERROR_STREAK_TO_REINIT {
            warn!(
                "Pressure sensor {} re-initializing after {} consecutive failures",
                self.port.label, self.read_error_streak
            );
            self.ready = false;
            self.read_error_streak = 0;
            self.next_retry_at = now + INIT_RETRY_BACKOFF;
        }
    }

    /// Sample produced this cycle, `None` if the channel failed or was idle.
    pub fn sample(&self) -> Option<Sample> {
        self.sample
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn label(&self) -> &str {
        self.port.label.as_str()
    }

    pub fn port(&self) -> &PortConfig {
        &self.port
    }

    pub fn read_error_streak(&self) -> u8 {
        self.read_error_streak
    }

    pub fn next_retry_at(&self) -> Instant {
        self.next_retry_at
    }

    pub fn last_read_status(&self) -> SensorStatus {
        self.last_read_status
    }

    pub fn diagnostics(&self) -> &FaultCounters {
        &self.diag
    }

    pub fn health(&self) -> ChannelHealth {
        ChannelHealth {
            ready: self.ready,
            next_retry_at: self.next_retry_at,
            read_error_streak: self.read_error_streak,
            last_status: self.diag.last_status,
        }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorError;
    use crate::sensors::scripted::ScriptedSensor;
    use embassy_futures::block_on;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn cycle(channel: &mut SensorChannel<ScriptedSensor>, now: Instant) {
        channel.reset_cycle();
        block_on(channel.try_init(now));
        block_on(channel.read(now));
    }

    #[test]
    fn test_channel_starts_uninitialized() {
        let channel = SensorChannel::new(PortConfig::fan_default(), ScriptedSensor::default());
        assert!(!channel.is_ready());
        assert_eq!(channel.sample(), None);
        assert_eq!(channel.last_read_status(), SensorStatus::NotReady);
        assert_eq!(channel.label(), "sensor0");
    }

    #[test]
    fn test_successful_init_and_read() {
        let sensor = ScriptedSensor::with_reads([Ok(Sample::new(12.5, 21.0))]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        cycle(&mut channel, at(0));

        assert!(channel.is_ready());
        assert_eq!(channel.sample(), Some(Sample::new(12.5, 21.0)));
        assert_eq!(channel.last_read_status(), SensorStatus::Ok);
        assert_eq!(channel.diagnostics().ok, 2); // init + read
    }

    #[test]
    fn test_init_failure_backs_off() {
        let mut sensor = ScriptedSensor::default();
        sensor.init_results.push_back(Err(SensorError::BusError));
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        cycle(&mut channel, at(100));
        assert!(!channel.is_ready());
        assert_eq!(channel.sample(), None);
        assert_eq!(channel.next_retry_at(), at(1100));
        assert_eq!(channel.health().last_status, SensorStatus::BusError);

        // Still backing off, no new attempt
        cycle(&mut channel, at(1099));
        assert_eq!(channel.sensor().init_calls, 1);
        assert!(!channel.is_ready());

        cycle(&mut channel, at(1100));
        assert_eq!(channel.sensor().init_calls, 2);
        assert!(channel.is_ready());
        assert!(channel.sample().is_some());
    }

    #[test]
    fn test_invalid_argument_on_init_is_an_init_failure() {
        let mut sensor = ScriptedSensor::default();
        sensor.init_results.push_back(Err(SensorError::InvalidArgument));
        let mut channel = SensorChannel::new(PortConfig::envelope_default(), sensor);

        cycle(&mut channel, at(0));

        assert!(!channel.is_ready());
        assert_eq!(channel.diagnostics().invalid_argument, 1);
        assert_eq!(channel.sensor().read_calls, 0);
    }

    #[test]
    fn test_three_bus_errors_force_reinit() {
        let sensor = ScriptedSensor::with_reads([
            Err(SensorError::BusError),
            Err(SensorError::BusError),
            Err(SensorError::BusError),
        ]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        cycle(&mut channel, at(0));
        assert!(channel.is_ready());
        assert_eq!(channel.read_error_streak(), 1);

        cycle(&mut channel, at(50));
        assert!(channel.is_ready());
        assert_eq!(channel.read_error_streak(), 2);

        cycle(&mut channel, at(100));
        assert!(!channel.is_ready());
        assert_eq!(channel.read_error_streak(), 0);
        assert_eq!(channel.next_retry_at(), at(1100));
        assert_eq!(channel.diagnostics().bus_error, 3);
    }

    #[test]
    fn test_reinit_after_forced_drop() {
        let sensor = ScriptedSensor::with_reads([
            Err(SensorError::NotReady),
            Err(SensorError::BusError),
            Err(SensorError::NotReady),
        ]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        for ms in [0, 50, 100] {
            cycle(&mut channel, at(ms));
        }
        assert!(!channel.is_ready());

        cycle(&mut channel, at(150));
        assert_eq!(channel.sensor().init_calls, 1);
        assert_eq!(channel.sample(), None);

        cycle(&mut channel, at(1100));
        assert_eq!(channel.sensor().init_calls, 2);
        assert!(channel.is_ready());
        assert!(channel.sample().is_some());
    }

    #[test]
    fn test_success_clears_streak() {
        let sensor = ScriptedSensor::with_reads([
            Err(SensorError::BusError),
            Err(SensorError::BusError),
            Ok(Sample::new(1.0, 20.0)),
            Err(SensorError::BusError),
            Err(SensorError::BusError),
        ]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        for (i, ms) in [0u64, 50, 100, 150, 200].into_iter().enumerate() {
            cycle(&mut channel, at(ms));
            assert!(channel.is_ready(), "dropped on cycle {}", i);
        }
        assert_eq!(channel.read_error_streak(), 2);
    }

    #[test]
    fn test_crc_mismatch_discards_sample_without_reinit() {
        let sensor = ScriptedSensor::with_reads([
            Err(SensorError::CrcMismatch),
            Err(SensorError::CrcMismatch),
            Err(SensorError::CrcMismatch),
            Err(SensorError::Unrecognized(99)),
        ]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        for ms in [0, 50, 100, 150] {
            cycle(&mut channel, at(ms));
            assert_eq!(channel.sample(), None);
        }

        assert!(channel.is_ready());
        assert_eq!(channel.read_error_streak(), 0);
        assert_eq!(channel.diagnostics().crc_mismatch, 3);
        assert_eq!(channel.diagnostics().other, 1);
        assert_eq!(channel.last_read_status(), SensorStatus::Unrecognized(99));
    }

    #[test]
    fn test_stale_sample_cleared_each_cycle() {
        let sensor = ScriptedSensor::with_reads([
            Ok(Sample::new(4.0, 20.0)),
            Err(SensorError::BusError),
        ]);
        let mut channel = SensorChannel::new(PortConfig::fan_default(), sensor);

        cycle(&mut channel, at(0));
        assert!(channel.sample().is_some());

        cycle(&mut channel, at(50));
        assert_eq!(channel.sample(), None);
        assert_eq!(channel.last_read_status(), SensorStatus::BusError);
    }

    #[test]
    fn test_threshold_reset_fires_from_any_high_streak() {
        let mut channel = SensorChannel::new(PortConfig::fan_default(), ScriptedSensor::default());
        channel.read_error_streak = u8::MAX - 1;
        channel.ready = true;
        channel.sensor_mut().read_results.push_back(Err(SensorError::BusError));

        block_on(channel.read(at(0)));
        assert_eq!(channel.read_error_streak(), 0);
        assert!(!channel.is_ready());
        assert_eq!(channel.next_retry_at(), at(1000));
    }
}
