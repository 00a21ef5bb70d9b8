//! Periodic acquisition loop
//!
//! Once per sample period the loop clears both channels, gives any channel
//! that is down a chance to initialize, reads whatever is ready and pushes
//! the results into the [`MetricsStore`]. Wake-ups are scheduled against
//! absolute deadlines so a slow cycle does not shift the sampling grid.

use alloc::boxed::Box;

use embassy_time::{Duration, Instant};
use log::info;

use crate::clock::Clock;
use crate::config::RigConfig;
use crate::metrics::{BoxedModel, LinearModel, MetricsStore};
use crate::sensors::{PressureSensor, SensorChannel};

pub struct AcquisitionLoop<'a, F, E, C> {
    fan: SensorChannel<F>,
    envelope: SensorChannel<E>,
    store: &'a MetricsStore<C>,
    sample_period: Duration,
    log_every_n_cycles: u32,
    cycles_since_log: u32,
    next_wake: Option<Instant>,
}

impl<'a, F, E, C> AcquisitionLoop<'a, F, E, C>
where
    F: PressureSensor,
    E: PressureSensor,
    C: Clock,
{
    /// Build the loop and initialize `store` with the linear models described
    /// by `config.models`.
    pub fn new(config: &RigConfig, fan: F, envelope: E, store: &'a MetricsStore<C>) -> Self {
        let models = Box::new(LinearModel::from_config(&config.models));
        Self::with_models(config, fan, envelope, store, models)
    }

    /// Build the loop and initialize `store` with caller-supplied models.
    pub fn with_models(
        config: &RigConfig,
        fan: F,
        envelope: E,
        store: &'a MetricsStore<C>,
        models: BoxedModel,
    ) -> Self {
        store.initialize(Some(models));

        Self {
            fan: SensorChannel::new(config.fan_port.clone(), fan),
            envelope: SensorChannel::new(config.envelope_port.clone(), envelope),
            store,
            sample_period: Duration::from_millis(u64::from(config.sample_period_ms.max(1))),
            log_every_n_cycles: config.log_every_n_cycles,
            cycles_since_log: 0,
            next_wake: None,
        }
    }

    /// Run one acquisition cycle at the clock's current tick.
    pub async fn run_cycle(&mut self) {
        let now = self.store.clock().now();

        self.fan.reset_cycle();
        self.envelope.reset_cycle();

        self.fan.try_init(now).await;
        self.envelope.try_init(now).await;

        self.fan.read(now).await;
        self.envelope.read(now).await;

        self.store.update(self.fan.sample(), self.envelope.sample());

        self.log_diagnostics();
    }

    /// Run one cycle, then sleep until the next point on the sampling grid.
    pub async fn step(&mut self) {
        let store = self.store;
        let clock = store.clock();
        let wake = self.next_wake.unwrap_or_else(|| clock.now());

        self.run_cycle().await;

        let next_wake = wake + self.sample_period;
        self.next_wake = Some(next_wake);
        clock.delay_until(next_wake).await;
    }

    /// Acquire forever.
    pub async fn run(&mut self) -> ! {
        info!(
            "Acquisition loop started, period {} ms",
            self.sample_period.as_millis()
        );

        loop {
            self.step().await;
        }
    }

    fn log_diagnostics(&mut self) {
        if self.log_every_n_cycles == 0 {
            return;
        }

        self.cycles_since_log += 1;
        if self.cycles_since_log < self.log_every_n_cycles {
            return;
        }
        self.cycles_since_log = 0;

        let Ok(snapshot) = self.store.get_snapshot() else {
            return;
        };

        let fan = self.fan.diagnostics();
        let envelope = self.envelope.diagnostics();
        info!(
            "seq={} {}: ready={} last={} ok={} bus={} crc={} nr={} dp={:.3} | {}: ready={} last={} ok={} bus={} crc={} nr={} dp={:.3}",
            snapshot.update_sequence,
            self.fan.label(),
            self.fan.is_ready(),
            fan.last_status.name(),
            fan.ok,
            fan.bus_error,
            fan.crc_mismatch,
            fan.not_ready,
            snapshot.fan_pressure_pa,
            self.envelope.label(),
            self.envelope.is_ready(),
            envelope.last_status.name(),
            envelope.ok,
            envelope.bus_error,
            envelope.crc_mismatch,
            envelope.not_ready,
            snapshot.envelope_pressure_pa,
        );
    }

    pub fn fan_channel(&self) -> &SensorChannel<F> {
        &self.fan
    }

    pub fn envelope_channel(&self) -> &SensorChannel<E> {
        &self.envelope
    }

    pub fn store(&self) -> &'a MetricsStore<C> {
        self.store
    }

    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ModelConfig;
    use crate::metrics::CalibrationState;
    use crate::sensors::scripted::ScriptedSensor;
    use crate::sensors::{Sample, SensorError};
    use embassy_futures::block_on;

    fn config() -> RigConfig {
        RigConfig {
            sample_period_ms: 50,
            log_every_n_cycles: 4,
            ..RigConfig::default()
        }
    }

    #[test]
    fn test_cycle_publishes_both_channels() {
        let store = MetricsStore::new(ManualClock::new());
        let fan = ScriptedSensor::with_reads([Ok(Sample::new(-5.0, 22.0))]);
        let envelope = ScriptedSensor::with_reads([Ok(Sample::new(3.0, 18.0))]);
        let mut acquisition = AcquisitionLoop::new(&config(), fan, envelope, &store);

        block_on(acquisition.run_cycle());

        let snapshot = store.get_snapshot().unwrap();
        assert_eq!(snapshot.update_sequence, 1);
        assert!(snapshot.both_valid());
        assert_eq!(snapshot.fan_speed_units, 5.0);
        assert_eq!(snapshot.estimated_air_leakage_units, 15.0);
    }

    #[test]
    fn test_config_gains_reach_the_store() {
        let store = MetricsStore::new(ManualClock::new());
        let config = RigConfig {
            models: ModelConfig {
                fan_pressure_to_speed_gain: 2.0,
                air_leakage_gain: 0.5,
            },
            ..config()
        };
        let fan = ScriptedSensor::with_reads([Ok(Sample::new(4.0, 22.0))]);
        let envelope = ScriptedSensor::with_reads([Ok(Sample::new(-6.0, 18.0))]);
        let mut acquisition = AcquisitionLoop::new(&config, fan, envelope, &store);

        block_on(acquisition.run_cycle());

        let snapshot = store.get_snapshot().unwrap();
        assert_eq!(snapshot.fan_speed_units, 8.0);
        assert_eq!(snapshot.estimated_air_leakage_units, 24.0);
    }

    #[test]
    fn test_failing_channel_does_not_block_the_other() {
        let store = MetricsStore::new(ManualClock::new());
        let mut fan = ScriptedSensor::default();
        fan.init_results.push_back(Err(SensorError::NotReady));
        let envelope = ScriptedSensor::with_reads([Ok(Sample::new(2.0, 18.0))]);
        let mut acquisition = AcquisitionLoop::new(&config(), fan, envelope, &store);

        block_on(acquisition.run_cycle());

        let snapshot = store.get_snapshot().unwrap();
        assert!(!snapshot.fan_sample_valid);
        assert!(snapshot.envelope_sample_valid);
        assert_eq!(snapshot.envelope_pressure_pa, 2.0);
        assert!(!acquisition.fan_channel().is_ready());
        assert!(acquisition.envelope_channel().is_ready());
    }

    #[test]
    fn test_bus_errors_schedule_reinit_through_loop() {
        let store = MetricsStore::new(ManualClock::new());
        let fan = ScriptedSensor::with_reads([
            Err(SensorError::BusError),
            Err(SensorError::BusError),
            Err(SensorError::BusError),
        ]);
        let mut acquisition =
            AcquisitionLoop::new(&config(), fan, ScriptedSensor::default(), &store);

        block_on(acquisition.step()); // t = 0
        block_on(acquisition.step()); // t = 50
        assert!(acquisition.fan_channel().is_ready());

        block_on(acquisition.step()); // t = 100
        let health = acquisition.fan_channel().health();
        assert!(!health.ready);
        assert_eq!(health.read_error_streak, 0);
        assert_eq!(health.next_retry_at, Instant::from_millis(1_100));

        let snapshot = store.get_snapshot().unwrap();
        assert!(!snapshot.fan_sample_valid);
        assert!(snapshot.envelope_sample_valid);
    }

    #[test]
    fn test_step_follows_sampling_grid() {
        let store = MetricsStore::new(ManualClock::new());
        let mut acquisition = AcquisitionLoop::new(
            &config(),
            ScriptedSensor::default(),
            ScriptedSensor::default(),
            &store,
        );
        store.clock().set_millis(1_000);

        for i in 1..=4u32 {
            block_on(acquisition.step());
            assert_eq!(store.clock().millis(), 1_000 + i * 50);
        }

        let snapshot = store.get_snapshot().unwrap();
        assert_eq!(snapshot.update_sequence, 4);
        assert_eq!(snapshot.last_update_ms, 1_150);
    }

    #[test]
    fn test_calibration_runs_across_loop_cycles() {
        let store = MetricsStore::new(ManualClock::new());
        let mut fan = ScriptedSensor::default();
        let mut envelope = ScriptedSensor::default();
        for _ in 0..300 {
            fan.read_results.push_back(Ok(Sample::new(1.25, 22.0)));
            envelope.read_results.push_back(Ok(Sample::new(-0.5, 18.0)));
        }
        let mut acquisition = AcquisitionLoop::new(&config(), fan, envelope, &store);

        block_on(acquisition.step());
        store.begin_calibration();

        let mut last_progress = 0;
        loop {
            block_on(acquisition.step());
            let snapshot = store.get_snapshot().unwrap();
            if snapshot.calibration_state == CalibrationState::Done {
                assert_eq!(snapshot.calibration_progress_pct, 100);
                break;
            }
            assert!(snapshot.calibration_progress_pct >= last_progress);
            last_progress = snapshot.calibration_progress_pct;
        }

        let snapshot = store.get_snapshot().unwrap();
        assert_eq!(snapshot.calibration_offsets.fan_pa, 1.25);
        assert_eq!(snapshot.calibration_offsets.envelope_pa, -0.5);
        assert_eq!(snapshot.fan_pressure_pa, 0.0);
        assert_eq!(snapshot.envelope_pressure_pa, 0.0);
        assert_eq!(snapshot.estimated_air_leakage_units, 0.0);
    }

    #[test]
    fn test_operator_can_zero_while_loop_runs() {
        let store = MetricsStore::new(ManualClock::new());
        let fan = ScriptedSensor::with_reads([
            Ok(Sample::new(3.0, 22.0)),
            Ok(Sample::new(5.0, 22.0)),
        ]);
        let mut acquisition =
            AcquisitionLoop::new(&config(), fan, ScriptedSensor::default(), &store);

        block_on(acquisition.step());
        assert!(store.capture_zero_offsets());

        block_on(acquisition.step());
        assert_eq!(store.get_snapshot().unwrap().fan_pressure_pa, 2.0);
    }
}
