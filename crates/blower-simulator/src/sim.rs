//! Synthetic sensors and a host clock for the simulator

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant as StdInstant;

use blower_core::clock::Clock;
use blower_core::config::PortConfig;
use blower_core::sensors::{PressureSensor, Sample, SensorError};
use embassy_time::Instant;

/// Bus result reported after a failed transaction.
const BUS_RESULT_TIMEOUT: i32 = -2;

/// Clock anchored at simulator start. `delay_until` sleeps the calling
/// thread; the acquisition loop owns its thread.
pub struct HostClock {
    origin: StdInstant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: StdInstant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    async fn delay_until(&self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            let remaining = deadline.duration_since(now);
            std::thread::sleep(std::time::Duration::from_micros(remaining.as_micros()));
        }
    }
}

/// Scripted misbehaviour of a simulated sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultProfile {
    /// Init attempts that fail with `NotReady` before the sensor comes up
    pub failed_inits: u32,
    /// Start a burst of bus errors every N reads, 0 disables
    pub bus_error_every: u32,
    /// Length of each bus error burst
    pub bus_error_burst: u32,
    /// Return a CRC mismatch every N reads, 0 disables
    pub crc_mismatch_every: u32,
}

/// Differential-pressure sensor with a zero-point drift, a little noise and
/// a load-dependent signal that appears while the fan is running.
pub struct SimulatedSensor {
    name: &'static str,
    baseline_pa: f32,
    loaded_pa: f32,
    temperature_c: f32,
    fan_running: Arc<AtomicBool>,
    faults: FaultProfile,
    rng: u32,
    inits: u32,
    reads: u32,
    burst_remaining: u32,
    last_bus_result: i32,
}

impl SimulatedSensor {
    pub fn new(
        name: &'static str,
        baseline_pa: f32,
        loaded_pa: f32,
        temperature_c: f32,
        fan_running: Arc<AtomicBool>,
        faults: FaultProfile,
    ) -> Self {
        Self {
            name,
            baseline_pa,
            loaded_pa,
            temperature_c,
            fan_running,
            faults,
            rng: 0x9e37_79b9 ^ baseline_pa.to_bits(),
            inits: 0,
            reads: 0,
            burst_remaining: 0,
            last_bus_result: 0,
        }
    }

    /// Uniform noise in [-0.05, 0.05) Pa (xorshift32).
    fn noise(&mut self) -> f32 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        (self.rng as f32 / u32::MAX as f32 - 0.5) * 0.1
    }

    fn fail(&mut self, error: SensorError) -> Result<Sample, SensorError> {
        self.last_bus_result = BUS_RESULT_TIMEOUT;
        Err(error)
    }
}

impl PressureSensor for SimulatedSensor {
    async fn initialize(&mut self, port: &PortConfig) -> Result<(), SensorError> {
        self.inits += 1;
        if self.inits <= self.faults.failed_inits {
            self.last_bus_result = BUS_RESULT_TIMEOUT;
            return Err(SensorError::NotReady);
        }

        log::debug!(
            "{} attached at 0x{:02x} on bus {}",
            self.name,
            port.i2c_address,
            port.i2c_bus
        );
        self.burst_remaining = 0;
        self.last_bus_result = 0;
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<Sample, SensorError> {
        self.reads += 1;

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return self.fail(SensorError::BusError);
        }
        if self.faults.bus_error_every > 0 && self.reads % self.faults.bus_error_every == 0 {
            self.burst_remaining = self.faults.bus_error_burst.saturating_sub(1);
            return self.fail(SensorError::BusError);
        }
        if self.faults.crc_mismatch_every > 0 && self.reads % self.faults.crc_mismatch_every == 0 {
            return self.fail(SensorError::CrcMismatch);
        }

        let load = if self.fan_running.load(Ordering::Relaxed) {
            self.loaded_pa
        } else {
            0.0
        };
        self.last_bus_result = 0;

        Ok(Sample::new(
            self.baseline_pa + load + self.noise(),
            self.temperature_c,
        ))
    }

    fn last_bus_result(&self) -> i32 {
        self.last_bus_result
    }
}
