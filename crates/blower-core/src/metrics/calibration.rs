//! Windowed zero-offset calibration
//!
//! While the rig is at rest (fan off, envelope open) both sensors should read
//! zero. The engine averages their raw readings over a fixed window and hands
//! the means back as new offsets. A sensor that produced too few valid
//! samples in the window keeps its current offset.

use embassy_time::{Duration, Instant};

/// Length of the calibration window.
pub const CALIBRATION_WINDOW: Duration = Duration::from_millis(10_000);

/// Samples a sensor needs inside the window for its mean to be committed.
pub const CALIBRATION_MIN_SAMPLES: u32 = 20;

/// Progress never shows 100 until the window has really closed.
const MAX_SAMPLING_PROGRESS_PCT: u8 = 99;

/// Result of feeding one update cycle into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// No calibration running
    Inactive,
    /// Window still open
    Sampling { progress_pct: u8 },
    /// Window closed on this cycle. `None` means the sensor had too few
    /// samples and its offset must be left alone.
    Complete {
        fan_offset_pa: Option<f32>,
        envelope_offset_pa: Option<f32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationEngine {
    active: bool,
    start: Instant,
    fan_sum: f32,
    fan_count: u32,
    envelope_sum: f32,
    envelope_count: u32,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationEngine {
    /// Create an inert engine.
    pub const fn new() -> Self {
        Self {
            active: false,
            start: Instant::MIN,
            fan_sum: 0.0,
            fan_count: 0,
            envelope_sum: 0.0,
            envelope_count: 0,
        }
    }

    /// Open a new window at `now`, discarding anything accumulated so far.
    pub fn begin(&mut self, now: Instant) {
        *self = Self {
            active: true,
            start: now,
            ..Self::new()
        };
    }

    /// Feed the raw (offset-free) pressures of one cycle.
    ///
    /// The samples of the cycle that closes the window are still counted.
    pub fn step(
        &mut self,
        now: Instant,
        fan_raw_pa: Option<f32>,
        envelope_raw_pa: Option<f32>,
    ) -> CalibrationStep {
        if !self.active {
            return CalibrationStep::Inactive;
        }

        if let Some(pressure) = fan_raw_pa {
            self.fan_sum += pressure;
            self.fan_count += 1;
        }
        if let Some(pressure) = envelope_raw_pa {
            self.envelope_sum += pressure;
            self.envelope_count += 1;
        }

        let elapsed_ms = now.saturating_duration_since(self.start).as_millis();
        let window_ms = CALIBRATION_WINDOW.as_millis();

        if elapsed_ms < window_ms {
            let pct = (elapsed_ms * 100 / window_ms).min(u64::from(MAX_SAMPLING_PROGRESS_PCT));
            return CalibrationStep::Sampling {
                progress_pct: pct as u8,
            };
        }

        self.active = false;
        CalibrationStep::Complete {
            fan_offset_pa: mean(self.fan_sum, self.fan_count),
            envelope_offset_pa: mean(self.envelope_sum, self.envelope_count),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }

    pub fn fan_sum(&self) -> f32 {
        self.fan_sum
    }

    pub fn fan_count(&self) -> u32 {
        self.fan_count
    }

    pub fn envelope_sum(&self) -> f32 {
        self.envelope_sum
    }

    pub fn envelope_count(&self) -> u32 {
        self.envelope_count
    }
}

fn mean(sum: f32, count: u32) -> Option<f32> {
    (count >= CALIBRATION_MIN_SAMPLES).then(|| sum / count as f32)
}
