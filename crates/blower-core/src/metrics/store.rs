//! Lock-protected metrics store
//!
//! The store is the only place where offsets, calibration progress and the
//! published snapshot live. Every public method takes the store's single
//! critical-section mutex for its whole duration through
//! [`Mutex::lock`], so a reader can never observe a half-applied update and
//! no return path can leave the lock held.
//!
//! The store is an ordinary value: put it in a `static`, a `StaticCell` or
//! a scoped borrow and hand `&MetricsStore` to every context that needs it.

use alloc::boxed::Box;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use log::{debug, info};
use thiserror_no_std::Error;

use super::{
    BlowerModel, CalibrationEngine, CalibrationState, CalibrationStep, LinearModel,
    MetricsSnapshot, Offsets,
};
use crate::clock::Clock;
use crate::sensors::Sample;

/// Fallback used whenever no model has been installed.
static DEFAULT_MODEL: LinearModel = LinearModel::DEFAULT;

pub type BoxedModel = Box<dyn BlowerModel + Send>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("Metrics store has not been initialized")]
    NotInitialized,
}

struct StoreState {
    initialized: bool,
    models: Option<BoxedModel>,
    snapshot: MetricsSnapshot,
    offsets: Offsets,
    last_fan_raw_pa: Option<f32>,
    last_envelope_raw_pa: Option<f32>,
    calibration: CalibrationEngine,
}

impl StoreState {
    const fn new() -> Self {
        Self {
            initialized: false,
            models: None,
            snapshot: MetricsSnapshot::EMPTY,
            offsets: Offsets::ZERO,
            last_fan_raw_pa: None,
            last_envelope_raw_pa: None,
            calibration: CalibrationEngine::new(),
        }
    }

    fn reset(&mut self, models: Option<BoxedModel>) {
        *self = Self {
            initialized: true,
            models,
            ..Self::new()
        };
    }

    fn model(&self) -> &dyn BlowerModel {
        match &self.models {
            Some(models) => &**models,
            None => &DEFAULT_MODEL,
        }
    }

    fn apply_samples(&mut self, fan: Option<Sample>, envelope: Option<Sample>) {
        let snapshot = &mut self.snapshot;

        match fan {
            Some(sample) => {
                self.last_fan_raw_pa = Some(sample.corrected_pressure_pa);
                snapshot.fan_pressure_pa = sample.corrected_pressure_pa - self.offsets.fan_pa;
                snapshot.fan_temperature_c = sample.temperature_c;
                snapshot.fan_sample_valid = true;
            }
            None => snapshot.fan_sample_valid = false,
        }

        match envelope {
            Some(sample) => {
                self.last_envelope_raw_pa = Some(sample.corrected_pressure_pa);
                snapshot.envelope_pressure_pa =
                    sample.corrected_pressure_pa - self.offsets.envelope_pa;
                snapshot.envelope_temperature_c = sample.temperature_c;
                snapshot.envelope_sample_valid = true;
            }
            None => snapshot.envelope_sample_valid = false,
        }
    }

    fn apply_calibration_step(&mut self, step: CalibrationStep) {
        match step {
            CalibrationStep::Inactive => {}
            CalibrationStep::Sampling { progress_pct } => {
                self.snapshot.calibration_state = CalibrationState::Sampling;
                self.snapshot.calibration_progress_pct = progress_pct;
            }
            CalibrationStep::Complete {
                fan_offset_pa,
                envelope_offset_pa,
            } => {
                if let Some(offset) = fan_offset_pa {
                    self.offsets.fan_pa = offset;
                    if let Some(raw) = self.last_fan_raw_pa {
                        self.snapshot.fan_pressure_pa = raw - offset;
                    }
                }
                if let Some(offset) = envelope_offset_pa {
                    self.offsets.envelope_pa = offset;
                    if let Some(raw) = self.last_envelope_raw_pa {
                        self.snapshot.envelope_pressure_pa = raw - offset;
                    }
                }
                self.snapshot.calibration_offsets = self.offsets;
                self.snapshot.calibration_state = CalibrationState::Done;
                self.snapshot.calibration_progress_pct = 100;
            }
        }
    }

    fn recompute_derived(&mut self) {
        let model = self.model();
        let fan_speed = model.fan_speed(self.snapshot.fan_pressure_pa);
        let leakage = model.air_leakage(fan_speed, self.snapshot.envelope_pressure_pa);

        self.snapshot.fan_speed_units = fan_speed;
        self.snapshot.estimated_air_leakage_units = leakage;
    }

    fn touch(&mut self, now: Instant) {
        self.snapshot.update_sequence = self.snapshot.update_sequence.wrapping_add(1);
        self.snapshot.last_update_ms = now.as_millis();
    }
}

pub struct MetricsStore<C> {
    clock: C,
    state: Mutex<CriticalSectionRawMutex, RefCell<StoreState>>,
}

impl<C: Clock> MetricsStore<C> {
    /// Create an uninitialized store. Readers get
    /// [`StoreError::NotInitialized`] until [`initialize`](Self::initialize)
    /// or the first [`update`](Self::update).
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(RefCell::new(StoreState::new())),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        self.state.lock(|cell| f(&mut *cell.borrow_mut()))
    }

    /// Install `models` (or the built-in linear model when `None`) and reset
    /// the snapshot, offsets, raw trackers and calibration. Safe to call again
    /// at any time.
    pub fn initialize(&self, models: Option<BoxedModel>) {
        let custom = models.is_some();
        self.with_state(|state| state.reset(models));
        info!(
            "Metrics store initialized with {} models",
            if custom { "custom" } else { "default" }
        );
    }

    /// Publish one acquisition cycle.
    ///
    /// `None` marks a sensor invalid for this cycle; its previous values stay
    /// in the snapshot, flagged invalid. The clock is read under the lock so
    /// timestamps follow the sequence order.
    pub fn update(&self, fan: Option<Sample>, envelope: Option<Sample>) {
        let (auto_initialized, step) = self.with_state(|state| {
            let now = self.clock.now();
            let auto_initialized = !state.initialized;
            if auto_initialized {
                state.reset(None);
            }

            state.apply_samples(fan, envelope);

            let step = state.calibration.step(
                now,
                fan.map(|s| s.corrected_pressure_pa),
                envelope.map(|s| s.corrected_pressure_pa),
            );
            state.apply_calibration_step(step);

            state.recompute_derived();
            state.touch(now);

            (auto_initialized, step)
        });

        if auto_initialized {
            debug!("Metrics store auto-initialized with default models");
        }

        if let CalibrationStep::Complete {
            fan_offset_pa,
            envelope_offset_pa,
        } = step
        {
            info!(
                "Calibration complete: fan offset {:?} Pa, envelope offset {:?} Pa",
                fan_offset_pa, envelope_offset_pa
            );
        }
    }

    /// Copy of the latest snapshot.
    pub fn get_snapshot(&self) -> Result<MetricsSnapshot, StoreError> {
        self.with_state(|state| {
            if state.initialized {
                Ok(state.snapshot)
            } else {
                Err(StoreError::NotInitialized)
            }
        })
    }

    /// Zero every sensor that has a valid current reading by adopting its
    /// last raw value as the offset.
    ///
    /// Returns `true` if at least one sensor was zeroed. Works independently
    /// of the windowed calibration; whichever writes last wins.
    pub fn capture_zero_offsets(&self) -> bool {
        let captured = self.with_state(|state| {
            let now = self.clock.now();
            if !state.initialized {
                return false;
            }

            let mut captured = false;

            if state.snapshot.fan_sample_valid
                && let Some(raw) = state.last_fan_raw_pa
            {
                state.offsets.fan_pa = raw;
                state.snapshot.fan_pressure_pa = 0.0;
                captured = true;
            }

            if state.snapshot.envelope_sample_valid
                && let Some(raw) = state.last_envelope_raw_pa
            {
                state.offsets.envelope_pa = raw;
                state.snapshot.envelope_pressure_pa = 0.0;
                captured = true;
            }

            if captured {
                state.recompute_derived();
                state.touch(now);
            }

            captured
        });

        if captured {
            info!("Captured zero offsets from current readings");
        }

        captured
    }

    /// Reset both offsets and open a new calibration window. Silently ignored
    /// before initialization.
    pub fn begin_calibration(&self) {
        let started = self.with_state(|state| {
            let now = self.clock.now();
            if !state.initialized {
                return false;
            }

            state.offsets = Offsets::ZERO;
            state.calibration.begin(now);
            state.snapshot.calibration_state = CalibrationState::Sampling;
            state.snapshot.calibration_progress_pct = 0;
            state.touch(now);
            true
        });

        if started {
            info!("Calibration started");
        }
    }

    /// Offsets currently subtracted from the raw pressures.
    pub fn offsets(&self) -> Result<Offsets, StoreError> {
        self.with_state(|state| {
            if state.initialized {
                Ok(state.offsets)
            } else {
                Err(StoreError::NotInitialized)
            }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.with_state(|state| state.initialized)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
