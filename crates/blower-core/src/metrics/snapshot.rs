//! Snapshot types handed out by the metrics store

/// Progress of the zero-offset calibration, as shown to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    /// No calibration has run since initialization
    #[default]
    Idle,
    /// Accumulating readings inside the calibration window
    Sampling,
    /// Window closed, offsets committed where enough samples were seen
    Done,
}

impl CalibrationState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sampling => "sampling",
            Self::Done => "done",
        }
    }
}

/// Zero-point baselines subtracted from the raw pressures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offsets {
    pub fan_pa: f32,
    pub envelope_pa: f32,
}

impl Offsets {
    pub const ZERO: Self = Self {
        fan_pa: 0.0,
        envelope_pa: 0.0,
    };
}

/// Latest consistent set of readings and derived values.
///
/// Readers always receive a copy taken under the store lock, so every field
/// belongs to the same completed update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    /// Offset-corrected fan duct pressure
    pub fan_pressure_pa: f32,
    pub fan_temperature_c: f32,
    pub fan_sample_valid: bool,
    /// Offset-corrected envelope pressure
    pub envelope_pressure_pa: f32,
    pub envelope_temperature_c: f32,
    pub envelope_sample_valid: bool,

    pub fan_speed_units: f32,
    pub estimated_air_leakage_units: f32,

    pub calibration_state: CalibrationState,
    pub calibration_progress_pct: u8,
    /// Offsets reported when the last calibration window closed
    pub calibration_offsets: Offsets,

    /// Incremented on every state-affecting write
    pub update_sequence: u64,
    /// Monotonic time of the last write
    pub last_update_ms: u64,
}

impl MetricsSnapshot {
    pub const EMPTY: Self = Self {
        fan_pressure_pa: 0.0,
        fan_temperature_c: 0.0,
        fan_sample_valid: false,
        envelope_pressure_pa: 0.0,
        envelope_temperature_c: 0.0,
        envelope_sample_valid: false,
        fan_speed_units: 0.0,
        estimated_air_leakage_units: 0.0,
        calibration_state: CalibrationState::Idle,
        calibration_progress_pct: 0,
        calibration_offsets: Offsets::ZERO,
        update_sequence: 0,
        last_update_ms: 0,
    };

    /// True when both pressure channels delivered a sample in the last update.
    pub fn both_valid(&self) -> bool {
        self.fan_sample_valid && self.envelope_sample_valid
    }
}
