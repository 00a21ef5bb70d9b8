//! Desktop simulator for the blower-door sensing core.
//!
//! Runs the acquisition loop on its own thread against two synthetic
//! differential-pressure sensors, while the main thread plays the operator:
//! it runs a zero calibration with the fan off, switches the fan on, reads
//! back snapshots and finally re-zeroes with a manual capture.
//!
//! ```text
//! blower-simulator [rig-config.bin]
//! ```
//!
//! The optional argument is a postcard-encoded `RigConfig`. Set `RUST_LOG`
//! to `debug` to see per-read channel logging.

mod sim;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use blower_core::acquisition::AcquisitionLoop;
use blower_core::config::RigConfig;
use blower_core::metrics::{CalibrationState, MetricsSnapshot, MetricsStore};
use log::{error, info, warn};

use sim::{FaultProfile, HostClock, SimulatedSensor};

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// How often the operator thread polls the store.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Give up on a calibration that has not finished after this long.
const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the fan runs before the rig is switched off again.
const FAN_RUN_TIME: Duration = Duration::from_secs(3);

/// Zero-point drift of the fan-duct sensor.
const FAN_BASELINE_PA: f32 = 1.8;

/// Zero-point drift of the envelope sensor.
const ENVELOPE_BASELINE_PA: f32 = -0.7;

/// Fan-duct pressure while the fan is running.
const FAN_LOADED_PA: f32 = 42.0;

/// House depressurization while the fan is running.
const ENVELOPE_LOADED_PA: f32 = -50.0;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn load_config() -> RigConfig {
    let Some(path) = std::env::args().nth(1) else {
        info!("No config given, using defaults");
        return RigConfig::default();
    };

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    };

    match RigConfig::from_bytes(&bytes) {
        Ok(config) => {
            info!("Loaded rig config from {}", path);
            config
        }
        Err(e) => {
            error!("Invalid rig config {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn fan_sensor(fan_running: &Arc<AtomicBool>) -> SimulatedSensor {
    SimulatedSensor::new(
        "fan",
        FAN_BASELINE_PA,
        FAN_LOADED_PA,
        24.5,
        fan_running.clone(),
        FaultProfile {
            bus_error_every: 97,
            bus_error_burst: 3,
            ..FaultProfile::default()
        },
    )
}

fn envelope_sensor(fan_running: &Arc<AtomicBool>) -> SimulatedSensor {
    SimulatedSensor::new(
        "envelope",
        ENVELOPE_BASELINE_PA,
        ENVELOPE_LOADED_PA,
        19.0,
        fan_running.clone(),
        FaultProfile {
            failed_inits: 2,
            crc_mismatch_every: 41,
            ..FaultProfile::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Operator script
// ---------------------------------------------------------------------------

fn log_snapshot(tag: &str, snapshot: &MetricsSnapshot) {
    info!(
        "[{}] seq={} fan={:.2} Pa ({}) env={:.2} Pa ({}) speed={:.2} leakage={:.2} cal={} {}%",
        tag,
        snapshot.update_sequence,
        snapshot.fan_pressure_pa,
        if snapshot.fan_sample_valid { "ok" } else { "--" },
        snapshot.envelope_pressure_pa,
        if snapshot.envelope_sample_valid { "ok" } else { "--" },
        snapshot.fan_speed_units,
        snapshot.estimated_air_leakage_units,
        snapshot.calibration_state.label(),
        snapshot.calibration_progress_pct,
    );
}

/// Block until the acquisition thread has initialized the store.
fn wait_for_store(store: &MetricsStore<HostClock>) -> MetricsSnapshot {
    loop {
        if let Ok(snapshot) = store.get_snapshot() {
            return snapshot;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn run_calibration(store: &MetricsStore<HostClock>) -> bool {
    info!("Fan off, starting zero calibration");
    store.begin_calibration();

    let started = Instant::now();
    while started.elapsed() < CALIBRATION_TIMEOUT {
        std::thread::sleep(POLL_INTERVAL);

        let Ok(snapshot) = store.get_snapshot() else {
            continue;
        };
        if snapshot.calibration_state == CalibrationState::Done {
            let offsets = snapshot.calibration_offsets;
            info!(
                "Calibration done: fan offset {:.3} Pa, envelope offset {:.3} Pa",
                offsets.fan_pa, offsets.envelope_pa
            );
            return true;
        }
        info!("Calibrating... {}%", snapshot.calibration_progress_pct);
    }

    warn!("Calibration did not finish within {:?}", CALIBRATION_TIMEOUT);
    false
}

fn operate(store: &MetricsStore<HostClock>, fan_running: &AtomicBool) {
    log_snapshot("startup", &wait_for_store(store));

    if !run_calibration(store) {
        return;
    }

    info!("Fan on");
    fan_running.store(true, Ordering::Relaxed);
    let started = Instant::now();
    while started.elapsed() < FAN_RUN_TIME {
        std::thread::sleep(POLL_INTERVAL);
        if let Ok(snapshot) = store.get_snapshot() {
            log_snapshot("test", &snapshot);
        }
    }

    info!("Fan off, capturing manual zero");
    fan_running.store(false, Ordering::Relaxed);
    std::thread::sleep(POLL_INTERVAL);
    if store.capture_zero_offsets() {
        if let Ok(offsets) = store.offsets() {
            info!(
                "Manual zero: fan offset {:.3} Pa, envelope offset {:.3} Pa",
                offsets.fan_pa, offsets.envelope_pa
            );
        }
    } else {
        warn!("Manual zero skipped, a sensor had no valid reading yet");
    }

    std::thread::sleep(POLL_INTERVAL);
    if let Ok(snapshot) = store.get_snapshot() {
        log_snapshot("final", &snapshot);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting blower-door simulator");

    let config = load_config();
    let store = MetricsStore::new(HostClock::new());
    let fan_running = Arc::new(AtomicBool::new(false));
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut acquisition = AcquisitionLoop::new(
                &config,
                fan_sensor(&fan_running),
                envelope_sensor(&fan_running),
                &store,
            );
            info!(
                "Acquisition running every {} ms",
                acquisition.sample_period().as_millis()
            );

            embassy_futures::block_on(async {
                while !stop.load(Ordering::Relaxed) {
                    acquisition.step().await;
                }
            });
        });

        operate(&store, &fan_running);
        stop.store(true, Ordering::Relaxed);
    });

    info!("Simulator finished");
}
