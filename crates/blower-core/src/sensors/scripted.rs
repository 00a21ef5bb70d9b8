//! Scripted sensor used by unit tests

use alloc::collections::VecDeque;

use super::{PressureSensor, Sample, SensorError};
use crate::config::PortConfig;

/// Sensor that replays scripted results. Once a script runs dry the
/// sensor keeps succeeding.
#[derive(Default)]
pub struct ScriptedSensor {
    pub init_results: VecDeque<Result<(), SensorError>>,
    pub read_results: VecDeque<Result<Sample, SensorError>>,
    pub init_calls: u32,
    pub read_calls: u32,
}

impl ScriptedSensor {
    pub fn with_reads(reads: impl IntoIterator<Item = Result<Sample, SensorError>>) -> Self {
        Self {
            read_results: reads.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl PressureSensor for ScriptedSensor {
    async fn initialize(&mut self, _port: &PortConfig) -> Result<(), SensorError> {
        self.init_calls += 1;
        self.init_results.pop_front().unwrap_or(Ok(()))
    }

    async fn read_sample(&mut self) -> Result<Sample, SensorError> {
        self.read_calls += 1;
        self.read_results
            .pop_front()
            .unwrap_or(Ok(Sample::new(0.0, 20.0)))
    }

    fn last_bus_result(&self) -> i32 {
        -5
    }
}
