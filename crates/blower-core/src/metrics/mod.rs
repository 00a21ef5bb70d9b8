//! Derived metrics for the blower-door rig
//!
//! Raw pressure samples enter through [`MetricsStore::update`]. The store
//! applies the zero offsets, steps the calibration window, runs the derived
//! models and publishes the result as a [`MetricsSnapshot`] that any other
//! execution context can copy out.

mod calibration;
mod models;
mod snapshot;
mod store;

pub use calibration::*;
pub use models::*;
pub use snapshot::*;
pub use store::*;
