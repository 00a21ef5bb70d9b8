//! Sensing core of the blower-door leakage rig
//!
//! Channels wrap the two differential-pressure sensors and keep them alive,
//! the metrics store turns their samples into offset-corrected pressures and
//! derived airflow figures, and the acquisition loop drives both on a fixed
//! period. Nothing here touches hardware directly: sensors come in through
//! [`sensors::PressureSensor`] and time through [`clock::Clock`].

#![no_std]

extern crate alloc;

pub mod acquisition;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod sensors;
