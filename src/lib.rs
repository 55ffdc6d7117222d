//! Core library for the pump-probe rig.
//!
//! A delay scan steps a serial delay stage through a range of optical
//! delays, reads an averaged photodiode voltage at every position and writes
//! the per-loop mean and standard deviation to `data_NN.txt`. The thermistor
//! side turns divider voltages into resistance and, through a calibration
//! table, temperature.
//!
//! The `pump-probe` binary drives everything from the command line; the
//! `gui` feature adds a live plot window.

pub mod adapters;
pub mod config;
pub mod control;
pub mod data;
pub mod error;
pub mod figure;
#[cfg(feature = "gui")]
pub mod gui;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod scan;
pub mod thermo;
