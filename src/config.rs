//! Configuration system using Figment
//!
//! Settings are merged from, in increasing priority:
//! 1. Built-in defaults matching the bench rig
//! 2. A TOML file (`pump_probe.toml` in the working directory, or `--config`)
//! 3. Environment variables prefixed with `PUMPPROBE_`, `__` separating sections
//!
//! ```text
//! PUMPPROBE_STAGE__PORT=/dev/ttyUSB0
//! PUMPPROBE_DAQ__FREQUENCY_HZ=1000
//! PUMPPROBE_SCAN__LOOPS=3
//! ```
//!
//! # Example
//!
//! ```toml
//! [stage]
//! port = "COM12"
//! velocity = 3.0
//!
//! [daq]
//! driver = "scpi"
//! port = "/dev/ttyUSB1"
//! samples = 400
//!
//! [scan]
//! start_ps = -5.0
//! end_ps = 20.0
//! step_ps = 0.5
//! loops = 2
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pump_probe.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PUMPPROBE_";

/// Lowest burst rate the acquisition card accepts.
pub const MIN_DAQ_FREQUENCY_HZ: u32 = 400;
/// Highest burst rate the acquisition card accepts.
pub const MAX_DAQ_FREQUENCY_HZ: u32 = 8192;
/// Largest number of samples in a single burst.
pub const MAX_BURST_SAMPLES: usize = 4096;

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Delay stage connection and motion parameters
    #[serde(default)]
    pub stage: StageSettings,
    /// Acquisition card parameters
    #[serde(default)]
    pub daq: DaqSettings,
    /// Delay scan parameters
    #[serde(default)]
    pub scan: ScanSettings,
    /// Thermistor logging parameters
    #[serde(default)]
    pub thermo: ThermoSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSettings {
    /// Window and log title
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "DUV Code".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which stage implementation to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageDriver {
    /// Applied Motion stepper drive speaking SCL over RS-232
    AppliedMotion,
    /// Simulated stage
    Mock,
}

/// Delay stage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSettings {
    /// Stage implementation
    pub driver: StageDriver,
    /// Serial port (e.g. "COM12", "/dev/ttyUSB0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Microsteps per motor revolution (MR8 selects 20000)
    pub steps_per_rev: f64,
    /// Lead screw revolutions per inch of travel
    pub revs_per_inch: f64,
    /// Optical delay per centimetre of travel; 200/3 for a two-pass stage
    pub ps_per_cm: f64,
    /// Negate positions before converting to steps
    pub invert_direction: bool,
    /// Acceleration sent during initialization (rev/s²)
    pub acceleration: f64,
    /// Deceleration sent during initialization (rev/s²)
    pub deceleration: f64,
    /// Velocity sent during initialization (rev/s)
    pub velocity: f64,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            driver: StageDriver::AppliedMotion,
            port: "COM12".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 2000,
            write_timeout_ms: 2000,
            steps_per_rev: 20000.0,
            revs_per_inch: 2.5,
            ps_per_cm: 200.0 / 3.0,
            invert_direction: true,
            acceleration: 10.0,
            deceleration: 15.0,
            velocity: 3.0,
        }
    }
}

/// Which analog input implementation to read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DaqDriver {
    /// SCPI voltmeter on a serial port
    Scpi,
    /// Simulated card
    Mock,
}

/// SCPI command templates; `{channel}`, `{count}` and `{rate}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScpiCommands {
    /// Query returning one voltage
    pub single: String,
    /// Commands sent before a burst query, in order
    pub burst_setup: Vec<String>,
    /// Query returning `count` comma-separated voltages
    pub burst_query: String,
}

impl Default for ScpiCommands {
    fn default() -> Self {
        Self {
            single: "MEAS:VOLT:DC? (@{channel})".to_string(),
            burst_setup: vec![
                "CONF:VOLT:DC (@{channel})".to_string(),
                "SAMP:COUN {count}".to_string(),
            ],
            burst_query: "READ?".to_string(),
        }
    }
}

/// Acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaqSettings {
    /// Analog input implementation
    pub driver: DaqDriver,
    /// Serial port of the SCPI instrument
    pub port: String,
    /// Baud rate of the SCPI instrument
    pub baud_rate: u32,
    /// Longest silence in a reply, in milliseconds
    pub timeout_ms: u64,
    /// Analog input channel carrying the photodiode signal
    pub channel: u8,
    /// Burst sample rate in Hz
    pub frequency_hz: u32,
    /// Samples kept from each burst
    pub samples: usize,
    /// Bursts concatenated per reading
    pub averages: usize,
    /// SCPI command templates
    #[serde(default)]
    pub scpi: ScpiCommands,
}

impl Default for DaqSettings {
    fn default() -> Self {
        Self {
            driver: DaqDriver::Scpi,
            port: "/dev/ttyUSB1".to_string(),
            baud_rate: 9600,
            timeout_ms: 5000,
            channel: 1,
            frequency_hz: 400,
            samples: 400,
            averages: 1,
            scpi: ScpiCommands::default(),
        }
    }
}

/// Delay scan settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSettings {
    /// First delay position in ps
    pub start_ps: f64,
    /// Last delay position in ps
    pub end_ps: f64,
    /// Step between positions in ps
    pub step_ps: f64,
    /// Number of passes over the position range
    pub loops: usize,
    /// Settle time after each move, seconds
    pub wait_secs: f64,
    /// Settle time after returning to the start position, seconds
    pub start_settle_secs: f64,
    /// Output directory
    pub directory: PathBuf,
    /// File number; the next free number in `directory` when unset
    #[serde(default)]
    pub scan_number: Option<u32>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            start_ps: 0.0,
            end_ps: 10.0,
            step_ps: 1.0,
            loops: 1,
            wait_secs: 1.0,
            start_settle_secs: 5.0,
            directory: PathBuf::from("."),
            scan_number: None,
        }
    }
}

/// Thermistor logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThermoSettings {
    /// Two-column CSV (resistance, temperature) with a header line
    pub calibration_path: PathBuf,
    /// Fixed resistor of the voltage divider, ohms
    pub reference_ohms: f64,
    /// Divider supply voltage
    pub supply_volts: f64,
    /// Number of points in a temperature log
    pub steps: usize,
    /// Time between log points, seconds
    pub wait_secs: f64,
    /// Output directory
    pub directory: PathBuf,
}

impl Default for ThermoSettings {
    fn default() -> Self {
        Self {
            calibration_path: PathBuf::from("calibration.csv"),
            reference_ohms: 5100.0,
            supply_volts: 5.0,
            steps: 1,
            wait_secs: 1.0,
            directory: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Load settings from `pump_probe.toml` (if present) and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load settings from a specific TOML file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string layered over the defaults.
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> AppResult<()> {
        let daq = &self.daq;
        if !(MIN_DAQ_FREQUENCY_HZ..=MAX_DAQ_FREQUENCY_HZ).contains(&daq.frequency_hz) {
            return Err(DaqError::Configuration(format!(
                "daq.frequency_hz must be within {}-{} Hz, got {}",
                MIN_DAQ_FREQUENCY_HZ, MAX_DAQ_FREQUENCY_HZ, daq.frequency_hz
            )));
        }
        if daq.samples == 0 || daq.samples > MAX_BURST_SAMPLES {
            return Err(DaqError::Configuration(format!(
                "daq.samples must be within 1-{}, got {}",
                MAX_BURST_SAMPLES, daq.samples
            )));
        }
        if daq.averages == 0 {
            return Err(DaqError::Configuration(
                "daq.averages must be at least 1".to_string(),
            ));
        }
        if daq.samples * daq.averages < 2 {
            return Err(DaqError::Configuration(
                "daq.samples * daq.averages must be at least 2 for a standard deviation"
                    .to_string(),
            ));
        }

        let stage = &self.stage;
        for (name, value) in [
            ("stage.steps_per_rev", stage.steps_per_rev),
            ("stage.revs_per_inch", stage.revs_per_inch),
            ("stage.ps_per_cm", stage.ps_per_cm),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(DaqError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let scan = &self.scan;
        if scan.loops == 0 {
            return Err(DaqError::Configuration(
                "scan.loops must be at least 1".to_string(),
            ));
        }
        if scan.step_ps == 0.0 || !scan.step_ps.is_finite() {
            return Err(DaqError::Configuration(
                "scan.step_ps must be a non-zero number".to_string(),
            ));
        }
        for (name, value) in [
            ("scan.wait_secs", scan.wait_secs),
            ("scan.start_settle_secs", scan.start_settle_secs),
            ("thermo.wait_secs", self.thermo.wait_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DaqError::Configuration(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }

        if self.thermo.reference_ohms <= 0.0 || self.thermo.supply_volts <= 0.0 {
            return Err(DaqError::Configuration(
                "thermo.reference_ohms and thermo.supply_volts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.stage.baud_rate, 9600);
        assert_eq!(settings.daq.frequency_hz, 400);
        assert_eq!(settings.scan.start_settle_secs, 5.0);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
[stage]
driver = "mock"
port = "/dev/ttyUSB0"

[scan]
start_ps = -2.0
end_ps = 3.0
step_ps = 0.5
loops = 4
"#,
        )
        .unwrap();
        assert_eq!(settings.stage.driver, StageDriver::Mock);
        assert_eq!(settings.stage.port, "/dev/ttyUSB0");
        assert_eq!(settings.stage.velocity, 3.0);
        assert_eq!(settings.scan.loops, 4);
        assert_eq!(settings.daq.samples, 400);
    }

    #[test]
    fn test_rejects_out_of_range_frequency() {
        let err = Settings::from_toml_str("[daq]\nfrequency_hz = 100\n").unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn test_rejects_single_sample_without_averages() {
        let err = Settings::from_toml_str("[daq]\nsamples = 1\naverages = 1\n").unwrap_err();
        assert!(err.to_string().contains("standard deviation"));
    }

    #[test]
    fn test_rejects_zero_step() {
        let err = Settings::from_toml_str("[scan]\nstep_ps = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("step_ps"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daq]\ndriver = \"mock\"\naverages = 3").unwrap();
        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.daq.driver, DaqDriver::Mock);
        assert_eq!(settings.daq.averages, 3);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.scan.loops, 1);
    }
}
