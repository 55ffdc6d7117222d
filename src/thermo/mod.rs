//! Thermistor readout through a voltage divider.
//!
//! The thermistor forms the lower leg of a divider with a fixed reference
//! resistor, so the card sees `V = Vs * R / (R + Rref)` and
//! `R = Rref * Vs / V - Rref`.

pub mod calibration;
pub mod logger;

pub use calibration::Calibration;
pub use logger::{LogParameters, TemperatureLog, TemperatureOutcome};

use crate::config::ThermoSettings;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::AnalogInput;
use crate::measurement::{acquire_averaged, mean, BurstSpec};
use anyhow::Result;
use serde::Serialize;

/// Fixed half of the divider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageDivider {
    /// Reference resistor, ohms
    pub reference_ohms: f64,
    /// Supply voltage
    pub supply_volts: f64,
}

impl Default for VoltageDivider {
    fn default() -> Self {
        Self {
            reference_ohms: 5100.0,
            supply_volts: 5.0,
        }
    }
}

impl From<&ThermoSettings> for VoltageDivider {
    fn from(settings: &ThermoSettings) -> Self {
        Self {
            reference_ohms: settings.reference_ohms,
            supply_volts: settings.supply_volts,
        }
    }
}

impl VoltageDivider {
    /// Thermistor resistance for a measured divider voltage.
    pub fn resistance(&self, volts: f64) -> AppResult<f64> {
        resistance_from_voltage(volts, self.reference_ohms, self.supply_volts)
    }
}

/// `reference_ohms * supply_volts / volts - reference_ohms`.
///
/// Zero, negative or non-finite voltages have no physical resistance.
pub fn resistance_from_voltage(volts: f64, reference_ohms: f64, supply_volts: f64) -> AppResult<f64> {
    if !(volts.is_finite() && volts > 0.0) {
        return Err(DaqError::Processing(format!(
            "divider voltage {} V gives no resistance",
            volts
        )));
    }
    Ok(reference_ohms * supply_volts / volts - reference_ohms)
}

/// One converted thermistor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    /// Mean divider voltage
    pub volts: f64,
    /// Thermistor resistance, ohms
    pub resistance: f64,
    /// Interpolated temperature; `NaN` without a calibration
    pub temperature: f64,
}

/// Single-sample resistance reading.
pub async fn read_resistance(
    daq: &dyn AnalogInput,
    channel: u8,
    divider: VoltageDivider,
) -> Result<f64> {
    let volts = daq.read_voltage(channel).await?;
    Ok(divider.resistance(volts)?)
}

/// Averaged reading converted to resistance and temperature.
pub async fn read_temperature(
    daq: &dyn AnalogInput,
    spec: BurstSpec,
    divider: VoltageDivider,
    calibration: Option<&Calibration>,
) -> Result<TemperatureReading> {
    let voltages = acquire_averaged(daq, spec).await?;
    let volts = mean(&voltages)?;
    let resistance = divider.resistance(volts)?;
    let temperature = calibration.map_or(f64::NAN, |cal| cal.temperature(resistance));
    Ok(TemperatureReading {
        volts,
        resistance,
        temperature,
    })
}
