//! Instrument drivers and the factory that wires them from configuration.

pub mod applied_motion;
pub mod capabilities;
pub mod mock;
pub mod scpi_daq;

use crate::config::{DaqDriver, DaqSettings, Settings, StageDriver, StageSettings};
use crate::error::DaqError;
use anyhow::Result;
use applied_motion::AppliedMotionStage;
use capabilities::{AnalogInput, DelayStage};
use mock::{MockDaq, MockStage};
use scpi_daq::ScpiVoltmeter;
use std::sync::Arc;
use tracing::info;

/// Divider voltage the simulated card reports when no stage drives it.
const SIMULATED_DIVIDER_VOLTS: f64 = 2.5;

/// The instruments one command needs.
pub struct Rig {
    stage: Option<Arc<dyn DelayStage>>,
    daq: Arc<dyn AnalogInput>,
}

impl Rig {
    /// Open the configured drivers.
    ///
    /// The stage is only opened when `with_stage` is set, so thermistor runs
    /// never claim the stage's serial port. With both drivers mocked the
    /// simulated photodiode follows the simulated stage.
    pub async fn open(settings: &Settings, with_stage: bool) -> Result<Self> {
        let mut mock_stage = None;
        let stage = if with_stage {
            let (stage, mock) = build_stage(&settings.stage).await?;
            mock_stage = mock;
            Some(stage)
        } else {
            None
        };
        let daq = build_daq(&settings.daq, mock_stage.as_deref()).await?;
        Ok(Self { stage, daq })
    }

    /// The delay stage, if this rig was opened with one.
    pub fn stage(&self) -> Result<Arc<dyn DelayStage>> {
        self.stage.clone().ok_or_else(|| {
            anyhow::Error::from(DaqError::Configuration(
                "this command needs the delay stage".to_string(),
            ))
        })
    }

    /// The analog input.
    pub fn daq(&self) -> Arc<dyn AnalogInput> {
        self.daq.clone()
    }
}

/// Open the configured delay stage.
///
/// A simulated stage is also returned by its concrete type so a simulated
/// card can be coupled to it.
pub async fn build_stage(
    settings: &StageSettings,
) -> Result<(Arc<dyn DelayStage>, Option<Arc<MockStage>>)> {
    match settings.driver {
        StageDriver::AppliedMotion => {
            let stage: Arc<dyn DelayStage> = Arc::new(AppliedMotionStage::open(settings).await?);
            Ok((stage, None))
        }
        StageDriver::Mock => {
            info!("Using simulated delay stage");
            let mock = Arc::new(MockStage::new());
            let stage: Arc<dyn DelayStage> = mock.clone();
            Ok((stage, Some(mock)))
        }
    }
}

/// Open the configured analog input.
///
/// A simulated card follows `mock_stage` when one is given, otherwise it
/// reads a constant divider voltage.
pub async fn build_daq(
    settings: &DaqSettings,
    mock_stage: Option<&MockStage>,
) -> Result<Arc<dyn AnalogInput>> {
    match settings.driver {
        DaqDriver::Scpi => Ok(Arc::new(ScpiVoltmeter::open(settings).await?)),
        DaqDriver::Mock => {
            info!("Using simulated acquisition card");
            let daq = match mock_stage {
                Some(stage) => MockDaq::pump_probe(stage),
                None => MockDaq::constant(SIMULATED_DIVIDER_VOLTS),
            };
            Ok(Arc::new(daq.with_noise(0.005).with_realistic_timing()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use capabilities::Movable;

    fn simulated() -> Settings {
        let mut settings = Settings::default();
        settings.stage.driver = StageDriver::Mock;
        settings.daq.driver = DaqDriver::Mock;
        settings
    }

    #[tokio::test]
    async fn test_simulated_rig_couples_daq_to_stage() {
        let rig = Rig::open(&simulated(), true).await.unwrap();
        let stage = rig.stage().unwrap();
        stage.move_abs(-3.0).await.unwrap();
        let v = rig.daq().read_voltage(1).await.unwrap();
        // Baseline before time zero, within noise
        assert!((v - 0.05).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_build_stage_exposes_mock() {
        let (stage, mock) = build_stage(&simulated().stage).await.unwrap();
        stage.move_abs(2.0).await.unwrap();
        assert_eq!(mock.map(|m| m.move_count()), Some(1));
    }

    #[tokio::test]
    async fn test_daq_only_rig_has_no_stage() {
        let rig = Rig::open(&simulated(), false).await.unwrap();
        assert!(rig.stage().is_err());
    }
}
