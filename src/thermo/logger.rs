//! Periodic thermistor logging to `thermo_NN.txt` with a live figure.

use super::{Calibration, VoltageDivider};
use crate::config::Settings;
use crate::control::AbortSignal;
use crate::data::storage::{next_file_number, numbered_path, write_matrix, write_metadata};
use crate::error::DaqError;
use crate::figure::{self, LiveFigure};
use crate::hardware::capabilities::AnalogInput;
use crate::measurement::{acquire_averaged, mean, BurstSpec};
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// File prefix for temperature logs.
pub const LOG_PREFIX: &str = "thermo";

/// Parameters of one temperature log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogParameters {
    /// Number of points
    pub steps: usize,
    /// Time between points
    pub wait: Duration,
    /// One burst per point; `averages` is ignored
    pub burst: BurstSpec,
    /// Divider constants
    pub divider: VoltageDivider,
    /// Output directory
    pub directory: PathBuf,
}

impl LogParameters {
    /// Build from validated settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            steps: settings.thermo.steps,
            wait: Duration::from_secs_f64(settings.thermo.wait_secs),
            burst: BurstSpec {
                averages: 1,
                ..BurstSpec::from(&settings.daq)
            },
            divider: VoltageDivider::from(&settings.thermo),
            directory: settings.thermo.directory.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LogMetadata {
    started: DateTime<Local>,
    finished: DateTime<Local>,
    steps: usize,
    points_measured: usize,
    wait_secs: f64,
    channel: u8,
    rate_hz: u32,
    samples: usize,
    reference_ohms: f64,
    supply_volts: f64,
    calibrated: bool,
    aborted: bool,
    columns: [&'static str; 3],
}

/// Result of a temperature log.
#[derive(Debug, Clone)]
pub struct TemperatureOutcome {
    /// `[time_s, resistance_ohm, temperature]` per point
    pub rows: Vec<Vec<f64>>,
    /// Data file
    pub path: PathBuf,
    /// Points planned
    pub total: usize,
    /// Whether the log was stopped early
    pub aborted: bool,
}

/// Periodic resistance/temperature logger.
pub struct TemperatureLog {
    daq: Arc<dyn AnalogInput>,
    calibration: Option<Calibration>,
    params: LogParameters,
    figure: watch::Sender<LiveFigure>,
}

impl TemperatureLog {
    /// Prepare a log. Without a calibration only resistance is recorded.
    pub fn new(
        daq: Arc<dyn AnalogInput>,
        calibration: Option<Calibration>,
        params: LogParameters,
    ) -> Self {
        let (figure, _) = figure::channel(Self::empty_figure(calibration.is_some()));
        Self {
            daq,
            calibration,
            params,
            figure,
        }
    }

    fn empty_figure(calibrated: bool) -> LiveFigure {
        let mut figure = if calibrated {
            LiveFigure::temperature_log("Temperature (K)")
        } else {
            LiveFigure::temperature_log("Resistance (Ohm)")
        };
        figure.add_series("thermistor");
        figure
    }

    /// Receiver for the live figure.
    pub fn figure(&self) -> watch::Receiver<LiveFigure> {
        self.figure.subscribe()
    }

    /// Take `steps` points `wait` apart, then write them to `thermo_NN.txt`.
    ///
    /// Each point waits first, then reads one burst; its time stamp is the
    /// nominal `index * wait`.
    pub async fn run(&self, mut abort: AbortSignal) -> Result<TemperatureOutcome> {
        let params = &self.params;
        let started = Local::now();
        let mut rows = Vec::with_capacity(params.steps);
        let mut aborted = false;

        self.figure
            .send_replace(Self::empty_figure(self.calibration.is_some()));
        info!(
            "Logging {} point(s) every {:?}",
            params.steps, params.wait
        );

        for index in 0..params.steps {
            if abort.sleep(params.wait).await {
                aborted = true;
                break;
            }

            let voltages = acquire_averaged(self.daq.as_ref(), params.burst).await?;
            let volts = mean(&voltages)?;
            let resistance = params.divider.resistance(volts)?;
            let temperature = self
                .calibration
                .as_ref()
                .map_or(f64::NAN, |cal| cal.temperature(resistance));
            let time = index as f64 * params.wait.as_secs_f64();
            debug!(
                "t={:.1}s V={:.4} R={:.1} T={:.1}",
                time, volts, resistance, temperature
            );

            let plotted = if self.calibration.is_some() {
                temperature
            } else {
                resistance
            };
            self.figure.send_modify(|fig| fig.push(0, time, plotted));
            rows.push(vec![time, resistance, temperature]);
        }

        if aborted {
            warn!(
                "Temperature log aborted after {} of {} points",
                rows.len(),
                params.steps
            );
        }

        let number = next_file_number(&params.directory, LOG_PREFIX)?;
        let path = numbered_path(&params.directory, LOG_PREFIX, number);
        write_matrix(&path, &rows)?;
        write_metadata(
            &path,
            &LogMetadata {
                started,
                finished: Local::now(),
                steps: params.steps,
                points_measured: rows.len(),
                wait_secs: params.wait.as_secs_f64(),
                channel: params.burst.channel,
                rate_hz: params.burst.rate_hz,
                samples: params.burst.samples,
                reference_ohms: params.divider.reference_ohms,
                supply_volts: params.divider.supply_volts,
                calibrated: self.calibration.is_some(),
                aborted,
                columns: ["time_s", "resistance_ohm", "temperature"],
            },
        )?;

        Ok(TemperatureOutcome {
            rows,
            path,
            total: params.steps,
            aborted,
        })
    }
}

impl TemperatureOutcome {
    /// Turn an aborted log into an error after its data was saved.
    pub fn into_result(self) -> Result<Self> {
        if self.aborted {
            return Err(DaqError::ScanAborted {
                completed: self.rows.len(),
                total: self.total,
            }
            .into());
        }
        Ok(self)
    }
}
