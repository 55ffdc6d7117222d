//! Delay scan loop: move, settle, measure, record, then save the table.

use super::plan::ScanPlan;
use super::table::ScanTable;
use crate::config::Settings;
use crate::control::AbortSignal;
use crate::data::storage::{next_scan_number, scan_file_path, write_matrix, write_metadata};
use crate::error::AppResult;
use crate::figure::{self, LiveFigure};
use crate::hardware::capabilities::{AnalogInput, DelayStage};
use crate::measurement::{measure, BurstSpec, Statistics};
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Capacity of the progress event channel
const EVENT_CAPACITY: usize = 1024;

/// Everything that defines one scan run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParameters {
    /// Positions to visit
    pub plan: ScanPlan,
    /// Passes over the plan
    pub loops: usize,
    /// Settle time after every move
    pub wait: Duration,
    /// Settle time after returning to the start position
    pub start_settle: Duration,
    /// Averaged reading taken at every position
    pub burst: BurstSpec,
    /// Output directory
    pub directory: PathBuf,
    /// File number; next free one in `directory` when `None`
    pub scan_number: Option<u32>,
}

impl ScanParameters {
    /// Build from validated settings.
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let scan = &settings.scan;
        Ok(Self {
            plan: ScanPlan::new(scan.start_ps, scan.end_ps, scan.step_ps)?,
            loops: scan.loops,
            wait: Duration::from_secs_f64(scan.wait_secs),
            start_settle: Duration::from_secs_f64(scan.start_settle_secs),
            burst: BurstSpec::from(&settings.daq),
            directory: scan.directory.clone(),
            scan_number: scan.scan_number,
        })
    }
}

/// Progress notifications published while a scan runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A loop is starting (0-based)
    LoopStarted {
        /// Loop index
        loop_index: usize,
    },
    /// A position was measured
    Point {
        /// Loop index
        loop_index: usize,
        /// Position index within the plan
        position_index: usize,
        /// Delay in ps
        position: f64,
        /// Averaged reading
        stats: Statistics,
    },
    /// A loop finished and the stage went back to zero
    LoopFinished {
        /// Loop index
        loop_index: usize,
    },
    /// The table was written
    Saved {
        /// Data file
        path: PathBuf,
    },
    /// The scan stopped early
    Aborted {
        /// Points measured
        completed: usize,
        /// Points planned
        total: usize,
    },
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEvent::LoopStarted { loop_index } => write!(f, "loop {} started", loop_index + 1),
            ScanEvent::Point {
                loop_index,
                position,
                stats,
                ..
            } => write!(
                f,
                "loop {} at {} ps: {:.6} V (sd {:.6})",
                loop_index + 1,
                position,
                stats.mean,
                stats.std_dev
            ),
            ScanEvent::LoopFinished { loop_index } => {
                write!(f, "loop {} finished", loop_index + 1)
            }
            ScanEvent::Saved { path } => write!(f, "saved {}", path.display()),
            ScanEvent::Aborted { completed, total } => {
                write!(f, "aborted after {} of {} points", completed, total)
            }
        }
    }
}

/// Run parameters written next to the data file.
#[derive(Debug, Serialize)]
pub struct ScanMetadata {
    /// Start of the run
    pub started: DateTime<Local>,
    /// End of the run
    pub finished: DateTime<Local>,
    /// File number
    pub scan_number: u32,
    /// Positions
    pub plan: ScanPlan,
    /// Loops requested
    pub loops: usize,
    /// Per-move settle time
    pub wait_secs: f64,
    /// Settle time at the start position
    pub start_settle_secs: f64,
    /// Analog input channel
    pub channel: u8,
    /// Burst rate
    pub rate_hz: u32,
    /// Samples per burst
    pub samples: usize,
    /// Bursts per reading
    pub averages: usize,
    /// Points measured
    pub points_measured: usize,
    /// Points planned
    pub points_total: usize,
    /// Whether the run was stopped early
    pub aborted: bool,
    /// Column meaning of the data file
    pub columns: Vec<String>,
}

/// Result of a finished or aborted scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Measured table
    pub table: ScanTable,
    /// Data file
    pub path: PathBuf,
    /// Number used for the data file
    pub scan_number: u32,
    /// Points measured
    pub completed: usize,
    /// Points planned
    pub total: usize,
    /// Whether the run was stopped early
    pub aborted: bool,
}

impl ScanOutcome {
    /// Number to use for the next scan; `None` past the largest file number.
    pub fn next_scan_number(&self) -> Option<u32> {
        self.scan_number.checked_add(1)
    }
}

/// Delay scan control loop.
///
/// For every loop: move to the start and settle, then at each position move,
/// wait, take an averaged reading and record it; finally return the stage to
/// zero. The table is written once all loops are done, or on abort with the
/// unmeasured cells left as `nan`.
pub struct DelayScan {
    stage: Arc<dyn DelayStage>,
    daq: Arc<dyn AnalogInput>,
    params: ScanParameters,
    events: broadcast::Sender<ScanEvent>,
    figure: watch::Sender<LiveFigure>,
}

impl DelayScan {
    /// Prepare a scan; nothing moves until [`DelayScan::run`].
    pub fn new(
        stage: Arc<dyn DelayStage>,
        daq: Arc<dyn AnalogInput>,
        params: ScanParameters,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (figure, _) = figure::channel(LiveFigure::delay_scan());
        Self {
            stage,
            daq,
            params,
            events,
            figure,
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Receiver for the live figure.
    pub fn figure(&self) -> watch::Receiver<LiveFigure> {
        self.figure.subscribe()
    }

    fn emit(&self, event: ScanEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Run the scan to completion or abort, then persist the table.
    pub async fn run(&self, mut abort: AbortSignal) -> Result<ScanOutcome> {
        let params = &self.params;
        let positions = params.plan.positions();
        let total = positions.len() * params.loops;
        let mut table = ScanTable::new(positions.clone(), params.loops);
        let started = Local::now();
        let mut completed = 0;
        let mut aborted = false;
        let mut needs_home = false;

        self.figure.send_replace(LiveFigure::delay_scan());
        info!(
            "Starting scan: {} positions from {} ps to {} ps, {} loop(s)",
            positions.len(),
            params.plan.start(),
            params.plan.end(),
            params.loops
        );

        'loops: for loop_index in 0..params.loops {
            if abort.is_aborted() {
                aborted = true;
                break 'loops;
            }
            self.emit(ScanEvent::LoopStarted { loop_index });
            let mut series = 0;
            self.figure.send_modify(|fig| {
                series = fig.add_series(format!("loop {}", loop_index + 1));
            });

            needs_home = true;
            self.stage.move_abs(params.plan.start()).await?;
            if abort.sleep(params.start_settle).await {
                aborted = true;
                break 'loops;
            }

            for (position_index, &position) in positions.iter().enumerate() {
                if abort.is_aborted() {
                    aborted = true;
                    break 'loops;
                }

                self.stage.move_abs(position).await?;
                if abort.sleep(params.wait).await {
                    aborted = true;
                    break 'loops;
                }

                let stats = measure(self.daq.as_ref(), params.burst).await?;
                table.record(loop_index, position_index, &stats);
                self.figure
                    .send_modify(|fig| fig.push(series, position, stats.mean));
                completed += 1;

                self.emit(ScanEvent::Point {
                    loop_index,
                    position_index,
                    position,
                    stats,
                });
            }

            self.stage.move_abs(0.0).await?;
            needs_home = false;
            self.emit(ScanEvent::LoopFinished { loop_index });
        }

        if aborted {
            warn!("Scan aborted after {} of {} points", completed, total);
            if needs_home {
                self.stage.move_abs(0.0).await?;
            }
            self.emit(ScanEvent::Aborted { completed, total });
        }

        let scan_number = match params.scan_number {
            Some(number) => number,
            None => next_scan_number(&params.directory)?,
        };
        let path = scan_file_path(&params.directory, scan_number);
        write_matrix(&path, &table.to_rows())?;

        let metadata = ScanMetadata {
            started,
            finished: Local::now(),
            scan_number,
            plan: params.plan,
            loops: params.loops,
            wait_secs: params.wait.as_secs_f64(),
            start_settle_secs: params.start_settle.as_secs_f64(),
            channel: params.burst.channel,
            rate_hz: params.burst.rate_hz,
            samples: params.burst.samples,
            averages: params.burst.averages,
            points_measured: completed,
            points_total: total,
            aborted,
            columns: column_names(params.loops),
        };
        write_metadata(&path, &metadata)?;
        self.emit(ScanEvent::Saved { path: path.clone() });

        Ok(ScanOutcome {
            table,
            path,
            scan_number,
            completed,
            total,
            aborted,
        })
    }
}

fn column_names(loops: usize) -> Vec<String> {
    let mut columns = vec!["position_ps".to_string()];
    for n in 1..=loops {
        columns.push(format!("mean_v_loop{}", n));
        columns.push(format!("std_v_loop{}", n));
    }
    columns
}
