//! `pump-probe` command line front end.
//!
//! Settings come from `pump_probe.toml` (or `--config`) layered with
//! `PUMPPROBE_*` environment variables; command line flags override both.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pump_probe_daq::config::{DaqDriver, Settings, StageDriver};
use pump_probe_daq::control::{abort_pair, AbortHandle};
use pump_probe_daq::error::DaqError;
use pump_probe_daq::hardware::{capabilities::Movable, Rig};
use pump_probe_daq::logging::init_tracing;
use pump_probe_daq::measurement::{measure, BurstSpec};
use pump_probe_daq::scan::{DelayScan, ScanOutcome, ScanParameters};
use pump_probe_daq::thermo::{
    read_resistance, read_temperature, Calibration, LogParameters, TemperatureLog,
    VoltageDivider,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pump-probe", version, about = "Pump-probe delay scans and thermistor logging")]
struct Cli {
    /// Configuration file (default: pump_probe.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated stage and acquisition card
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure microstepping, motion profile and enable the stage motor
    InitStage,
    /// Move the stage to an absolute delay in ps
    Move {
        /// Target delay (ps)
        #[arg(allow_negative_numbers = true)]
        position_ps: f64,
    },
    /// Set the stage velocity in rev/s
    Velocity {
        /// Velocity (rev/s)
        velocity: f64,
    },
    /// Set the stage acceleration in rev/s²
    Accel {
        /// Acceleration (rev/s²)
        acceleration: f64,
    },
    /// Set the stage deceleration in rev/s²
    Decel {
        /// Deceleration (rev/s²)
        deceleration: f64,
    },
    /// Declare the current stage position as zero
    Zero,
    /// Read one voltage
    Read {
        /// Analog input channel
        #[arg(long)]
        channel: Option<u8>,
    },
    /// Take an averaged burst and print its mean and standard deviation
    Burst(BurstArgs),
    /// Run a delay scan
    Scan(ScanArgs),
    /// Thermistor readout
    Thermo {
        #[command(subcommand)]
        command: ThermoCommand,
    },
    /// Run a delay scan with a live plot window (needs the `gui` feature)
    Plot(ScanArgs),
}

#[derive(Subcommand, Debug)]
enum ThermoCommand {
    /// Single-sample resistance
    Read,
    /// Averaged resistance and temperature
    ReadBurst(BurstArgs),
    /// Log resistance and temperature over time
    Log(LogArgs),
    /// Log with a live temperature plot (needs the `gui` feature)
    Plot(LogArgs),
}

#[derive(Args, Debug, Clone)]
struct LogArgs {
    /// Number of points
    #[arg(long)]
    steps: Option<usize>,
    /// Seconds between points
    #[arg(long)]
    wait: Option<f64>,
    /// Output directory
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Calibration CSV
    #[arg(long)]
    calibration: Option<PathBuf>,
}

impl LogArgs {
    fn apply(self, settings: &mut Settings) {
        let thermo = &mut settings.thermo;
        if let Some(steps) = self.steps {
            thermo.steps = steps;
        }
        if let Some(wait) = self.wait {
            thermo.wait_secs = wait;
        }
        if let Some(dir) = self.dir {
            thermo.directory = dir;
        }
        if let Some(path) = self.calibration {
            thermo.calibration_path = path;
        }
    }
}

#[derive(Args, Debug, Clone)]
struct BurstArgs {
    /// Analog input channel
    #[arg(long)]
    channel: Option<u8>,
    /// Sample rate (Hz)
    #[arg(long)]
    rate: Option<u32>,
    /// Samples per burst
    #[arg(long)]
    samples: Option<usize>,
    /// Bursts per reading
    #[arg(long)]
    averages: Option<usize>,
}

impl BurstArgs {
    fn apply(&self, settings: &mut Settings) {
        let daq = &mut settings.daq;
        if let Some(channel) = self.channel {
            daq.channel = channel;
        }
        if let Some(rate) = self.rate {
            daq.frequency_hz = rate;
        }
        if let Some(samples) = self.samples {
            daq.samples = samples;
        }
        if let Some(averages) = self.averages {
            daq.averages = averages;
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ScanArgs {
    /// First delay (ps)
    #[arg(long, allow_negative_numbers = true)]
    start: Option<f64>,
    /// Last delay (ps)
    #[arg(long, allow_negative_numbers = true)]
    end: Option<f64>,
    /// Step (ps)
    #[arg(long, allow_negative_numbers = true)]
    step: Option<f64>,
    /// Number of loops
    #[arg(long)]
    loops: Option<usize>,
    /// Seconds to wait after each move
    #[arg(long)]
    wait: Option<f64>,
    /// Output directory
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Scan file number (data_NN.txt)
    #[arg(long)]
    number: Option<u32>,
    #[command(flatten)]
    burst: BurstArgs,
}

impl ScanArgs {
    fn apply(&self, settings: &mut Settings) {
        let scan = &mut settings.scan;
        if let Some(start) = self.start {
            scan.start_ps = start;
        }
        if let Some(end) = self.end {
            scan.end_ps = end;
        }
        if let Some(step) = self.step {
            scan.step_ps = step;
        }
        if let Some(loops) = self.loops {
            scan.loops = loops;
        }
        if let Some(wait) = self.wait {
            scan.wait_secs = wait;
        }
        if let Some(dir) = &self.dir {
            scan.directory = dir.clone();
        }
        if self.number.is_some() {
            scan.scan_number = self.number;
        }
        self.burst.apply(settings);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if cli.simulate {
        settings.stage.driver = StageDriver::Mock;
        settings.daq.driver = DaqDriver::Mock;
    }

    init_tracing(&settings.application.log_level);
    info!("{} starting", settings.application.name);

    match cli.command {
        Command::InitStage => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.initialize().await?;
            stage.disconnect().await?;
            println!("Stage initialized");
        }
        Command::Move { position_ps } => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.move_abs(position_ps).await?;
            stage.disconnect().await?;
            println!("Moved to {} ps", position_ps);
        }
        Command::Velocity { velocity } => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.set_velocity(velocity).await?;
            stage.disconnect().await?;
            println!("Velocity set to {} rev/s", velocity);
        }
        Command::Accel { acceleration } => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.set_acceleration(acceleration).await?;
            stage.disconnect().await?;
            println!("Acceleration set to {} rev/s²", acceleration);
        }
        Command::Decel { deceleration } => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.set_deceleration(deceleration).await?;
            stage.disconnect().await?;
            println!("Deceleration set to {} rev/s²", deceleration);
        }
        Command::Zero => {
            let rig = Rig::open(&settings, true).await?;
            let stage = rig.stage()?;
            stage.zero().await?;
            stage.disconnect().await?;
            println!("Stage position set to zero");
        }
        Command::Read { channel } => {
            let rig = Rig::open(&settings, false).await?;
            let channel = channel.unwrap_or(settings.daq.channel);
            let volts = rig.daq().read_voltage(channel).await?;
            println!("{:.6} V", volts);
        }
        Command::Burst(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            let rig = Rig::open(&settings, false).await?;
            let stats = measure(rig.daq().as_ref(), BurstSpec::from(&settings.daq)).await?;
            println!(
                "{:.6} V (sd {:.6} V, {} samples)",
                stats.mean, stats.std_dev, stats.count
            );
        }
        Command::Scan(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            run_scan(&settings).await?;
        }
        Command::Thermo { command } => run_thermo(command, settings).await?,
        Command::Plot(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            run_plot(&settings).await?;
        }
    }
    Ok(())
}

/// Abort `handle` when Ctrl-C arrives.
fn abort_on_ctrl_c(handle: AbortHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping");
            handle.abort();
        }
    });
}

fn check_outcome(outcome: &ScanOutcome) -> Result<()> {
    println!("Data saved to {}", outcome.path.display());
    if outcome.aborted {
        return Err(DaqError::ScanAborted {
            completed: outcome.completed,
            total: outcome.total,
        }
        .into());
    }
    if let Some(next) = outcome.next_scan_number() {
        println!("Next scan number: {}", next);
    }
    Ok(())
}

async fn prepare_scan(settings: &Settings) -> Result<DelayScan> {
    let params = ScanParameters::from_settings(settings)?;
    let rig = Rig::open(settings, true).await?;
    let scan = DelayScan::new(rig.stage()?, rig.daq(), params);

    let mut events = scan.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("{}", event);
        }
    });
    Ok(scan)
}

async fn run_scan(settings: &Settings) -> Result<()> {
    let scan = prepare_scan(settings).await?;
    let (handle, signal) = abort_pair();
    abort_on_ctrl_c(handle);

    let outcome = scan.run(signal).await?;
    check_outcome(&outcome)
}

/// Show the live figure until the window closes, then stop and collect `task`.
#[cfg(feature = "gui")]
async fn plot_until_closed<T>(
    figure: tokio::sync::watch::Receiver<pump_probe_daq::figure::LiveFigure>,
    status: tokio::sync::watch::Receiver<String>,
    handle: AbortHandle,
    task: tokio::task::JoinHandle<Result<T>>,
) -> Result<T> {
    use pump_probe_daq::gui::{run_plot_window, PlotWindow};

    let window = PlotWindow::new(figure, status, handle.clone());
    // The window owns the main thread; the run keeps going on the runtime workers
    tokio::task::block_in_place(|| run_plot_window(window))
        .map_err(|e| anyhow::anyhow!("plot window failed: {}", e))?;

    handle.abort();
    task.await?
}

#[cfg(feature = "gui")]
async fn run_plot(settings: &Settings) -> Result<()> {
    use std::sync::Arc;
    use tokio::sync::watch;

    let scan = Arc::new(prepare_scan(settings).await?);
    let (handle, signal) = abort_pair();
    abort_on_ctrl_c(handle.clone());

    let (status_tx, status_rx) = watch::channel("Starting scan".to_string());
    let mut events = scan.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            status_tx.send_replace(event.to_string());
        }
    });

    let task = tokio::spawn({
        let scan = scan.clone();
        async move { scan.run(signal).await }
    });
    let outcome = plot_until_closed(scan.figure(), status_rx, handle, task).await?;
    check_outcome(&outcome)
}

#[cfg(not(feature = "gui"))]
async fn run_plot(_settings: &Settings) -> Result<()> {
    Err(DaqError::FeatureNotEnabled("gui".to_string()).into())
}

fn load_calibration(path: &std::path::Path) -> Result<Option<Calibration>> {
    if path.exists() {
        Ok(Some(Calibration::load(path)?))
    } else {
        warn!(
            "Calibration file '{}' not found, recording resistance only",
            path.display()
        );
        Ok(None)
    }
}

async fn run_thermo(command: ThermoCommand, mut settings: Settings) -> Result<()> {
    let divider = VoltageDivider::from(&settings.thermo);

    match command {
        ThermoCommand::Read => {
            let rig = Rig::open(&settings, false).await?;
            let resistance =
                read_resistance(rig.daq().as_ref(), settings.daq.channel, divider).await?;
            println!("{:.1} Ohm", resistance);
        }
        ThermoCommand::ReadBurst(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            let calibration = load_calibration(&settings.thermo.calibration_path)?;
            let rig = Rig::open(&settings, false).await?;
            let reading = read_temperature(
                rig.daq().as_ref(),
                BurstSpec::from(&settings.daq),
                divider,
                calibration.as_ref(),
            )
            .await?;
            println!(
                "{:.4} V, {:.1} Ohm, {:.2} K",
                reading.volts, reading.resistance, reading.temperature
            );
        }
        ThermoCommand::Log(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            let log = prepare_log(&settings).await?;
            let (handle, signal) = abort_pair();
            abort_on_ctrl_c(handle);

            let outcome = log.run(signal).await?;
            println!("Data saved to {}", outcome.path.display());
            outcome.into_result()?;
        }
        ThermoCommand::Plot(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            run_thermo_plot(&settings).await?;
        }
    }
    Ok(())
}

async fn prepare_log(settings: &Settings) -> Result<TemperatureLog> {
    let calibration = load_calibration(&settings.thermo.calibration_path)?;
    let rig = Rig::open(settings, false).await?;
    Ok(TemperatureLog::new(
        rig.daq(),
        calibration,
        LogParameters::from_settings(settings),
    ))
}

#[cfg(feature = "gui")]
async fn run_thermo_plot(settings: &Settings) -> Result<()> {
    use std::sync::Arc;
    use tokio::sync::watch;

    let log = Arc::new(prepare_log(settings).await?);
    let (handle, signal) = abort_pair();
    abort_on_ctrl_c(handle.clone());

    let steps = settings.thermo.steps;
    let (status_tx, status_rx) = watch::channel(format!("Logging {} points", steps));
    let mut figure = log.figure();
    tokio::spawn(async move {
        while figure.changed().await.is_ok() {
            let taken = figure.borrow_and_update().point_count();
            status_tx.send_replace(format!("{} of {} points", taken, steps));
        }
    });

    let task = tokio::spawn({
        let log = log.clone();
        async move { log.run(signal).await }
    });
    let outcome = plot_until_closed(log.figure(), status_rx, handle, task).await?;
    println!("Data saved to {}", outcome.path.display());
    outcome.into_result()?;
    Ok(())
}

#[cfg(not(feature = "gui"))]
async fn run_thermo_plot(_settings: &Settings) -> Result<()> {
    Err(DaqError::FeatureNotEnabled("gui".to_string()).into())
}
