//! Thermistor logging from configuration through to the output file.

use pump_probe_daq::{
    config::{DaqDriver, Settings},
    control::{abort_pair, AbortSignal},
    data::storage::read_matrix,
    hardware::Rig,
    thermo::{Calibration, LogParameters, TemperatureLog},
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn write_calibration(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("calibration.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "resistance,temperature").unwrap();
    // Descending resistance, as thermistor tables usually are
    writeln!(file, "9000,280").unwrap();
    writeln!(file, "5100,300").unwrap();
    writeln!(file, "2000,340").unwrap();
    path
}

#[tokio::test]
async fn test_log_from_settings() {
    let dir = tempfile::tempdir().unwrap();
    let calibration_path = write_calibration(dir.path());
    let settings = Settings::from_toml_str(&format!(
        r#"
[daq]
driver = "mock"
samples = 8

[thermo]
steps = 4
wait_secs = 0.0
directory = "{}"
calibration_path = "{}"
"#,
        dir.path().join("logs").display(),
        calibration_path.display()
    ))
    .unwrap();
    assert_eq!(settings.daq.driver, DaqDriver::Mock);

    let calibration = Calibration::load(&settings.thermo.calibration_path).unwrap();
    assert_eq!(calibration.range(), (2000.0, 9000.0));

    // The simulated card sits at half the supply without a stage
    let rig = Rig::open(&settings, false).await.unwrap();
    assert!(rig.stage().is_err());

    let params = LogParameters::from_settings(&settings);
    assert_eq!(params.burst.averages, 1);
    let log = TemperatureLog::new(rig.daq(), Some(calibration), params);
    let outcome = log.run(AbortSignal::never()).await.unwrap();

    assert_eq!(outcome.path, dir.path().join("logs").join("thermo_01.txt"));
    let rows = read_matrix(&outcome.path).unwrap();
    assert_eq!(rows.len(), 4);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 3);
        assert_eq!(row[0], 0.0, "row {}", i);
        // Noise of a few mV moves the reading by tens of ohms at most
        assert!((row[1] - 5100.0).abs() < 100.0, "resistance {}", row[1]);
        assert!((row[2] - 300.0).abs() < 2.0, "temperature {}", row[2]);
    }
}

#[tokio::test]
async fn test_second_log_gets_next_number() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.daq.driver = DaqDriver::Mock;
    settings.daq.samples = 4;
    settings.thermo.wait_secs = 0.0;
    settings.thermo.directory = dir.path().to_path_buf();

    let rig = Rig::open(&settings, false).await.unwrap();
    for expected in ["thermo_01.txt", "thermo_02.txt"] {
        let log = TemperatureLog::new(rig.daq(), None, LogParameters::from_settings(&settings));
        let outcome = log.run(AbortSignal::never()).await.unwrap();
        assert_eq!(outcome.path, dir.path().join(expected));
        assert!(outcome.rows[0][2].is_nan());
    }
}

#[tokio::test]
async fn test_live_figure_follows_running_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.daq.driver = DaqDriver::Mock;
    settings.daq.samples = 4;
    settings.thermo.steps = 1000;
    settings.thermo.wait_secs = 0.01;
    settings.thermo.directory = dir.path().to_path_buf();

    let rig = Rig::open(&settings, false).await.unwrap();
    let log = Arc::new(TemperatureLog::new(
        rig.daq(),
        None,
        LogParameters::from_settings(&settings),
    ));
    let mut figure = log.figure();
    let (handle, signal) = abort_pair();
    let task = tokio::spawn({
        let log = log.clone();
        async move { log.run(signal).await }
    });

    // Stop once the window would have drawn three points
    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            figure.changed().await.unwrap();
            let taken = figure.borrow_and_update().point_count();
            if taken >= 3 {
                return taken;
            }
        }
    })
    .await
    .unwrap();
    handle.abort();

    let outcome = task.await.unwrap().unwrap();
    assert!(outcome.aborted);
    assert!(outcome.rows.len() >= seen);
    assert!(outcome.rows.len() < 1000);
    assert_eq!(log.figure().borrow().point_count(), outcome.rows.len());
    assert_eq!(log.figure().borrow().y_label, "Resistance (Ohm)");
    assert!(outcome.path.exists());
}
