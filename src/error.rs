//! Custom error types for the application.
//!
//! `DaqError` is the one error enum shared by every layer of the rig software.
//! Hardware drivers and the scan runner return `anyhow::Result` and use these
//! variants as the root cause when a failure is specific to this domain, so
//! callers can still `downcast_ref::<DaqError>()` to react to them.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: figment failed to merge or deserialize the configuration sources.
//! - **`Configuration`**: values parsed fine but are not usable (e.g. a DAQ rate the
//!   card cannot sample at). Caught by `Settings::validate` before hardware is touched.
//! - **`Io`**: file output and calibration loading.
//! - **`Instrument`**: the stage or DAQ rejected a command or sent an unparseable reply.
//! - **`SerialTimeout`**: the voltmeter went silent mid-reply. The stage tolerates
//!   silence instead, so this only comes from the acquisition side.
//! - **`SerialFeatureDisabled`**: a serial driver was configured in a build without
//!   the `instrument_serial` feature.
//! - **`Processing`**: statistics over sample sets (e.g. a standard deviation of one point).
//! - **`Calibration`**: the resistance/temperature table is unusable.
//! - **`ScanAborted`**: a running scan or log was stopped on request.
//! - **`FeatureNotEnabled`**: a command needs a cargo feature this build lacks (`gui`).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Serial read timed out after {0} ms")]
    SerialTimeout(u64),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Data processing error: {0}")]
    Processing(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Scan aborted after {completed} of {total} points")]
    ScanAborted { completed: usize, total: usize },

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
