//! Applied Motion stepper drive (SCL protocol) driving the optical delay stage
//!
//! Protocol Overview:
//! - Format: ASCII command, optional numeric argument, terminated by `\r`
//! - Replies: `%` (executed), `*` (buffered), `?<code>` (rejected)
//! - Moves: `DI<steps>` sets the target, `FP` starts a feed-to-position move
//!
//! The stage is a two-pass delay line, so one centimetre of travel adds
//! 200/3 ps of optical delay. Positions handed to this driver are in ps.
//!
//! # Example Usage
//!
//! ```no_run
//! use pump_probe_daq::config::StageSettings;
//! use pump_probe_daq::hardware::applied_motion::AppliedMotionStage;
//! use pump_probe_daq::hardware::capabilities::{DelayStage, Movable};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stage = AppliedMotionStage::open(&StageSettings::default()).await?;
//!     stage.initialize().await?;
//!     stage.move_abs(12.5).await?;
//!     Ok(())
//! }
//! ```

use crate::adapters::{AdapterError, HardwareAdapter, SerialAdapter};
use crate::config::StageSettings;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{DelayStage, Movable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const CM_PER_INCH: f64 = 2.54;

/// Largest distance `DI` takes, in microsteps either way.
pub const MAX_STEPS: i64 = i32::MAX as i64;

/// Convert an optical delay in ps to a signed microstep target.
///
/// Rounds half to even so a position exactly between two steps lands the
/// same way every time.
///
/// # Errors
/// Non-finite delays and targets beyond [`MAX_STEPS`] are rejected.
pub fn delay_to_steps(delay_ps: f64, settings: &StageSettings) -> AppResult<i64> {
    let steps_per_cm = settings.steps_per_rev * settings.revs_per_inch / CM_PER_INCH;
    let sign = if settings.invert_direction { -1.0 } else { 1.0 };
    let steps = (sign * delay_ps * steps_per_cm / settings.ps_per_cm).round_ties_even();
    if !steps.is_finite() || steps.abs() > MAX_STEPS as f64 {
        return Err(DaqError::Instrument(format!(
            "delay {} ps is outside the stage travel",
            delay_ps
        )));
    }
    Ok(steps as i64)
}

/// Format a numeric SCL argument; whole numbers are sent without a decimal point.
fn scl_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Driver for an Applied Motion stepper drive behind the delay stage
pub struct AppliedMotionStage {
    /// Link to the drive, locked for the duration of one command/reply
    adapter: Mutex<Box<dyn HardwareAdapter + Send + Sync>>,
    /// Conversion and motion profile
    settings: StageSettings,
    /// Last commanded position in ps
    position: RwLock<f64>,
}

impl AppliedMotionStage {
    /// Wrap an already-connected adapter.
    pub fn new(adapter: Box<dyn HardwareAdapter + Send + Sync>, settings: StageSettings) -> Self {
        Self {
            adapter: Mutex::new(adapter),
            settings,
            position: RwLock::new(0.0),
        }
    }

    /// Open the configured serial port (9600 8N1, `\r` framing) and wrap it.
    ///
    /// # Errors
    /// Returns error if the serial port cannot be opened
    pub async fn open(settings: &StageSettings) -> Result<Self> {
        let timeout = settings.read_timeout_ms.max(settings.write_timeout_ms);
        let mut adapter = SerialAdapter::new(settings.port.clone(), settings.baud_rate)
            .with_framing("\r", '\r')
            .with_timeout(Duration::from_millis(timeout));
        adapter
            .connect()
            .await
            .with_context(|| format!("Failed to open delay stage on {}", settings.port))?;
        info!("Delay stage connected on {}", settings.port);
        Ok(Self::new(Box::new(adapter), settings.clone()))
    }

    /// Reopen the link after [`DelayStage::disconnect`].
    pub async fn reconnect(&self) -> Result<()> {
        let mut adapter = self.adapter.lock().await;
        if !adapter.is_connected() {
            adapter.connect().await?;
        }
        Ok(())
    }

    /// Send one SCL command and interpret the reply.
    ///
    /// Returns the reply text, or `None` when the drive stayed silent.
    async fn command(&self, command: &str) -> Result<Option<String>> {
        let mut adapter = self.adapter.lock().await;
        match adapter.query(command).await {
            Ok(reply) => {
                if let Some(code) = reply.strip_prefix('?') {
                    return Err(DaqError::Instrument(format!(
                        "stage rejected '{}' (code {})",
                        command, code
                    ))
                    .into());
                }
                debug!("stage {} -> {}", command, reply);
                Ok(Some(reply))
            }
            Err(err) if AdapterError::is_timeout(&err) => {
                warn!("No reply from stage to '{}'", command);
                Ok(None)
            }
            Err(err) => Err(err.context(format!("stage command '{}' failed", command))),
        }
    }
}

#[async_trait]
impl Movable for AppliedMotionStage {
    async fn move_abs(&self, position: f64) -> Result<()> {
        let steps = delay_to_steps(position, &self.settings)?;
        debug!("Moving stage to {} ps ({} steps)", position, steps);
        self.command(&format!("DI{}", steps)).await?;
        self.command("FP").await?;
        *self.position.write().await = position;
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }
}

#[async_trait]
impl DelayStage for AppliedMotionStage {
    async fn initialize(&self) -> Result<()> {
        // MR8 selects 20000 microsteps per revolution
        self.command("MR8").await?;
        self.command("SP0").await?;
        self.command("AR").await?;
        self.command(&format!("AC{}", scl_number(self.settings.acceleration)))
            .await?;
        self.command(&format!("DE{}", scl_number(self.settings.deceleration)))
            .await?;
        self.command(&format!("VE{}", scl_number(self.settings.velocity)))
            .await?;
        self.command("ME").await?;
        *self.position.write().await = 0.0;
        info!("Delay stage initialized");
        Ok(())
    }

    async fn set_velocity(&self, velocity: f64) -> Result<()> {
        self.command(&format!("VE{}", scl_number(velocity))).await?;
        Ok(())
    }

    async fn set_acceleration(&self, acceleration: f64) -> Result<()> {
        self.command(&format!("AC{}", scl_number(acceleration))).await?;
        Ok(())
    }

    async fn set_deceleration(&self, deceleration: f64) -> Result<()> {
        self.command(&format!("DE{}", scl_number(deceleration))).await?;
        Ok(())
    }

    async fn zero(&self) -> Result<()> {
        self.command("SP0").await?;
        *self.position.write().await = 0.0;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.adapter.lock().await.disconnect().await?;
        info!("Delay stage disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_adapter::Reply;
    use crate::adapters::MockAdapter;
    use tracing_test::traced_test;

    async fn stage_with_link() -> (AppliedMotionStage, MockAdapter) {
        let mut adapter = MockAdapter::new();
        adapter.connect().await.unwrap();
        let link = adapter.clone();
        (
            AppliedMotionStage::new(Box::new(adapter), StageSettings::default()),
            link,
        )
    }

    #[test]
    fn test_delay_to_steps() {
        let settings = StageSettings::default();
        // 1 ps -> 19685.04 steps/cm / 66.667 ps/cm = 295.28 steps, inverted
        assert_eq!(delay_to_steps(1.0, &settings).unwrap(), -295);
        assert_eq!(delay_to_steps(10.0, &settings).unwrap(), -2953);
        assert_eq!(delay_to_steps(0.0, &settings).unwrap(), 0);

        let forward = StageSettings {
            invert_direction: false,
            ..StageSettings::default()
        };
        assert_eq!(delay_to_steps(10.0, &forward).unwrap(), 2953);
        assert_eq!(delay_to_steps(-10.0, &forward).unwrap(), -2953);
    }

    #[test]
    fn test_delay_out_of_travel() {
        let settings = StageSettings::default();
        assert!(delay_to_steps(f64::NAN, &settings).is_err());
        assert!(delay_to_steps(f64::INFINITY, &settings).is_err());
        // About 7.3 million ps fits in 31 bits of microsteps, ten million does not
        assert!(delay_to_steps(7.0e6, &settings).is_ok());
        assert!(delay_to_steps(1.0e7, &settings).is_err());
        assert!(delay_to_steps(-1.0e7, &settings).is_err());
    }

    #[tokio::test]
    async fn test_out_of_travel_move_sends_nothing() {
        let (stage, link) = stage_with_link().await;
        stage.move_abs(3.0).await.unwrap();
        let err = stage.move_abs(1.0e12).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Instrument(_))
        ));
        assert_eq!(link.commands(), vec!["DI-886", "FP"]);
        assert_eq!(stage.position().await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_motion_profile_commands() {
        let (stage, link) = stage_with_link().await;
        stage.set_acceleration(12.0).await.unwrap();
        stage.set_deceleration(2.5).await.unwrap();
        stage.set_velocity(4.0).await.unwrap();
        assert_eq!(link.commands(), vec!["AC12", "DE2.5", "VE4"]);
    }

    #[test]
    fn test_scl_number() {
        assert_eq!(scl_number(3.0), "3");
        assert_eq!(scl_number(2.5), "2.5");
    }

    #[tokio::test]
    async fn test_initialize_sequence() {
        let (stage, link) = stage_with_link().await;
        stage.initialize().await.unwrap();
        assert_eq!(
            link.commands(),
            vec!["MR8", "SP0", "AR", "AC10", "DE15", "VE3", "ME"]
        );
    }

    #[tokio::test]
    async fn test_move_sends_distance_then_feed() {
        let (stage, link) = stage_with_link().await;
        stage.move_abs(10.0).await.unwrap();
        assert_eq!(link.commands(), vec!["DI-2953", "FP"]);
        assert_eq!(stage.position().await.unwrap(), 10.0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_silent_drive_is_tolerated() {
        let (stage, link) = stage_with_link().await;
        link.push_reply(Reply::Timeout);
        stage.set_velocity(1.5).await.unwrap();
        assert_eq!(link.commands(), vec!["VE1.5"]);
        assert!(logs_contain("No reply from stage to 'VE1.5'"));
    }

    #[tokio::test]
    async fn test_rejected_command_is_an_error() {
        let (stage, link) = stage_with_link().await;
        link.push_reply(Reply::Text("?4".to_string()));
        let err = stage.move_abs(1.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Instrument(_))
        ));
        assert_eq!(stage.position().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_zero_and_disconnect() {
        let (stage, link) = stage_with_link().await;
        stage.move_abs(2.0).await.unwrap();
        stage.zero().await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 0.0);
        stage.disconnect().await.unwrap();
        assert!(stage.move_abs(1.0).await.is_err());
        stage.reconnect().await.unwrap();
        stage.move_abs(1.0).await.unwrap();
        assert_eq!(link.commands().last().map(String::as_str), Some("FP"));
    }
}
