//! Capability traits implemented by stage and DAQ drivers.
//!
//! The scan and thermistor loops only see these traits, so the serial drivers
//! and the simulated devices are interchangeable.

use anyhow::Result;
use async_trait::async_trait;

/// Something that moves to an absolute position.
///
/// Positions are in the caller's unit (ps of optical delay for the delay
/// stage). Drivers convert to device steps internally.
#[async_trait]
pub trait Movable: Send + Sync {
    /// Command a move to `position` and return once the command is accepted.
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Last commanded position.
    async fn position(&self) -> Result<f64>;
}

/// Motion tuning and housekeeping for the delay stage.
#[async_trait]
pub trait DelayStage: Movable {
    /// Configure microstepping, reset alarms, load motion profile, enable the motor.
    async fn initialize(&self) -> Result<()>;

    /// Set the move velocity (rev/s).
    async fn set_velocity(&self, velocity: f64) -> Result<()>;

    /// Set the acceleration (rev/s²).
    async fn set_acceleration(&self, acceleration: f64) -> Result<()>;

    /// Set the deceleration (rev/s²).
    async fn set_deceleration(&self, deceleration: f64) -> Result<()>;

    /// Declare the current position as zero.
    async fn zero(&self) -> Result<()>;

    /// Release the link to the stage.
    async fn disconnect(&self) -> Result<()>;
}

/// Analog voltage input.
#[async_trait]
pub trait AnalogInput: Send + Sync {
    /// One immediate voltage reading.
    async fn read_voltage(&self, channel: u8) -> Result<f64>;

    /// A timed burst of `count` samples at `rate_hz`.
    ///
    /// Implementations may return more samples than requested; callers keep
    /// the first `count`.
    async fn burst(&self, channel: u8, rate_hz: u32, count: usize) -> Result<Vec<f64>>;
}
