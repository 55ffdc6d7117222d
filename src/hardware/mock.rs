//! Mock Hardware Implementations
//!
//! Provides simulated hardware devices for testing without physical hardware.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockStage` - Simulated delay stage with finite travel speed
//! - `MockDaq` - Simulated analog input producing a pump-probe transient or a
//!   constant divider voltage, with optional white noise

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::hardware::capabilities::{AnalogInput, DelayStage, Movable};

// =============================================================================
// MockStage - Simulated Delay Stage
// =============================================================================

/// Mock delay stage
///
/// Moves take `distance / speed` seconds of tokio time. The position is kept
/// behind an `Arc` so a [`MockDaq`] can follow it.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::instant();
/// stage.move_abs(10.0).await?;
/// assert_eq!(stage.position().await?, 10.0);
/// ```
pub struct MockStage {
    position: Arc<RwLock<f64>>,
    speed_ps_per_sec: f64,
    profile: RwLock<MotionProfile>,
    moves: AtomicUsize,
}

/// Motion settings last sent to a [`MockStage`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    /// rev/s
    pub velocity: f64,
    /// rev/s²
    pub acceleration: f64,
    /// rev/s²
    pub deceleration: f64,
}

impl MockStage {
    /// Mock stage at 0 ps travelling 100 ps/s
    pub fn new() -> Self {
        Self::with_speed(100.0)
    }

    /// Mock stage whose moves complete immediately
    pub fn instant() -> Self {
        Self::with_speed(f64::INFINITY)
    }

    /// Mock stage with custom speed
    ///
    /// # Arguments
    /// * `speed_ps_per_sec` - Delay change per second of motion
    pub fn with_speed(speed_ps_per_sec: f64) -> Self {
        Self {
            position: Arc::new(RwLock::new(0.0)),
            speed_ps_per_sec,
            profile: RwLock::new(MotionProfile {
                velocity: 3.0,
                acceleration: 10.0,
                deceleration: 15.0,
            }),
            moves: AtomicUsize::new(0),
        }
    }

    /// Shared handle to the current position.
    pub fn position_handle(&self) -> Arc<RwLock<f64>> {
        self.position.clone()
    }

    /// Number of moves commanded so far.
    pub fn move_count(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    /// Velocity, acceleration and deceleration as last set.
    pub async fn profile(&self) -> MotionProfile {
        *self.profile.read().await
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        let current = *self.position.read().await;
        let travel_secs = (target - current).abs() / self.speed_ps_per_sec;
        debug!("MockStage: {:.3} ps -> {:.3} ps", current, target);

        if travel_secs.is_finite() && travel_secs > 0.0 {
            sleep(Duration::from_secs_f64(travel_secs)).await;
        }

        *self.position.write().await = target;
        self.moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }
}

#[async_trait]
impl DelayStage for MockStage {
    async fn initialize(&self) -> Result<()> {
        *self.position.write().await = 0.0;
        Ok(())
    }

    async fn set_velocity(&self, velocity: f64) -> Result<()> {
        self.profile.write().await.velocity = velocity;
        Ok(())
    }

    async fn set_acceleration(&self, acceleration: f64) -> Result<()> {
        self.profile.write().await.acceleration = acceleration;
        Ok(())
    }

    async fn set_deceleration(&self, deceleration: f64) -> Result<()> {
        self.profile.write().await.deceleration = deceleration;
        Ok(())
    }

    async fn zero(&self) -> Result<()> {
        *self.position.write().await = 0.0;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// MockDaq - Simulated Analog Input
// =============================================================================

/// Noise-free signal a [`MockDaq`] produces.
#[derive(Clone)]
pub enum Signal {
    /// Fixed voltage
    Constant(f64),
    /// Exponentially decaying response after zero delay, following a stage
    PumpProbe {
        /// Stage whose position is the pump-probe delay in ps
        delay: Arc<RwLock<f64>>,
        /// Baseline voltage
        offset: f64,
        /// Step height at zero delay
        amplitude: f64,
        /// Decay constant in ps
        tau_ps: f64,
    },
}

impl Signal {
    async fn value(&self) -> f64 {
        match self {
            Signal::Constant(v) => *v,
            Signal::PumpProbe {
                delay,
                offset,
                amplitude,
                tau_ps,
            } => {
                let t = *delay.read().await;
                if t < 0.0 {
                    *offset
                } else {
                    offset + amplitude * (-t / tau_ps).exp()
                }
            }
        }
    }
}

/// Simulated acquisition card
pub struct MockDaq {
    signal: Signal,
    noise_volts: f64,
    simulate_timing: bool,
    bursts: AtomicUsize,
}

impl MockDaq {
    /// Card that always reads `volts`, without noise or burst timing
    pub fn constant(volts: f64) -> Self {
        Self {
            signal: Signal::Constant(volts),
            noise_volts: 0.0,
            simulate_timing: false,
            bursts: AtomicUsize::new(0),
        }
    }

    /// Card wired to a photodiode behind the delay stage
    pub fn pump_probe(stage: &MockStage) -> Self {
        Self {
            signal: Signal::PumpProbe {
                delay: stage.position_handle(),
                offset: 0.05,
                amplitude: 0.8,
                tau_ps: 4.0,
            },
            noise_volts: 0.0,
            simulate_timing: false,
            bursts: AtomicUsize::new(0),
        }
    }

    /// Add zero-mean noise with the given standard deviation.
    pub fn with_noise(mut self, noise_volts: f64) -> Self {
        self.noise_volts = noise_volts;
        self
    }

    /// Make bursts take `count / rate` seconds like the real card.
    pub fn with_realistic_timing(mut self) -> Self {
        self.simulate_timing = true;
        self
    }

    /// Number of bursts taken so far.
    pub fn burst_count(&self) -> usize {
        self.bursts.load(Ordering::SeqCst)
    }

    fn noisy(&self, clean: f64, count: usize) -> Vec<f64> {
        if self.noise_volts == 0.0 {
            return vec![clean; count];
        }
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                // Irwin-Hall approximation of a unit normal
                let unit: f64 = (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0;
                clean + unit * self.noise_volts
            })
            .collect()
    }
}

#[async_trait]
impl AnalogInput for MockDaq {
    async fn read_voltage(&self, _channel: u8) -> Result<f64> {
        let clean = self.signal.value().await;
        Ok(self.noisy(clean, 1)[0])
    }

    async fn burst(&self, _channel: u8, rate_hz: u32, count: usize) -> Result<Vec<f64>> {
        if self.simulate_timing && rate_hz > 0 {
            sleep(Duration::from_secs_f64(count as f64 / rate_hz as f64)).await;
        }
        self.bursts.fetch_add(1, Ordering::SeqCst);
        let clean = self.signal.value().await;
        Ok(self.noisy(clean, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_tracks_position() {
        let stage = MockStage::instant();
        stage.move_abs(12.5).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 12.5);
        stage.zero().await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 0.0);
        assert_eq!(stage.move_count(), 1);
    }

    #[tokio::test]
    async fn test_stage_records_motion_profile() {
        let stage = MockStage::instant();
        stage.set_velocity(1.5).await.unwrap();
        stage.set_acceleration(12.0).await.unwrap();
        stage.set_deceleration(2.5).await.unwrap();
        assert_eq!(
            stage.profile().await,
            MotionProfile {
                velocity: 1.5,
                acceleration: 12.0,
                deceleration: 2.5,
            }
        );
    }

    #[tokio::test]
    async fn test_pump_probe_follows_stage() {
        let stage = MockStage::instant();
        let daq = MockDaq::pump_probe(&stage);

        stage.move_abs(-1.0).await.unwrap();
        let before = daq.read_voltage(1).await.unwrap();
        assert!((before - 0.05).abs() < 1e-12);

        stage.move_abs(0.0).await.unwrap();
        let peak = daq.read_voltage(1).await.unwrap();
        assert!((peak - 0.85).abs() < 1e-12);

        stage.move_abs(4.0).await.unwrap();
        let decayed = daq.read_voltage(1).await.unwrap();
        assert!((decayed - (0.05 + 0.8 * (-1.0f64).exp())).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_burst_length_and_noise() {
        let daq = MockDaq::constant(1.0).with_noise(0.01);
        let samples = daq.burst(1, 400, 500).await.unwrap();
        assert_eq!(samples.len(), 500);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - 1.0).abs() < 0.01);
        assert!(samples.iter().any(|&v| v != 1.0));
        assert_eq!(daq.burst_count(), 1);
    }
}
