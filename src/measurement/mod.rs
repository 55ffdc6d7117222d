//! Averaged voltage acquisition.
//!
//! A reading is `averages` consecutive DAQ bursts. Each burst is cut to the
//! requested sample count and the pieces are concatenated before the
//! statistics are taken, so the mean weights every sample equally.

pub mod statistics;

pub use statistics::{mean, sample_std_dev, Statistics};

use crate::config::DaqSettings;
use crate::error::DaqError;
use crate::hardware::capabilities::AnalogInput;
use anyhow::Result;
use tracing::trace;

/// Burst parameters for one averaged reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstSpec {
    /// Analog input channel
    pub channel: u8,
    /// Sample rate in Hz
    pub rate_hz: u32,
    /// Samples kept from each burst
    pub samples: usize,
    /// Bursts per reading
    pub averages: usize,
}

impl From<&DaqSettings> for BurstSpec {
    fn from(settings: &DaqSettings) -> Self {
        Self {
            channel: settings.channel,
            rate_hz: settings.frequency_hz,
            samples: settings.samples,
            averages: settings.averages,
        }
    }
}

/// Take `spec.averages` bursts and return all kept samples in order.
pub async fn acquire_averaged(daq: &dyn AnalogInput, spec: BurstSpec) -> Result<Vec<f64>> {
    let mut voltages = Vec::with_capacity(spec.samples * spec.averages);
    for n in 0..spec.averages {
        let burst = daq.burst(spec.channel, spec.rate_hz, spec.samples).await?;
        if burst.len() < spec.samples {
            return Err(DaqError::Instrument(format!(
                "burst {} returned {} of {} samples",
                n + 1,
                burst.len(),
                spec.samples
            ))
            .into());
        }
        voltages.extend_from_slice(&burst[..spec.samples]);
        trace!("burst {}/{} done", n + 1, spec.averages);
    }
    Ok(voltages)
}

/// Take an averaged reading and summarize it.
pub async fn measure(daq: &dyn AnalogInput, spec: BurstSpec) -> Result<Statistics> {
    let voltages = acquire_averaged(daq, spec).await?;
    Ok(Statistics::from_samples(&voltages)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockDaq;
    use async_trait::async_trait;

    /// Returns one extra sample per burst, counting up from zero.
    struct Ramp;

    #[async_trait]
    impl AnalogInput for Ramp {
        async fn read_voltage(&self, _channel: u8) -> Result<f64> {
            Ok(0.0)
        }

        async fn burst(&self, _channel: u8, _rate_hz: u32, count: usize) -> Result<Vec<f64>> {
            Ok((0..=count).map(|i| i as f64).collect())
        }
    }

    fn spec(samples: usize, averages: usize) -> BurstSpec {
        BurstSpec {
            channel: 1,
            rate_hz: 400,
            samples,
            averages,
        }
    }

    #[tokio::test]
    async fn test_bursts_are_truncated_and_concatenated() {
        let voltages = acquire_averaged(&Ramp, spec(3, 2)).await.unwrap();
        assert_eq!(voltages, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_measure_counts_every_burst() {
        let daq = MockDaq::constant(0.7);
        let stats = measure(&daq, spec(4, 3)).await.unwrap();
        assert_eq!(stats.count, 12);
        assert!((stats.mean - 0.7).abs() < 1e-12);
        assert_eq!(daq.burst_count(), 3);
    }
}
