//! Summary statistics over sample sets.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Mean and spread of one averaged reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: f64,
    /// Number of samples
    pub count: usize,
}

impl Statistics {
    /// Summarize `samples`; needs at least two of them.
    pub fn from_samples(samples: &[f64]) -> AppResult<Self> {
        Ok(Self {
            mean: mean(samples)?,
            std_dev: sample_std_dev(samples)?,
            count: samples.len(),
        })
    }
}

/// Arithmetic mean. An empty slice is an error.
pub fn mean(samples: &[f64]) -> AppResult<f64> {
    if samples.is_empty() {
        return Err(DaqError::Processing(
            "mean requires at least one sample".to_string(),
        ));
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Sample standard deviation. Fewer than two samples is an error.
pub fn sample_std_dev(samples: &[f64]) -> AppResult<f64> {
    if samples.len() < 2 {
        return Err(DaqError::Processing(
            "standard deviation requires at least two samples".to_string(),
        ));
    }
    let m = mean(samples)?;
    let sum_sq: f64 = samples.iter().map(|v| (v - m).powi(2)).sum();
    Ok((sum_sq / (samples.len() - 1) as f64).sqrt())
}
