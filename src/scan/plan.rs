//! Delay positions visited by a scan.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Upper bound on positions in one scan.
pub const MAX_POINTS: usize = 1_000_000;

/// Evenly spaced positions from `start` towards `end`.
///
/// The point count is `round((end - start) / step) + 1`, rounding half to
/// even, so `end` is included when the span is a whole number of steps and
/// the last position may overshoot or undershoot `end` by up to half a step
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanBounds")]
pub struct ScanPlan {
    start: f64,
    end: f64,
    step: f64,
}

#[derive(Deserialize)]
struct PlanBounds {
    start: f64,
    end: f64,
    step: f64,
}

impl TryFrom<PlanBounds> for ScanPlan {
    type Error = DaqError;

    fn try_from(bounds: PlanBounds) -> AppResult<Self> {
        Self::new(bounds.start, bounds.end, bounds.step)
    }
}

impl ScanPlan {
    /// Validate and build a plan.
    pub fn new(start: f64, end: f64, step: f64) -> AppResult<Self> {
        if !(start.is_finite() && end.is_finite() && step.is_finite()) {
            return Err(DaqError::Configuration(
                "scan start, end and step must be finite".to_string(),
            ));
        }
        if step == 0.0 {
            return Err(DaqError::Configuration(
                "scan step must be non-zero".to_string(),
            ));
        }
        let steps = ((end - start) / step).round_ties_even();
        if steps < 0.0 {
            return Err(DaqError::Configuration(format!(
                "step {} moves away from end {} when starting at {}",
                step, end, start
            )));
        }
        if steps >= MAX_POINTS as f64 {
            return Err(DaqError::Configuration(format!(
                "scan would visit more than {} positions",
                MAX_POINTS
            )));
        }
        Ok(Self { start, end, step })
    }

    /// First position (ps).
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Nominal last position (ps).
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Distance between positions (ps); negative when scanning downwards.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        ((self.end - self.start) / self.step).round_ties_even() as usize + 1
    }

    /// A valid plan always has at least the start position.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Positions in visiting order.
    pub fn positions(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + self.step * i as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_range() {
        let plan = ScanPlan::new(-1.0, 2.0, 0.5).unwrap();
        assert_eq!(plan.len(), 7);
        assert_eq!(plan.positions(), vec![-1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_single_point() {
        let plan = ScanPlan::new(3.0, 3.0, 1.0).unwrap();
        assert_eq!(plan.positions(), vec![3.0]);
    }

    #[test]
    fn test_downward_scan() {
        let plan = ScanPlan::new(10.0, 0.0, -2.5).unwrap();
        assert_eq!(plan.positions(), vec![10.0, 7.5, 5.0, 2.5, 0.0]);
    }

    #[test]
    fn test_uneven_span_rounds_half_to_even() {
        // 2.5 steps rounds to 2 -> 3 points
        assert_eq!(ScanPlan::new(0.0, 2.5, 1.0).unwrap().len(), 3);
        // 3.5 steps rounds to 4 -> 5 points, last one past the end
        let plan = ScanPlan::new(0.0, 3.5, 1.0).unwrap();
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.positions().last().copied(), Some(4.0));
    }

    #[test]
    fn test_rejects_bad_plans() {
        assert!(ScanPlan::new(0.0, 1.0, 0.0).is_err());
        assert!(ScanPlan::new(0.0, 10.0, -1.0).is_err());
        assert!(ScanPlan::new(0.0, f64::NAN, 1.0).is_err());
        assert!(ScanPlan::new(0.0, 1e9, 1e-3).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let plan: ScanPlan =
            serde_json::from_str(r#"{"start": 0.0, "end": 2.0, "step": 0.5}"#).unwrap();
        assert_eq!(plan.len(), 5);
        assert_eq!((plan.start(), plan.end(), plan.step()), (0.0, 2.0, 0.5));

        let zero_step =
            serde_json::from_str::<ScanPlan>(r#"{"start": 0.0, "end": 2.0, "step": 0.0}"#);
        assert!(zero_step.unwrap_err().to_string().contains("non-zero"));
        let backwards =
            serde_json::from_str::<ScanPlan>(r#"{"start": 0.0, "end": 2.0, "step": -1.0}"#);
        assert!(backwards.is_err());
    }

    #[test]
    fn test_serialized_plan_reads_back() {
        let plan = ScanPlan::new(10.0, 0.0, -2.5).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        assert_eq!(serde_json::from_str::<ScanPlan>(&json).unwrap(), plan);
    }
}
