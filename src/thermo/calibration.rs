//! Thermistor calibration curve
//!
//! The calibration file is a CSV with one header line and two columns,
//! resistance (Ω) then temperature:
//!
//! ```text
//! resistance,temperature
//! 1200.0,350.0
//! 5100.0,300.0
//! 9800.0,280.0
//! ```
//!
//! Rows may be ordered by ascending or descending resistance but must be
//! strictly monotonic in it.

use crate::error::{AppResult, DaqError};
use std::path::Path;
use tracing::info;

/// Resistance → temperature lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Strictly increasing
    resistance: Vec<f64>,
    temperature: Vec<f64>,
}

impl Calibration {
    /// Build from `(resistance, temperature)` points.
    pub fn from_points(points: Vec<(f64, f64)>) -> AppResult<Self> {
        if points.len() < 2 {
            return Err(DaqError::Calibration(format!(
                "need at least two calibration points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(r, t)| !(r.is_finite() && t.is_finite())) {
            return Err(DaqError::Calibration(
                "calibration contains non-finite values".to_string(),
            ));
        }

        let mut points = points;
        if points[0].0 > points[points.len() - 1].0 {
            points.reverse();
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(DaqError::Calibration(
                "calibration resistance must be strictly monotonic".to_string(),
            ));
        }

        let (resistance, temperature) = points.into_iter().unzip();
        Ok(Self {
            resistance,
            temperature,
        })
    }

    /// Load the two-column CSV at `path`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| DaqError::Calibration(format!("cannot open {:?}: {}", path, e)))?;

        let mut points = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| DaqError::Calibration(format!("{:?}: {}", path, e)))?;
            let field = |i: usize| -> AppResult<f64> {
                record
                    .get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| {
                        DaqError::Calibration(format!(
                            "{:?} row {}: column {} is not a number",
                            path,
                            line + 2,
                            i + 1
                        ))
                    })
            };
            points.push((field(0)?, field(1)?));
        }

        let calibration = Self::from_points(points)?;
        info!(
            "Loaded {} calibration points from '{}'",
            calibration.len(),
            path.display()
        );
        Ok(calibration)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.resistance.len()
    }

    /// A loaded calibration always has at least two points.
    pub fn is_empty(&self) -> bool {
        self.resistance.is_empty()
    }

    /// Resistance span covered by the table.
    pub fn range(&self) -> (f64, f64) {
        (self.resistance[0], self.resistance[self.len() - 1])
    }

    /// Linearly interpolated temperature; clamps to the end points outside the table.
    pub fn temperature(&self, resistance: f64) -> f64 {
        let r = &self.resistance;
        let t = &self.temperature;
        let last = r.len() - 1;
        if resistance.is_nan() {
            return f64::NAN;
        }
        if resistance <= r[0] {
            return t[0];
        }
        if resistance >= r[last] {
            return t[last];
        }
        // First index with r[i] > resistance; 1..=last here
        let hi = r.partition_point(|&x| x <= resistance);
        let lo = hi - 1;
        let frac = (resistance - r[lo]) / (r[hi] - r[lo]);
        t[lo] + frac * (t[hi] - t[lo])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table() -> Calibration {
        Calibration::from_points(vec![(1000.0, 350.0), (2000.0, 330.0), (4000.0, 290.0)])
            .unwrap()
    }

    #[test]
    fn test_interpolates_between_points() {
        let cal = table();
        assert_eq!(cal.temperature(1000.0), 350.0);
        assert_eq!(cal.temperature(1500.0), 340.0);
        assert_eq!(cal.temperature(2000.0), 330.0);
        assert_eq!(cal.temperature(3000.0), 310.0);
    }

    #[test]
    fn test_clamps_outside_table() {
        let cal = table();
        assert_eq!(cal.temperature(10.0), 350.0);
        assert_eq!(cal.temperature(1e6), 290.0);
        assert!(cal.temperature(f64::NAN).is_nan());
    }

    #[test]
    fn test_descending_table_is_reversed() {
        let cal =
            Calibration::from_points(vec![(4000.0, 290.0), (2000.0, 330.0), (1000.0, 350.0)])
                .unwrap();
        assert_eq!(cal, table());
        assert_eq!(cal.range(), (1000.0, 4000.0));
    }

    #[test]
    fn test_rejects_unusable_tables() {
        assert!(Calibration::from_points(vec![(1.0, 2.0)]).is_err());
        assert!(Calibration::from_points(vec![(1.0, 2.0), (1.0, 3.0)]).is_err());
        assert!(Calibration::from_points(vec![(1.0, 2.0), (3.0, 3.0), (2.0, 1.0)]).is_err());
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Resistance (Ohm), Temperature (K)").unwrap();
        writeln!(file, "1000, 350").unwrap();
        writeln!(file, "2000, 330").unwrap();
        writeln!(file, "4000, 290").unwrap();
        let cal = Calibration::load(file.path()).unwrap();
        assert_eq!(cal, table());
    }

    #[test]
    fn test_load_reports_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "r,t").unwrap();
        writeln!(file, "1000,350").unwrap();
        writeln!(file, "abc,330").unwrap();
        let err = Calibration::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 3"));
    }
}
