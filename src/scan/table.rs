//! Result table of a delay scan.

use crate::measurement::Statistics;

/// Per-position means and standard deviations for every loop.
///
/// Cells that were never measured hold `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTable {
    positions: Vec<f64>,
    /// `[loop][position]`
    means: Vec<Vec<f64>>,
    /// `[loop][position]`
    std_devs: Vec<Vec<f64>>,
}

impl ScanTable {
    /// Empty table for `positions` and `loops` passes.
    pub fn new(positions: Vec<f64>, loops: usize) -> Self {
        let n = positions.len();
        Self {
            positions,
            means: vec![vec![f64::NAN; n]; loops],
            std_devs: vec![vec![f64::NAN; n]; loops],
        }
    }

    /// Store the reading at `position_index` of `loop_index`.
    pub fn record(&mut self, loop_index: usize, position_index: usize, stats: &Statistics) {
        if let Some(mean) = self
            .means
            .get_mut(loop_index)
            .and_then(|row| row.get_mut(position_index))
        {
            *mean = stats.mean;
        }
        if let Some(sd) = self
            .std_devs
            .get_mut(loop_index)
            .and_then(|row| row.get_mut(position_index))
        {
            *sd = stats.std_dev;
        }
    }

    /// Scan positions.
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Number of loops the table has room for.
    pub fn loops(&self) -> usize {
        self.means.len()
    }

    /// Mean at a cell, `None` when out of range.
    pub fn mean(&self, loop_index: usize, position_index: usize) -> Option<f64> {
        self.means.get(loop_index)?.get(position_index).copied()
    }

    /// Standard deviation at a cell, `None` when out of range.
    pub fn std_dev(&self, loop_index: usize, position_index: usize) -> Option<f64> {
        self.std_devs.get(loop_index)?.get(position_index).copied()
    }

    /// Number of measured cells.
    pub fn measured(&self) -> usize {
        self.means
            .iter()
            .flat_map(|row| row.iter())
            .filter(|v| !v.is_nan())
            .count()
    }

    /// Rows `position, mean_1, sd_1, mean_2, sd_2, ...` for the data file.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let mut row = Vec::with_capacity(1 + 2 * self.loops());
                row.push(position);
                for (means, sds) in self.means.iter().zip(&self.std_devs) {
                    row.push(means[i]);
                    row.push(sds[i]);
                }
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(mean: f64, std_dev: f64) -> Statistics {
        Statistics {
            mean,
            std_dev,
            count: 2,
        }
    }

    #[test]
    fn test_rows_interleave_loops() {
        let mut table = ScanTable::new(vec![0.0, 1.0], 2);
        table.record(0, 0, &stats(0.1, 0.01));
        table.record(0, 1, &stats(0.2, 0.02));
        table.record(1, 0, &stats(0.3, 0.03));

        let rows = table.to_rows();
        assert_eq!(rows[0], vec![0.0, 0.1, 0.01, 0.3, 0.03]);
        assert_eq!(rows[1][..3], [1.0, 0.2, 0.02]);
        assert!(rows[1][3].is_nan() && rows[1][4].is_nan());
        assert_eq!(table.measured(), 3);
    }

    #[test]
    fn test_out_of_range_record_is_ignored() {
        let mut table = ScanTable::new(vec![0.0], 1);
        table.record(3, 0, &stats(1.0, 0.0));
        table.record(0, 5, &stats(1.0, 0.0));
        assert_eq!(table.measured(), 0);
        assert_eq!(table.mean(3, 0), None);
    }
}
