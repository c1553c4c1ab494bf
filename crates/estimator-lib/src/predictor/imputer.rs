//! Mean imputation of missing feature values
//!
//! Each column's arithmetic mean over non-missing values replaces gaps.
//! Means keep the least-squares fit unbiased for ordinal and boolean
//! columns; do not swap in mode/median without revisiting the regression.

use crate::error::{EstimatorError, Result};
use crate::models::FeatureRow;
use crate::schema::{FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

/// Per-column statistics learned at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationStats {
    pub means: [f64; FEATURE_COUNT],
}

impl ImputationStats {
    /// Learn column means from rows that may contain gaps
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        let mut sums = [0.0f64; FEATURE_COUNT];
        let mut counts = [0usize; FEATURE_COUNT];

        for row in rows {
            for (col, value) in row.iter().enumerate() {
                if let Some(v) = value.filter(|v| v.is_finite()) {
                    sums[col] += v;
                    counts[col] += 1;
                }
            }
        }

        let mut means = [0.0f64; FEATURE_COUNT];
        for col in 0..FEATURE_COUNT {
            if counts[col] == 0 {
                return Err(EstimatorError::DegenerateColumn {
                    column: FEATURE_NAMES[col],
                });
            }
            means[col] = sums[col] / counts[col] as f64;
        }

        Ok(Self { means })
    }

    /// Fill gaps in a single row
    pub fn apply(&self, row: &FeatureRow) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0f64; FEATURE_COUNT];
        for (col, value) in row.iter().enumerate() {
            out[col] = match value {
                Some(v) if v.is_finite() => *v,
                _ => self.means[col],
            };
        }
        out
    }

    /// Fill gaps in every row
    pub fn apply_all(&self, rows: &[FeatureRow]) -> Vec<[f64; FEATURE_COUNT]> {
        rows.iter().map(|row| self.apply(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: Option<f64>) -> FeatureRow {
        let mut r = [Some(1.0); FEATURE_COUNT];
        r[0] = first;
        r
    }

    #[test]
    fn test_mean_of_known_values() {
        let rows = vec![row(Some(10.0)), row(Some(20.0)), row(None), row(Some(30.0))];
        let stats = ImputationStats::fit(&rows).unwrap();
        assert_eq!(stats.means[0], 20.0);

        let filled = stats.apply(&rows[2]);
        assert_eq!(filled[0], 20.0);
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let rows = vec![row(Some(10.0)), row(Some(f64::NAN)), row(Some(30.0))];
        let stats = ImputationStats::fit(&rows).unwrap();
        assert_eq!(stats.means[0], 20.0);
        assert_eq!(stats.apply(&rows[1])[0], 20.0);
    }

    #[test]
    fn test_complete_row_unchanged() {
        let rows = vec![row(Some(10.0)), row(None), row(Some(50.0))];
        let stats = ImputationStats::fit(&rows).unwrap();
        let complete: FeatureRow = [
            Some(75.0),
            Some(3.0),
            Some(1.0),
            Some(1.0),
            Some(0.0),
            Some(0.0),
            Some(0.0),
            Some(1.0),
            Some(4.0),
        ];
        assert_eq!(
            stats.apply(&complete),
            [75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0]
        );
    }

    #[test]
    fn test_degenerate_column() {
        let mut r = [Some(1.0); FEATURE_COUNT];
        r[8] = None;
        let err = ImputationStats::fit(&[r, r]).unwrap_err();
        match err {
            EstimatorError::DegenerateColumn { column } => assert_eq!(column, "energy_class"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_is_degenerate() {
        assert!(matches!(
            ImputationStats::fit(&[]),
            Err(EstimatorError::DegenerateColumn { .. })
        ));
    }
}
