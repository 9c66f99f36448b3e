//! Column-wise standardization: `(x - mean) / max(std, STD_FLOOR)`.
//!
//! Fit once on training rows; the same mean/std are reused verbatim for
//! every later transform.

use crate::error::{PredictorError, Result};

/// Lower bound on a column's standard deviation. Constant columns are
/// centred but not blown up.
pub const STD_FLOOR: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Population mean and standard deviation per column.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| PredictorError::insufficient("cannot fit scaler on zero rows"))?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                return Err(PredictorError::SchemaMismatch {
                    expected: width,
                    actual: row.len(),
                });
            }
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }
        let std = var
            .into_iter()
            .map(|v| (v / n).sqrt().max(STD_FLOOR))
            .collect();

        Ok(StandardScaler { mean, std })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.width() {
            return Err(PredictorError::SchemaMismatch {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
