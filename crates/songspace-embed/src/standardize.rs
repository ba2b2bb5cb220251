//! Per-dimension standardization to zero mean and unit variance.
//!
//! Deviations are population deviations (divide by `n`). A column whose
//! variance is zero, or no larger than the rounding error of computing
//! it, is constant across the corpus: its scale is fixed at `1.0`, so the
//! transform only centers it and never divides by zero. The bound is
//! relative to the column's own magnitude, so a column with a tiny but
//! real spread is still scaled to unit deviation.

use serde::{Deserialize, Serialize};
use songspace_core::Corpus;

use crate::error::{EmbedError, EmbedResult, QueryError};

pub const STANDARDIZER_SCHEMA_VERSION: u32 = 1;

/// Whether a column's variance is indistinguishable from rounding error.
///
/// `var <= n·ε·var + (n·mean·ε)²`: the first term covers error in the
/// accumulated squares, the second the error in the mean itself. Both
/// scale with the column, so there is no absolute floor.
fn is_constant_column(var: f64, mean: f64, n: f64) -> bool {
    let eps = f64::EPSILON;
    let upper_bound = n * eps * var + (n * mean * eps).powi(2);
    var <= upper_bound
}

/// Fitted per-dimension statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizationParams {
    pub schema_version: u32,
    pub mean: Vec<f64>,
    /// Population standard deviation as measured on the corpus.
    pub std_dev: Vec<f64>,
    /// Divisor actually applied: `std_dev`, or `1.0` for constant columns.
    pub scale: Vec<f64>,
}

impl StandardizationParams {
    #[must_use]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Indices of columns that were constant across the corpus.
    pub fn constant_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.std_dev
            .iter()
            .zip(&self.scale)
            .enumerate()
            .filter(|(_, (std, scale))| **scale == 1.0 && **std != 1.0)
            .map(|(i, _)| i)
    }

    /// Standardize one raw vector with the stored statistics.
    ///
    /// # Errors
    /// Returns `QueryError::DimensionMismatch` if `raw` has the wrong length.
    pub fn transform(&self, raw: &[f64]) -> EmbedResult<Vec<f64>> {
        if raw.len() != self.dim() {
            return Err(QueryError::DimensionMismatch {
                expected: self.dim(),
                actual: raw.len(),
            }
            .into());
        }
        Ok(raw
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect())
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let d = self.mean.len();
        if d == 0 {
            return Err("standardizer has no dimensions".to_string());
        }
        if self.std_dev.len() != d || self.scale.len() != d {
            return Err(format!(
                "standardizer vectors disagree in length ({}, {}, {})",
                d,
                self.std_dev.len(),
                self.scale.len()
            ));
        }
        let all_finite = self
            .mean
            .iter()
            .chain(&self.std_dev)
            .chain(&self.scale)
            .all(|v| v.is_finite());
        if !all_finite || self.scale.iter().any(|s| *s <= 0.0) {
            return Err("standardizer contains non-finite or non-positive values".to_string());
        }
        Ok(())
    }
}

/// Fits [`StandardizationParams`] on a corpus.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standardizer;

impl Standardizer {
    /// Compute per-dimension mean and population deviation.
    ///
    /// # Errors
    /// Returns `EmbedError::NonFiniteColumn` if a column overflows.
    pub fn fit(corpus: &Corpus) -> EmbedResult<StandardizationParams> {
        let d = corpus.dim();
        #[allow(clippy::cast_precision_loss)]
        let n = corpus.len() as f64;

        let mut mean = vec![0.0; d];
        for v in corpus.vectors() {
            for (m, x) in mean.iter_mut().zip(v) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variance = vec![0.0; d];
        for v in corpus.vectors() {
            for ((acc, x), m) in variance.iter_mut().zip(v).zip(&mean) {
                let diff = x - m;
                *acc += diff * diff;
            }
        }

        let mut std_dev = Vec::with_capacity(d);
        let mut scale = Vec::with_capacity(d);
        for (column, (var, m)) in variance.iter().zip(&mean).enumerate() {
            let var = var / n;
            let std = var.sqrt();
            if !std.is_finite() || !m.is_finite() {
                return Err(EmbedError::NonFiniteColumn { column });
            }
            if is_constant_column(var, *m, n) {
                log::debug!("Feature column {column} is constant (mean {m}); centering only");
                scale.push(1.0);
            } else {
                scale.push(std);
            }
            std_dev.push(std);
        }

        Ok(StandardizationParams {
            schema_version: STANDARDIZER_SCHEMA_VERSION,
            mean,
            std_dev,
            scale,
        })
    }
}
