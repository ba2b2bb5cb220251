//! Variance-maximizing linear projection (PCA).
//!
//! The basis is the eigendecomposition of the sample covariance matrix,
//! computed with cyclic Jacobi rotations. The solver has no random state,
//! so the same input always yields the same basis. Each component is
//! sign-normalized so its largest-magnitude coefficient is positive.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{EmbedError, EmbedResult, QueryError};

pub const REDUCER_SCHEMA_VERSION: u32 = 1;

const MAX_SWEEPS: usize = 100;
const CONVERGENCE: f64 = 1e-15;

/// A fitted projection onto the top `k` principal directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionBasis {
    pub schema_version: u32,
    /// Component count asked for before clamping.
    pub requested_components: usize,
    /// `k` unit-length rows of length `d`, by descending explained variance.
    pub components: Vec<Vec<f64>>,
    /// Centering vector subtracted before projecting.
    pub mean: Vec<f64>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl ReductionBasis {
    /// Input dimension `d`.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    /// Output dimension `k`.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Share of total variance kept by the basis.
    #[must_use]
    pub fn retained_variance_ratio(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }

    /// Project one standardized vector onto the basis.
    ///
    /// # Errors
    /// Returns `QueryError::DimensionMismatch` if `x` is not length `d`.
    pub fn transform(&self, x: &[f64]) -> EmbedResult<Vec<f64>> {
        if x.len() != self.input_dim() {
            return Err(QueryError::DimensionMismatch {
                expected: self.input_dim(),
                actual: x.len(),
            }
            .into());
        }
        Ok(self
            .components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .zip(x.iter().zip(&self.mean))
                    .map(|(c, (xi, mi))| c * (xi - mi))
                    .sum()
            })
            .collect())
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let d = self.input_dim();
        let k = self.n_components();
        if d == 0 || k == 0 || k > d {
            return Err(format!("reducer shape {k}x{d} is invalid"));
        }
        if self.components.iter().any(|c| c.len() != d) {
            return Err("reducer component length disagrees with input dimension".to_string());
        }
        if self.explained_variance.len() != k || self.explained_variance_ratio.len() != k {
            return Err("reducer variance vectors disagree with component count".to_string());
        }
        let all_finite = self
            .components
            .iter()
            .flatten()
            .chain(&self.mean)
            .chain(&self.explained_variance)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("reducer contains non-finite values".to_string());
        }
        Ok(())
    }
}

/// Fits a [`ReductionBasis`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reducer;

impl Reducer {
    /// Clamp a requested component count to `[1, dim]`.
    #[must_use]
    pub fn clamp_components(requested: usize, dim: usize) -> usize {
        requested.clamp(1, dim.max(1))
    }

    /// Fit the top `min(requested, d)` principal directions of `rows`.
    ///
    /// # Errors
    /// Returns a corpus error if `rows` is empty or ragged.
    pub fn fit(rows: &[Vec<f64>], requested: usize) -> EmbedResult<ReductionBasis> {
        let Some(first) = rows.first() else {
            return Err(EmbedError::Configuration(
                "cannot fit a reduction on zero vectors".to_string(),
            ));
        };
        let d = first.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != d) {
            return Err(songspace_core::CorpusError::DimensionMismatch {
                expected: d,
                actual: bad.len(),
            }
            .into());
        }
        let k = Self::clamp_components(requested, d);
        if k != requested {
            log::info!("PCA components clamped from {requested} to {k} (input dimension {d})");
        }

        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;
        let mut mean = vec![0.0; d];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let divisor = if rows.len() > 1 { n - 1.0 } else { 1.0 };
        let mut covariance = vec![vec![0.0; d]; d];
        for row in rows {
            let centered: Vec<f64> = row.iter().zip(&mean).map(|(x, m)| x - m).collect();
            for i in 0..d {
                for j in i..d {
                    covariance[i][j] += centered[i] * centered[j];
                }
            }
        }
        for i in 0..d {
            for j in i..d {
                covariance[i][j] /= divisor;
                covariance[j][i] = covariance[i][j];
            }
        }

        let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| match eigenvalues[b].total_cmp(&eigenvalues[a]) {
            Ordering::Equal => a.cmp(&b),
            other => other,
        });

        let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let mut components = Vec::with_capacity(k);
        let mut explained_variance = Vec::with_capacity(k);
        let mut explained_variance_ratio = Vec::with_capacity(k);
        for &idx in order.iter().take(k) {
            let mut component: Vec<f64> = eigenvectors.iter().map(|row| row[idx]).collect();
            flip_sign(&mut component);
            let variance = eigenvalues[idx].max(0.0);
            components.push(component);
            explained_variance.push(variance);
            explained_variance_ratio.push(if total > 0.0 { variance / total } else { 0.0 });
        }

        log::debug!(
            "PCA fitted: {d} -> {k} dims, retained variance ratio {:.4}",
            explained_variance_ratio.iter().sum::<f64>()
        );

        Ok(ReductionBasis {
            schema_version: REDUCER_SCHEMA_VERSION,
            requested_components: requested,
            components,
            mean,
            explained_variance,
            explained_variance_ratio,
        })
    }
}

/// Make the largest-magnitude coefficient positive (first one on ties).
fn flip_sign(component: &mut [f64]) {
    let mut pivot = 0.0_f64;
    for &c in component.iter() {
        if c.abs() > pivot.abs() {
            pivot = c;
        }
    }
    if pivot < 0.0 {
        for c in component.iter_mut() {
            *c = -*c;
        }
    }
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose column `i` is the unit
/// eigenvector for eigenvalue `i`.
fn symmetric_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let d = a.len();
    let mut v: Vec<Vec<f64>> = (0..d)
        .map(|i| (0..d).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    let frobenius: f64 = a.iter().flatten().map(|x| x * x).sum::<f64>().sqrt();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..d {
            for q in (p + 1)..d {
                off += a[p][q] * a[p][q];
            }
        }
        if off.sqrt() <= CONVERGENCE * frobenius || off == 0.0 {
            break;
        }

        for p in 0..d {
            for q in (p + 1)..d {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = if theta.abs() > 1e150 {
                    0.5 / theta
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let akp = row[p];
                    let akq = row[q];
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..d {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..d).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}
