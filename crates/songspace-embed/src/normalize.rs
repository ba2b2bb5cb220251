use crate::error::{EmbedError, EmbedResult};

/// Euclidean length of `v`, scaled by the largest magnitude first so
/// very small or very large components neither underflow nor overflow.
#[must_use]
pub fn l2_norm(v: &[f64]) -> f64 {
    let max = v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    if max == 0.0 || !max.is_finite() {
        return max;
    }
    max * v.iter().map(|x| (x / max) * (x / max)).sum::<f64>().sqrt()
}

/// Rescale `v` to unit Euclidean length.
///
/// # Errors
/// Returns `EmbedError::ZeroNorm` when the norm is zero or not finite.
pub fn normalize(v: &[f64]) -> EmbedResult<Vec<f64>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbedError::ZeroNorm);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Norm deviation from `1.0` still treated as unit length.
pub const UNIT_TOLERANCE: f64 = 1e-12;

/// Return `v` unchanged if it is already unit length, else normalize it.
///
/// Re-normalizing a unit vector can move its last bits; leaving it alone
/// keeps a stored embedding and the same embedding presented as a query
/// bit-identical.
///
/// # Errors
/// Returns `EmbedError::ZeroNorm` when the norm is zero or not finite.
pub fn to_unit(v: Vec<f64>) -> EmbedResult<Vec<f64>> {
    let norm = l2_norm(&v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbedError::ZeroNorm);
    }
    if (norm - 1.0).abs() <= UNIT_TOLERANCE {
        return Ok(v);
    }
    Ok(v.into_iter().map(|x| x / norm).collect())
}
