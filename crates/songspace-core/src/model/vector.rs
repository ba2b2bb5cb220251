use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

/// A raw, fixed-length numeric feature vector for one track.
///
/// Every value is finite and the vector has at least one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Validate and wrap raw values.
    ///
    /// # Errors
    /// Returns `CorpusError::EmptyVector` or `CorpusError::NonFinite`.
    pub fn new(values: Vec<f64>) -> Result<Self, CorpusError> {
        if values.is_empty() {
            return Err(CorpusError::EmptyVector);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(CorpusError::NonFinite { index });
        }
        Ok(Self(values))
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = CorpusError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<FeatureVector> for Vec<f64> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}
