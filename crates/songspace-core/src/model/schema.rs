use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

/// Column layout of the raw vectors stored in `song_features`.
pub const DEFAULT_FEATURE_COLUMNS: &[&str] = &[
    "duration",
    "tempo",
    "loudness",
    "key",
    "mode",
    "time_signature",
    "danceability",
    "energy",
];

/// Ordered names of the raw feature columns a corpus was built from.
///
/// The schema travels with the artifact set so a later reader knows which
/// column each raw dimension holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Positional names (`col_0`, `col_1`, ...) for `dim` unnamed columns.
    #[must_use]
    pub fn positional(dim: usize) -> Self {
        Self {
            columns: (0..dim).map(|i| format!("col_{i}")).collect(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check that this schema names exactly `dim` columns.
    ///
    /// # Errors
    /// Returns `CorpusError::DimensionMismatch` otherwise.
    pub fn check_dim(&self, dim: usize) -> Result<(), CorpusError> {
        if self.columns.len() == dim {
            Ok(())
        } else {
            Err(CorpusError::DimensionMismatch {
                expected: dim,
                actual: self.columns.len(),
            })
        }
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            columns: DEFAULT_FEATURE_COLUMNS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema() {
        let schema = FeatureSchema::default();
        assert_eq!(schema.len(), 8);
        assert_eq!(schema.columns()[5], "time_signature");
    }

    #[test]
    fn test_positional_schema() {
        let schema = FeatureSchema::positional(3);
        assert_eq!(schema.columns(), &["col_0", "col_1", "col_2"]);
    }

    #[test]
    fn test_check_dim() {
        let schema = FeatureSchema::default();
        assert!(schema.check_dim(8).is_ok());
        assert_eq!(
            schema.check_dim(4),
            Err(CorpusError::DimensionMismatch {
                expected: 4,
                actual: 8
            })
        );
    }
}
