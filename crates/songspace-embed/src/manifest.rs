//! Build manifest: the authoritative description of an artifact set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use songspace_core::{FeatureSchema, SkipReport};
use std::collections::BTreeMap;

use crate::index::Metric;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Metadata written once per build and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    /// Number of indexed tracks.
    pub n_songs: usize,
    /// Length of raw feature vectors accepted at query time.
    pub raw_dim: usize,
    pub use_reduction: bool,
    pub reduction_components_requested: usize,
    /// Length of the stored embeddings.
    pub final_dim: usize,
    pub metric: Metric,
    pub algorithm: String,
    /// Name of each raw dimension, in vector order.
    pub feature_columns: FeatureSchema,
    /// Share of variance kept by the reduction, when enabled.
    #[serde(default)]
    pub explained_variance_ratio_total: Option<f64>,
    #[serde(default)]
    pub records_skipped: SkipReport,
    /// Artifact file name to lowercase hex SHA-256, filled in on publish.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl Manifest {
    /// Check the manifest against itself.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(format!(
                "manifest schema version {} is not {MANIFEST_SCHEMA_VERSION}",
                self.schema_version
            ));
        }
        if self.n_songs == 0 || self.raw_dim == 0 || self.final_dim == 0 {
            return Err("manifest declares an empty build".to_string());
        }
        if self.feature_columns.len() != self.raw_dim {
            return Err(format!(
                "manifest names {} feature columns for raw dimension {}",
                self.feature_columns.len(),
                self.raw_dim
            ));
        }
        if self.final_dim > self.raw_dim {
            return Err(format!(
                "final dimension {} exceeds raw dimension {}",
                self.final_dim, self.raw_dim
            ));
        }
        if !self.use_reduction && self.final_dim != self.raw_dim {
            return Err("unreduced build must keep the raw dimension".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            build_id: "20260101T000000Z-abcd1234".to_string(),
            created_at: Utc::now(),
            n_songs: 3,
            raw_dim: 8,
            use_reduction: true,
            reduction_components_requested: 64,
            final_dim: 8,
            metric: Metric::Cosine,
            algorithm: "brute".to_string(),
            feature_columns: FeatureSchema::default(),
            explained_variance_ratio_total: Some(1.0),
            records_skipped: SkipReport::default(),
            files: BTreeMap::new(),
        }
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["metric"], "cosine");
        assert_eq!(json["reduction_components_requested"], 64);
        assert_eq!(json["final_dim"], 8);
        assert_eq!(json["feature_columns"][0], "duration");
    }

    #[test]
    fn test_manifest_validate() {
        assert!(sample().validate().is_ok());

        let mut m = sample();
        m.final_dim = 9;
        assert!(m.validate().is_err());

        let mut m = sample();
        m.feature_columns = FeatureSchema::positional(3);
        assert!(m.validate().is_err());

        let mut m = sample();
        m.use_reduction = false;
        m.final_dim = 4;
        assert!(m.validate().is_err());
    }
}
