//! Query-time view of a loaded artifact set.

use songspace_core::TrackId;

use crate::error::{EmbedResult, QueryError};
use crate::index::Neighbor;
use crate::manifest::Manifest;
use crate::normalize::normalize;
use crate::pipeline::ArtifactSet;
use crate::store::ArtifactStore;

/// Runs raw feature vectors through the stored transform chain and the
/// index.
///
/// Immutable once constructed; share it behind an `Arc` for concurrent
/// readers.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    artifacts: ArtifactSet,
}

impl QueryEngine {
    /// Wrap an in-memory artifact set.
    ///
    /// # Errors
    /// Returns a persistence error if the pieces disagree.
    pub fn from_artifacts(artifacts: ArtifactSet) -> EmbedResult<Self> {
        artifacts.validate()?;
        Ok(Self { artifacts })
    }

    /// Load the live build from `store`.
    ///
    /// # Errors
    /// Propagates [`ArtifactStore::load_current`] failures.
    pub fn open(store: &ArtifactStore) -> EmbedResult<Self> {
        Self::from_artifacts(store.load_current()?)
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.artifacts.manifest
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// Map a raw feature vector to its unit-length embedding.
    ///
    /// # Errors
    /// Returns `QueryError::DimensionMismatch` unless `raw` has the
    /// manifest's raw dimension, `QueryError::NonFinite` if any value is
    /// NaN or infinite, and `EmbedError::ZeroNorm` if the vector lands on
    /// the origin.
    pub fn embed(&self, raw: &[f64]) -> EmbedResult<Vec<f64>> {
        let raw_dim = self.artifacts.manifest.raw_dim;
        if raw.len() != raw_dim {
            return Err(QueryError::DimensionMismatch {
                expected: raw_dim,
                actual: raw.len(),
            }
            .into());
        }
        if let Some(index) = raw.iter().position(|x| !x.is_finite()) {
            return Err(QueryError::NonFinite { index }.into());
        }
        let standardized = self.artifacts.standardizer.transform(raw)?;
        let reduced = match &self.artifacts.reducer {
            Some(basis) => basis.transform(&standardized)?,
            None => standardized,
        };
        normalize(&reduced)
    }

    /// The `k` indexed tracks most similar to a raw feature vector.
    ///
    /// # Errors
    /// See [`QueryEngine::embed`].
    pub fn similar(&self, raw: &[f64], k: usize) -> EmbedResult<Vec<Neighbor>> {
        let embedding = self.embed(raw)?;
        self.artifacts.index.query(&embedding, k)
    }

    /// [`QueryEngine::similar`] with a signed `k`.
    ///
    /// # Errors
    /// Returns `QueryError::NegativeK` when `k < 0`.
    pub fn similar_signed(&self, raw: &[f64], k: i64) -> EmbedResult<Vec<Neighbor>> {
        let k = usize::try_from(k).map_err(|_| QueryError::NegativeK(k))?;
        self.similar(raw, k)
    }

    /// The `k` tracks most similar to an indexed track, excluding itself.
    ///
    /// # Errors
    /// Returns `QueryError::UnknownId` if the track is not indexed.
    pub fn similar_to_track(&self, id: &str, k: usize) -> EmbedResult<Vec<Neighbor>> {
        let id = TrackId::new(id).map_err(|_| QueryError::UnknownId(id.to_string()))?;
        self.artifacts.index.query_by_id(&id, k, true)
    }
}
