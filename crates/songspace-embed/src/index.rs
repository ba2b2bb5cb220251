//! Exact (brute-force) cosine nearest-neighbor index.
//!
//! Every query scans all `n` stored embeddings. At catalog sizes of tens
//! of thousands of tracks this is fast enough and has no approximation
//! error. The index is immutable once built; a refit builds a new one.

use serde::{Deserialize, Serialize};
use songspace_core::{CorpusError, SkipReport, TrackId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::{EmbedError, EmbedResult, QueryError};
use crate::normalize::{l2_norm, to_unit, UNIT_TOLERANCE};

/// Similarity metric used by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
}

impl Metric {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search strategy name recorded in the manifest.
pub const ALGORITHM: &str = "brute";

/// One query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: TrackId,
    pub distance: f64,
}

impl Neighbor {
    /// Cosine similarity, `1 - distance`.
    #[must_use]
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Immutable `n x k` matrix of unit-length embeddings with its parallel
/// id list.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    metric: Metric,
    dim: usize,
    ids: Vec<TrackId>,
    /// Row-major embeddings, `ids.len() * dim` values.
    data: Vec<f64>,
    positions: HashMap<TrackId, usize>,
}

impl FlatIndex {
    /// Build an index over `embeddings`, row `i` belonging to `ids[i]`.
    ///
    /// Rows that are not already unit length are normalized.
    ///
    /// # Errors
    /// Fails on empty input, length or dimension disagreement, duplicate
    /// ids, non-finite values, or a zero-length embedding.
    pub fn build(ids: Vec<TrackId>, embeddings: Vec<Vec<f64>>) -> EmbedResult<Self> {
        if ids.len() != embeddings.len() {
            return Err(EmbedError::Configuration(format!(
                "{} ids for {} embeddings",
                ids.len(),
                embeddings.len()
            )));
        }
        let Some(dim) = embeddings.first().map(Vec::len) else {
            return Err(CorpusError::Empty {
                skipped: SkipReport::default(),
            }
            .into());
        };
        if dim == 0 {
            return Err(CorpusError::EmptyVector.into());
        }

        let mut data = Vec::with_capacity(ids.len() * dim);
        for row in embeddings {
            if row.len() != dim {
                return Err(CorpusError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                }
                .into());
            }
            if let Some(index) = row.iter().position(|v| !v.is_finite()) {
                return Err(CorpusError::NonFinite { index }.into());
            }
            data.extend(to_unit(row)?);
        }
        Self::from_parts(Metric::Cosine, dim, ids, data)
    }

    /// Rebuild an index from its flat storage form.
    pub(crate) fn from_parts(
        metric: Metric,
        dim: usize,
        ids: Vec<TrackId>,
        data: Vec<f64>,
    ) -> EmbedResult<Self> {
        if dim == 0 || ids.is_empty() || data.len() != ids.len() * dim {
            return Err(EmbedError::Configuration(format!(
                "index storage of {} values does not hold {} rows of dimension {dim}",
                data.len(),
                ids.len()
            )));
        }
        if let Some(index) = data.iter().position(|v| !v.is_finite()) {
            return Err(CorpusError::NonFinite { index: index % dim }.into());
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(CorpusError::InvalidId(format!("duplicate id {id}")).into());
            }
        }

        if let Some(row) = data
            .chunks_exact(dim)
            .position(|row| (l2_norm(row) - 1.0).abs() > UNIT_TOLERANCE)
        {
            return Err(EmbedError::Configuration(format!(
                "stored embedding {row} is not unit length"
            )));
        }

        Ok(Self {
            metric,
            dim,
            ids,
            data,
            positions,
        })
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Embedding dimension `k`.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> &[TrackId] {
        &self.ids
    }

    /// Row-major embedding matrix.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub fn contains(&self, id: &TrackId) -> bool {
        self.positions.contains_key(id)
    }

    /// Stored embedding of `id`, if indexed.
    #[must_use]
    pub fn embedding(&self, id: &TrackId) -> Option<&[f64]> {
        self.positions.get(id).map(|&i| self.row(i))
    }

    fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// The `k` stored ids closest to `vector`, nearest first.
    ///
    /// `k` is clamped to the index size. Equal distances are ordered by id.
    ///
    /// # Errors
    /// Returns `QueryError::DimensionMismatch` for a wrong-length vector
    /// and `EmbedError::ZeroNorm` for a zero vector.
    pub fn query(&self, vector: &[f64], k: usize) -> EmbedResult<Vec<Neighbor>> {
        self.search(vector, k, None)
    }

    /// [`FlatIndex::query`] for callers holding a signed `k`.
    ///
    /// # Errors
    /// Returns `QueryError::NegativeK` when `k < 0`.
    pub fn query_signed(&self, vector: &[f64], k: i64) -> EmbedResult<Vec<Neighbor>> {
        let k = usize::try_from(k).map_err(|_| QueryError::NegativeK(k))?;
        self.query(vector, k)
    }

    /// Tracks most similar to an already indexed track.
    ///
    /// With `exclude_self` the track itself is left out of the results.
    ///
    /// # Errors
    /// Returns `QueryError::UnknownId` if `id` is not indexed.
    pub fn query_by_id(
        &self,
        id: &TrackId,
        k: usize,
        exclude_self: bool,
    ) -> EmbedResult<Vec<Neighbor>> {
        let Some(&position) = self.positions.get(id) else {
            return Err(QueryError::UnknownId(id.to_string()).into());
        };
        let skip = exclude_self.then_some(position);
        self.search(self.row(position), k, skip)
    }

    fn search(&self, vector: &[f64], k: usize, skip: Option<usize>) -> EmbedResult<Vec<Neighbor>> {
        if vector.len() != self.dim {
            return Err(QueryError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            }
            .into());
        }
        let query = to_unit(vector.to_vec())?;

        let mut scored: Vec<(f64, usize)> = (0..self.len())
            .filter(|i| Some(*i) != skip)
            .map(|i| (self.distance(&query, i), i))
            .collect();

        let k = k.min(scored.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        let cmp = |a: &(f64, usize), b: &(f64, usize)| match a.0.total_cmp(&b.0) {
            Ordering::Equal => self.ids[a.1].cmp(&self.ids[b.1]),
            other => other,
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, cmp);
            scored.truncate(k);
        }
        scored.sort_unstable_by(cmp);

        Ok(scored
            .into_iter()
            .map(|(distance, i)| Neighbor {
                id: self.ids[i].clone(),
                distance,
            })
            .collect())
    }

    /// For unit vectors `1 - cos(a, b) == |a - b|^2 / 2`; the squared
    /// difference form is exactly zero for identical vectors.
    fn distance(&self, query: &[f64], i: usize) -> f64 {
        match self.metric {
            Metric::Cosine => {
                let squared: f64 = self
                    .row(i)
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (0.5 * squared).clamp(0.0, 2.0)
            }
        }
    }
}
