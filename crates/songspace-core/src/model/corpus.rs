//! The validated set of `(TrackId, FeatureVector)` pairs a build fits on.
//!
//! Sources feed raw, possibly malformed records into a [`CorpusBuilder`].
//! Bad records are skipped and tallied in a [`SkipReport`] rather than
//! failing the load; only an empty result is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::CorpusError;
use crate::model::{FeatureVector, TrackId};

/// Why a raw record was left out of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingId,
    InvalidId,
    MissingVector,
    EmptyVector,
    NonFinite,
    DimensionMismatch,
    DuplicateId,
    /// The source could not decode the record at all.
    Malformed,
    /// The record standardized/reduced to a zero vector and cannot be
    /// normalized.
    ZeroNorm,
}

/// Per-reason counts of skipped records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReport {
    #[serde(default)]
    pub missing_id: usize,
    #[serde(default)]
    pub invalid_id: usize,
    #[serde(default)]
    pub missing_vector: usize,
    #[serde(default)]
    pub empty_vector: usize,
    #[serde(default)]
    pub non_finite: usize,
    #[serde(default)]
    pub dimension_mismatch: usize,
    #[serde(default)]
    pub duplicate_id: usize,
    #[serde(default)]
    pub malformed: usize,
    #[serde(default)]
    pub zero_norm: usize,
}

impl SkipReport {
    pub fn record(&mut self, reason: SkipReason) {
        let slot = match reason {
            SkipReason::MissingId => &mut self.missing_id,
            SkipReason::InvalidId => &mut self.invalid_id,
            SkipReason::MissingVector => &mut self.missing_vector,
            SkipReason::EmptyVector => &mut self.empty_vector,
            SkipReason::NonFinite => &mut self.non_finite,
            SkipReason::DimensionMismatch => &mut self.dimension_mismatch,
            SkipReason::DuplicateId => &mut self.duplicate_id,
            SkipReason::Malformed => &mut self.malformed,
            SkipReason::ZeroNorm => &mut self.zero_norm,
        };
        *slot += 1;
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.missing_id
            + self.invalid_id
            + self.missing_vector
            + self.empty_vector
            + self.non_finite
            + self.dimension_mismatch
            + self.duplicate_id
            + self.malformed
            + self.zero_norm
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Accumulates raw records into a [`Corpus`], skipping the bad ones.
///
/// The first accepted record fixes the corpus dimension unless one was
/// given up front with [`CorpusBuilder::with_dim`]. Duplicate ids keep the
/// first occurrence.
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    dim: Option<usize>,
    seen: HashSet<TrackId>,
    entries: Vec<(TrackId, FeatureVector)>,
    skipped: SkipReport,
}

impl CorpusBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every vector to have exactly `dim` values.
    #[must_use]
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    /// Offer one raw record. Returns `true` if it was accepted.
    pub fn push_raw(&mut self, id: Option<&str>, values: Option<Vec<f64>>) -> bool {
        let Some(id) = id else {
            return self.skip(SkipReason::MissingId, "<null>");
        };
        let track_id = match TrackId::new(id) {
            Ok(track_id) => track_id,
            Err(_) => return self.skip(SkipReason::InvalidId, id),
        };
        let Some(values) = values else {
            return self.skip(SkipReason::MissingVector, id);
        };
        let vector = match FeatureVector::new(values) {
            Ok(vector) => vector,
            Err(CorpusError::EmptyVector) => return self.skip(SkipReason::EmptyVector, id),
            Err(_) => return self.skip(SkipReason::NonFinite, id),
        };
        self.push(track_id, vector)
    }

    /// Offer an already-validated record. Returns `true` if it was accepted.
    pub fn push(&mut self, id: TrackId, vector: FeatureVector) -> bool {
        match self.dim {
            Some(dim) if dim != vector.dim() => {
                return self.skip(SkipReason::DimensionMismatch, id.as_str());
            }
            Some(_) => {}
            None => self.dim = Some(vector.dim()),
        }
        if self.seen.contains(&id) {
            return self.skip(SkipReason::DuplicateId, id.as_str());
        }
        self.seen.insert(id.clone());
        self.entries.push((id, vector));
        true
    }

    /// Count a record the source could not decode.
    pub fn skip_malformed(&mut self, context: &str) {
        self.skip(SkipReason::Malformed, context);
    }

    fn skip(&mut self, reason: SkipReason, id: &str) -> bool {
        log::debug!("Skipping record {id}: {reason:?}");
        self.skipped.record(reason);
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn skipped(&self) -> &SkipReport {
        &self.skipped
    }

    /// Finish the corpus.
    ///
    /// # Errors
    /// Returns `CorpusError::Empty` if no record was accepted.
    pub fn finish(self) -> Result<Corpus, CorpusError> {
        let Some(dim) = self.dim.filter(|_| !self.entries.is_empty()) else {
            return Err(CorpusError::Empty {
                skipped: self.skipped,
            });
        };
        if !self.skipped.is_empty() {
            log::info!(
                "Corpus loaded: {} records accepted, {} skipped",
                self.entries.len(),
                self.skipped.total()
            );
        }
        Ok(Corpus {
            dim,
            entries: self.entries,
            skipped: self.skipped,
        })
    }
}

/// A non-empty, id-unique set of equal-length feature vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    dim: usize,
    entries: Vec<(TrackId, FeatureVector)>,
    skipped: SkipReport,
}

impl Corpus {
    /// Build a corpus where every pair must be valid.
    ///
    /// # Errors
    /// Returns the first problem found, or `CorpusError::Empty`.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, CorpusError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: AsRef<str>,
    {
        let mut dim = None;
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (id, values) in pairs {
            let id = TrackId::new(id)?;
            let vector = FeatureVector::new(values)?;
            let expected = *dim.get_or_insert(vector.dim());
            if vector.dim() != expected {
                return Err(CorpusError::DimensionMismatch {
                    expected,
                    actual: vector.dim(),
                });
            }
            if !seen.insert(id.clone()) {
                return Err(CorpusError::InvalidId(format!("duplicate id {id}")));
            }
            entries.push((id, vector));
        }
        match dim {
            Some(dim) => Ok(Self {
                dim,
                entries,
                skipped: SkipReport::default(),
            }),
            None => Err(CorpusError::Empty {
                skipped: SkipReport::default(),
            }),
        }
    }

    /// Raw dimension shared by every vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackId, &FeatureVector)> {
        self.entries.iter().map(|(id, v)| (id, v))
    }

    pub fn ids(&self) -> impl Iterator<Item = &TrackId> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f64]> {
        self.entries.iter().map(|(_, v)| v.as_slice())
    }

    /// Records skipped while this corpus was loaded.
    #[must_use]
    pub fn skipped(&self) -> &SkipReport {
        &self.skipped
    }
}
