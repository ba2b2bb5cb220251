//! The fit chain: standardize, optionally reduce, normalize, index.
//!
//! [`fit`] produces a complete [`ArtifactSet`] in memory. Nothing is
//! written until the whole set exists, so a failed build can never leave
//! a new index next to stale parameters.

use chrono::Utc;
use songspace_core::{Corpus, CorpusError, FeatureSchema, SkipReason, TrackId};
use uuid::Uuid;

use crate::error::{EmbedError, EmbedResult, PersistenceError};
use crate::index::{FlatIndex, ALGORITHM};
use crate::manifest::{Manifest, MANIFEST_SCHEMA_VERSION};
use crate::normalize::normalize;
use crate::reduce::{ReductionBasis, Reducer};
use crate::standardize::{StandardizationParams, Standardizer};

pub const DEFAULT_REDUCTION_COMPONENTS: usize = 64;

/// Parameters of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Project onto principal components before normalizing.
    pub use_reduction: bool,
    /// Requested component count; clamped to `[1, raw_dim]`.
    pub reduction_components: usize,
    /// Raw column names. `None` names columns by position.
    pub feature_columns: Option<FeatureSchema>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            use_reduction: true,
            reduction_components: DEFAULT_REDUCTION_COMPONENTS,
            feature_columns: None,
        }
    }
}

/// Everything a build produces, always handled as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    pub manifest: Manifest,
    pub standardizer: StandardizationParams,
    pub reducer: Option<ReductionBasis>,
    pub index: FlatIndex,
}

impl ArtifactSet {
    /// Cross-check every piece against the manifest.
    ///
    /// # Errors
    /// Returns `PersistenceError::Inconsistent` describing the first mismatch.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        let m = &self.manifest;
        m.validate().map_err(PersistenceError::Inconsistent)?;
        self.standardizer
            .validate()
            .map_err(PersistenceError::Inconsistent)?;
        if self.standardizer.dim() != m.raw_dim {
            return Err(PersistenceError::Inconsistent(format!(
                "standardizer dimension {} != manifest raw dimension {}",
                self.standardizer.dim(),
                m.raw_dim
            )));
        }
        match (&self.reducer, m.use_reduction) {
            (Some(basis), true) => {
                basis.validate().map_err(PersistenceError::Inconsistent)?;
                if basis.input_dim() != m.raw_dim || basis.n_components() != m.final_dim {
                    return Err(PersistenceError::Inconsistent(format!(
                        "reducer shape {}x{} != manifest {}x{}",
                        basis.n_components(),
                        basis.input_dim(),
                        m.final_dim,
                        m.raw_dim
                    )));
                }
                if basis.requested_components != m.reduction_components_requested {
                    return Err(PersistenceError::Inconsistent(
                        "reducer and manifest disagree on requested components".to_string(),
                    ));
                }
            }
            (None, false) => {}
            (Some(_), false) => {
                return Err(PersistenceError::Inconsistent(
                    "reducer present but manifest says reduction is disabled".to_string(),
                ));
            }
            (None, true) => {
                return Err(PersistenceError::Inconsistent(
                    "manifest says reduction is enabled but no reducer is present".to_string(),
                ));
            }
        }
        if self.index.dim() != m.final_dim || self.index.len() != m.n_songs {
            return Err(PersistenceError::Inconsistent(format!(
                "index holds {} rows of dimension {}, manifest declares {} of {}",
                self.index.len(),
                self.index.dim(),
                m.n_songs,
                m.final_dim
            )));
        }
        if self.index.metric() != m.metric {
            return Err(PersistenceError::Inconsistent(
                "index and manifest disagree on the metric".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fit every stage on `corpus` and assemble the artifact set.
///
/// Vectors that collapse to zero length after standardization and
/// reduction cannot be normalized; they are skipped and counted in the
/// manifest. The build fails only if no vector survives.
///
/// # Errors
/// Returns `EmbedError::Configuration` when the feature columns disagree
/// with the corpus dimension, or a corpus error when nothing is indexable.
pub fn fit(corpus: &Corpus, options: &BuildOptions) -> EmbedResult<ArtifactSet> {
    let raw_dim = corpus.dim();
    let schema = options
        .feature_columns
        .clone()
        .unwrap_or_else(|| FeatureSchema::positional(raw_dim));
    schema.check_dim(raw_dim).map_err(|_| {
        EmbedError::Configuration(format!(
            "{} feature columns configured but vectors have {raw_dim} values",
            schema.len()
        ))
    })?;

    log::info!(
        "Fitting embeddings for {} tracks of dimension {raw_dim}",
        corpus.len()
    );

    let standardizer = Standardizer::fit(corpus)?;
    let standardized = corpus
        .vectors()
        .map(|v| standardizer.transform(v))
        .collect::<EmbedResult<Vec<_>>>()?;

    let (reducer, reduced) = if options.use_reduction {
        let basis = Reducer::fit(&standardized, options.reduction_components)?;
        let reduced = standardized
            .iter()
            .map(|v| basis.transform(v))
            .collect::<EmbedResult<Vec<_>>>()?;
        log::info!("PCA: {raw_dim} -> {} dims", basis.n_components());
        (Some(basis), reduced)
    } else {
        (None, standardized)
    };

    let mut skipped = corpus.skipped().clone();
    let mut ids: Vec<TrackId> = Vec::with_capacity(corpus.len());
    let mut embeddings = Vec::with_capacity(corpus.len());
    for (id, vector) in corpus.ids().zip(&reduced) {
        match normalize(vector) {
            Ok(unit) => {
                ids.push(id.clone());
                embeddings.push(unit);
            }
            Err(EmbedError::ZeroNorm) => {
                log::debug!("Skipping {id}: embedding has zero length");
                skipped.record(SkipReason::ZeroNorm);
            }
            Err(e) => return Err(e),
        }
    }
    if embeddings.is_empty() {
        return Err(CorpusError::Empty { skipped }.into());
    }
    if skipped.zero_norm > 0 {
        log::warn!(
            "{} tracks had zero-length embeddings and were left out of the index",
            skipped.zero_norm
        );
    }

    let index = FlatIndex::build(ids, embeddings)?;

    let created_at = Utc::now();
    let build_id = format!(
        "{}-{}",
        created_at.format("%Y%m%dT%H%M%S%.3fZ"),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let manifest = Manifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        build_id,
        created_at,
        n_songs: index.len(),
        raw_dim,
        use_reduction: options.use_reduction,
        reduction_components_requested: options.reduction_components,
        final_dim: index.dim(),
        metric: index.metric(),
        algorithm: ALGORITHM.to_string(),
        feature_columns: schema,
        explained_variance_ratio_total: reducer.as_ref().map(ReductionBasis::retained_variance_ratio),
        records_skipped: skipped,
        files: std::collections::BTreeMap::new(),
    };

    let artifacts = ArtifactSet {
        manifest,
        standardizer,
        reducer,
        index,
    };
    artifacts.validate()?;
    Ok(artifacts)
}
