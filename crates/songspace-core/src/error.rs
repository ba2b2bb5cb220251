use thiserror::Error;

use crate::model::SkipReport;

#[derive(Debug, Error)]
pub enum Error {
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Problems with the set of vectors a build is fitted on.
///
/// Per-record variants are what `CorpusBuilder` counts and skips; `Empty`
/// is the only one that aborts a build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorpusError {
    #[error("corpus is empty ({total} records skipped)", total = .skipped.total())]
    Empty { skipped: SkipReport },

    #[error("invalid track id: {0:?}")]
    InvalidId(String),

    #[error("feature vector is empty")]
    EmptyVector,

    #[error("feature vector has a non-finite value at position {index}")]
    NonFinite { index: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
