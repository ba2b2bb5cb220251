//! Error types for the embedding pipeline.

use std::path::PathBuf;

use songspace_core::CorpusError;
use thiserror::Error;

/// Errors raised while fitting, persisting, or querying an artifact set.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Required build parameters are missing or contradictory.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The corpus cannot produce a consistent artifact set.
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// A feature column produced a non-finite mean or deviation.
    #[error("feature column {column} has non-finite statistics")]
    NonFiniteColumn { column: usize },

    /// A vector with zero (or non-finite) length cannot be normalized.
    #[error("cannot normalize a zero-length vector")]
    ZeroNorm,

    /// A query was rejected.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Reading or writing the artifact set failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl EmbedError {
    /// Returns `true` for errors a serving caller should report back to
    /// the requester rather than treat as a broken service.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query(_) | Self::ZeroNorm)
    }

    /// Returns `true` when the operation must abort (build or load).
    pub fn is_fatal(&self) -> bool {
        !self.is_query_error()
    }
}

/// Problems with a similarity query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query value at position {index} is not finite")]
    NonFinite { index: usize },

    #[error("k must not be negative (got {0})")]
    NegativeK(i64),

    #[error("unknown track id: {0}")]
    UnknownId(String),
}

/// Problems reading or writing an artifact set.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no published build under {0}")]
    NoCurrentBuild(PathBuf),

    #[error("artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("inconsistent artifact set: {0}")]
    Inconsistent(String),

    #[error("unsupported {artifact} schema version {found} (expected {expected})")]
    UnsupportedVersion {
        artifact: &'static str,
        found: u32,
        expected: u32,
    },

    #[error("invalid {artifact} format: {message}")]
    InvalidFormat {
        artifact: &'static str,
        message: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {artifact}: {source}")]
    Json {
        artifact: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for embedding results.
pub type EmbedResult<T> = std::result::Result<T, EmbedError>;
