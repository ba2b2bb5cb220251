//! Error types for vector sources and the build stage.

use thiserror::Error;

/// Errors that can occur while opening a source or running a build.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A required setting is missing or invalid. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An error propagated from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An error propagated from the core data model.
    #[error(transparent)]
    Core(#[from] songspace_core::Error),

    /// An error propagated from the embedding pipeline or artifact store.
    #[error(transparent)]
    Embed(#[from] songspace_embed::EmbedError),

    /// The configured table name is not a plain SQL identifier.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),
}

impl From<songspace_core::CorpusError> for SourceError {
    fn from(e: songspace_core::CorpusError) -> Self {
        Self::Core(e.into())
    }
}

impl SourceError {
    /// Returns `true` when the failure comes from settings rather than data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::InvalidTable(_)
                | Self::Embed(songspace_embed::EmbedError::Configuration(_))
        )
    }
}

/// Convenience alias for source results.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
