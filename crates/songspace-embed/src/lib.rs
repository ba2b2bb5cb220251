//! Embedding pipeline and similarity index for songspace.
//!
//! Raw per-track feature vectors go through four fitted stages:
//! standardization, optional PCA reduction, L2 normalization, and an
//! exact cosine index. The fitted stages plus a manifest form an
//! artifact set that is published atomically and loaded later to answer
//! "songs similar to X" queries without refitting.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod format;
pub mod index;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod reduce;
pub mod standardize;
pub mod store;

pub use error::{EmbedError, EmbedResult, PersistenceError, QueryError};
pub use index::{FlatIndex, Metric, Neighbor};
pub use manifest::Manifest;
pub use normalize::normalize;
pub use pipeline::{fit, ArtifactSet, BuildOptions};
pub use query::QueryEngine;
pub use reduce::{ReductionBasis, Reducer};
pub use standardize::{StandardizationParams, Standardizer};
pub use store::{ArtifactStore, PublishedBuild};
