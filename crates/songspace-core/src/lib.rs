//! Core data model for songspace.
//!
//! This crate defines the types every other songspace crate speaks:
//! track identifiers, raw feature vectors, the feature schema that names
//! each vector column, and the validated `Corpus` a build is fitted on.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;

pub use error::{CorpusError, Error, Result};
pub use model::{
    Corpus, CorpusBuilder, FeatureSchema, FeatureVector, SkipReason, SkipReport, TrackId,
};
