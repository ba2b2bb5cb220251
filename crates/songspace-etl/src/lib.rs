//! Ingestion side of songspace.
//!
//! Vector sources (SQLite and in-memory), layered configuration, the
//! metadata lookup policy, and the `build-index` treadle stage that turns
//! a source into a published artifact set.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod build;
pub mod config;
pub mod error;
pub mod lookup;
pub mod pipeline;
pub mod source;
pub mod work_item;

pub use build::{build_from_source, run_build, BuildReport, IndexStage};
pub use config::{Config, SourceConfig};
pub use error::{SourceError, SourceResult};
pub use lookup::{top_k_weighted, FieldLookup, GenrePolicy, TrackSummary, Vocabulary};
pub use pipeline::build_pipeline;
pub use source::{load_corpus, MemorySource, SqliteSource, VectorSource};
pub use work_item::BuildJob;
