pub mod corpus;
pub mod ids;
pub mod schema;
pub mod vector;

pub use corpus::{Corpus, CorpusBuilder, SkipReason, SkipReport};
pub use ids::TrackId;
pub use schema::FeatureSchema;
pub use vector::FeatureVector;
