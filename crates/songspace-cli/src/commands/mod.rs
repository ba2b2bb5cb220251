pub mod build;
pub mod config;
pub mod inspect;
pub mod query;

pub use build::run_build;
pub use inspect::show_inspect;
pub use query::{run_query, run_similar};
