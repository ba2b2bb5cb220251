use treadle::Workflow;

use crate::build::{IndexStage, BUILD_STAGE};
use crate::config::Config;

/// Build the index workflow.
///
/// The source configuration is validated here, so a missing database is
/// reported before any stage runs.
///
/// # Errors
/// Returns `TreadleError::InvalidWorkflow` if the configuration is
/// incomplete or the workflow cannot be built.
pub fn build_pipeline(config: &Config) -> treadle::Result<Workflow> {
    config
        .source_config()
        .map_err(|e| treadle::TreadleError::InvalidWorkflow(format!("Cannot build index: {e}")))?;

    Workflow::builder()
        .stage(BUILD_STAGE, IndexStage::new(config.clone()))
        .build()
}
