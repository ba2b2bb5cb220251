//! The `build-index` stage: read a source, fit, publish, prune.

use serde::{Deserialize, Serialize};
use songspace_core::SkipReport;
use songspace_embed::{fit, ArtifactStore};
use std::path::PathBuf;
use treadle::{Stage, StageContext, StageOutcome};

use crate::config::Config;
use crate::error::SourceResult;
use crate::source::{load_corpus, SqliteSource, VectorSource};

/// Name of the stage in the workflow.
pub const BUILD_STAGE: &str = "build-index";

/// What one build produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: String,
    pub path: PathBuf,
    pub n_songs: usize,
    pub raw_dim: usize,
    pub final_dim: usize,
    pub explained_variance_ratio: Option<f64>,
    pub skipped: SkipReport,
    pub pruned: Vec<String>,
}

/// Build from the SQLite source named in `config`.
///
/// The configuration is checked before anything is opened, and the
/// database connection is closed before the artifacts are written.
///
/// # Errors
/// Returns `SourceError::Configuration` without a database path, or any
/// source, fit, or persistence error.
pub fn run_build(config: &Config) -> SourceResult<BuildReport> {
    let source_config = config.source_config()?;
    let corpus = {
        let mut source = SqliteSource::open(&source_config.database_path, &source_config.table)?;
        load_corpus(&mut source, config.expected_dim())?
    };
    publish_corpus(&corpus, config)
}

/// Build from any source.
///
/// # Errors
/// See [`run_build`].
pub fn build_from_source(
    source: &mut dyn VectorSource,
    config: &Config,
) -> SourceResult<BuildReport> {
    let corpus = load_corpus(source, config.expected_dim())?;
    publish_corpus(&corpus, config)
}

fn publish_corpus(corpus: &songspace_core::Corpus, config: &Config) -> SourceResult<BuildReport> {
    let artifacts = fit(corpus, &config.build_options())?;
    let store = ArtifactStore::new(&config.artifact_dir);
    let published = store.publish(&artifacts)?;
    let pruned = store.prune(config.keep_builds)?;
    let manifest = published.manifest;
    Ok(BuildReport {
        build_id: published.build_id,
        path: published.path,
        n_songs: manifest.n_songs,
        raw_dim: manifest.raw_dim,
        final_dim: manifest.final_dim,
        explained_variance_ratio: manifest.explained_variance_ratio_total,
        skipped: manifest.records_skipped,
        pruned,
    })
}

/// Treadle stage wrapping [`run_build`].
#[derive(Debug)]
pub struct IndexStage {
    config: Config,
}

impl IndexStage {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Stage for IndexStage {
    fn name(&self) -> &str {
        BUILD_STAGE
    }

    async fn execute(
        &self,
        item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        log::info!("Starting index build for job {}", item.id());

        let config = self.config.clone();
        let report = tokio::task::spawn_blocking(move || run_build(&config))
            .await
            .map_err(|e| {
                treadle::TreadleError::StageExecution(format!("Build task failed: {e}"))
            })?
            .map_err(|e| {
                treadle::TreadleError::StageExecution(format!("Index build failed: {e}"))
            })?;

        log::info!(
            "Build {} complete: {} tracks, {} -> {} dims, {} skipped",
            report.build_id,
            report.n_songs,
            report.raw_dim,
            report.final_dim,
            report.skipped.total()
        );
        ctx.metadata.insert(
            "build_id".to_string(),
            serde_json::Value::String(report.build_id),
        );
        Ok(StageOutcome::Complete)
    }
}
