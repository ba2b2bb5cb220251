use anyhow::{Context, Result};
use songspace_embed::ArtifactStore;
use songspace_etl::{build_pipeline, BuildJob, Config};

/// Run the `build-index` workflow and report the published build.
pub async fn run_build(config: Config) -> Result<()> {
    let source = config.source_config()?;
    println!("\n🎵 Songspace Index Build\n");
    println!("  Database: {}", source.database_path.display());
    println!("  Table: {}", source.table);
    println!("  Artifacts: {}", config.artifact_dir.display());
    if config.use_reduction {
        println!("  Reduction: PCA, {} components requested", config.reduction_components);
    } else {
        println!("  Reduction: disabled");
    }
    println!();

    std::fs::create_dir_all(&config.artifact_dir).with_context(|| {
        format!(
            "Failed to create artifact directory {}",
            config.artifact_dir.display()
        )
    })?;
    let store = ArtifactStore::new(&config.artifact_dir);
    let previous = store.current_build_id()?;

    let workflow = build_pipeline(&config).context("Failed to build pipeline")?;

    let state_path = config.artifact_dir.join("pipeline.db");
    let mut state = treadle::SqliteStateStore::open(&state_path)
        .await
        .context("Failed to open pipeline state store")?;

    let job = BuildJob::new();
    log::info!("Starting build job {job}");

    // Subscribe to events for progress display
    let mut events = workflow.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                treadle::WorkflowEvent::StageStarted { stage, .. } => {
                    println!("  ⏳ [{stage}] Starting...");
                }
                treadle::WorkflowEvent::StageCompleted { stage, .. } => {
                    println!("  ✓ [{stage}] Complete");
                }
                treadle::WorkflowEvent::StageFailed { stage, error, .. } => {
                    eprintln!("  ✗ [{stage}] FAILED: {error}");
                }
                _ => {}
            }
        }
    });

    workflow
        .advance(&job, &mut state)
        .await
        .context("Pipeline execution failed")?;

    let current = store.current_build_id()?;
    let Some(build_id) = current.filter(|id| previous.as_ref() != Some(id)) else {
        anyhow::bail!("Build did not publish a new index; see the log above");
    };

    let manifest = store.load_build(&build_id)?.manifest;
    println!("\n✓ Published build {build_id}");
    println!("  Tracks indexed: {}", manifest.n_songs);
    println!(
        "  Dimensions: {} raw -> {} embedded",
        manifest.raw_dim, manifest.final_dim
    );
    if let Some(ratio) = manifest.explained_variance_ratio_total {
        println!("  Variance retained: {:.1}%", ratio * 100.0);
    }
    let skipped = manifest.records_skipped.total();
    if skipped > 0 {
        println!("  Records skipped: {skipped}");
    }
    println!("\nNext steps:");
    println!("  - Run 'songspace similar <track_id>' to find similar songs");
    println!("  - Run 'songspace inspect' to view the build manifest");

    Ok(())
}
