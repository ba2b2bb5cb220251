use anyhow::{Context, Result};
use songspace_embed::{ArtifactStore, Manifest};
use songspace_etl::Config;

/// Show a build manifest and the builds kept on disk.
pub fn show_inspect(config: &Config, build: Option<&str>, json: bool) -> Result<()> {
    let store = ArtifactStore::new(&config.artifact_dir);
    let current = store.current_build_id()?;

    let Some(build_id) = build.map(str::to_string).or_else(|| current.clone()) else {
        println!("No build published in {}", config.artifact_dir.display());
        println!("\nRun 'songspace build' to create one.");
        return Ok(());
    };

    let artifacts = store
        .load_build(&build_id)
        .with_context(|| format!("Failed to load build {build_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts.manifest)?);
        return Ok(());
    }

    print_manifest(&artifacts.manifest, current.as_deref() == Some(build_id.as_str()));

    let builds = store.list_builds()?;
    println!("\nBuilds on disk ({}):", builds.len());
    for id in builds.iter().rev() {
        let marker = if current.as_deref() == Some(id.as_str()) { "*" } else { " " };
        println!("  {marker} {id}");
    }

    Ok(())
}

fn print_manifest(manifest: &Manifest, live: bool) {
    println!("\n📦 Build {}{}\n", manifest.build_id, if live { " (live)" } else { "" });
    println!("  Created: {}", manifest.created_at.to_rfc3339());
    println!("  Tracks indexed: {}", manifest.n_songs);
    println!("  Raw dimension: {}", manifest.raw_dim);
    if manifest.use_reduction {
        println!(
            "  Reduction: PCA, {} requested, {} kept",
            manifest.reduction_components_requested, manifest.final_dim
        );
    } else {
        println!("  Reduction: disabled");
    }
    if let Some(ratio) = manifest.explained_variance_ratio_total {
        println!("  Variance retained: {:.1}%", ratio * 100.0);
    }
    println!("  Embedding dimension: {}", manifest.final_dim);
    println!("  Index: {} ({})", manifest.algorithm, manifest.metric);
    println!(
        "  Feature columns: {}",
        manifest.feature_columns.columns().join(", ")
    );

    let skipped = &manifest.records_skipped;
    if skipped.is_empty() {
        println!("  Records skipped: 0");
    } else {
        println!("  Records skipped: {}", skipped.total());
        let counts = [
            ("missing id", skipped.missing_id),
            ("invalid id", skipped.invalid_id),
            ("missing features", skipped.missing_vector),
            ("empty features", skipped.empty_vector),
            ("non-finite value", skipped.non_finite),
            ("wrong dimension", skipped.dimension_mismatch),
            ("duplicate id", skipped.duplicate_id),
            ("malformed", skipped.malformed),
            ("zero-length embedding", skipped.zero_norm),
        ];
        for (label, count) in counts.iter().filter(|(_, count)| *count > 0) {
            println!("    {label}: {count}");
        }
    }

    println!("  Files:");
    for (name, digest) in &manifest.files {
        println!("    {name}  sha256:{digest}");
    }
}
