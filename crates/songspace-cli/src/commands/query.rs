use anyhow::{Context, Result};
use songspace_embed::{ArtifactStore, Neighbor, QueryEngine, QueryError};
use songspace_etl::Config;

fn open_engine(config: &Config) -> Result<QueryEngine> {
    let store = ArtifactStore::new(&config.artifact_dir);
    let engine = QueryEngine::open(&store).with_context(|| {
        format!(
            "No usable index in {}; run 'songspace build' first",
            config.artifact_dir.display()
        )
    })?;
    log::debug!(
        "Serving build {} ({} tracks)",
        engine.manifest().build_id,
        engine.manifest().n_songs
    );
    Ok(engine)
}

fn result_count(k: i64) -> Result<usize> {
    Ok(usize::try_from(k).map_err(|_| QueryError::NegativeK(k))?)
}

/// Query the live index with a raw feature vector.
pub fn run_query(config: &Config, vector: &[f64], k: i64, json: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let neighbors = engine.similar_signed(vector, k)?;
    print_neighbors(&neighbors, json)
}

/// Query the live index with an indexed track.
pub fn run_similar(config: &Config, track_id: &str, k: i64, json: bool) -> Result<()> {
    let k = result_count(k)?;
    let engine = open_engine(config)?;
    let neighbors = engine.similar_to_track(track_id, k)?;
    if !json {
        println!("Tracks similar to {track_id}:\n");
    }
    print_neighbors(&neighbors, json)
}

fn print_neighbors(neighbors: &[Neighbor], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(neighbors)?);
        return Ok(());
    }
    if neighbors.is_empty() {
        println!("  (no results)");
        return Ok(());
    }
    for (rank, neighbor) in neighbors.iter().enumerate() {
        println!(
            "  {:>3}. {:<24} distance {:.6}  similarity {:.4}",
            rank + 1,
            neighbor.id,
            neighbor.distance,
            neighbor.similarity()
        );
    }
    Ok(())
}
