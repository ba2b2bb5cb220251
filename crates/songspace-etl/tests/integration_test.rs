//! Integration tests for the full source -> build -> query path.
//!
//! These tests create a small SQLite feature table in a temporary
//! directory, run the build through the treadle workflow, and query the
//! published artifacts.

use rusqlite::Connection;
use songspace_embed::{ArtifactStore, QueryEngine};
use songspace_etl::source::encode_blob;
use songspace_etl::{build_pipeline, run_build, BuildJob, Config, IndexStage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treadle::{Stage, StageContext, StageOutcome, WorkItem};

/// Write a feature table with clusters of similar tracks.
fn create_feature_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute("CREATE TABLE song_features (track_id TEXT, features)", [])
        .unwrap();
    let insert = "INSERT INTO song_features (track_id, features) VALUES (?1, ?2)";
    for i in 0..30 {
        let x = f64::from(i);
        let cluster = f64::from(i % 3);
        let values = vec![
            180.0 + 60.0 * cluster + x,
            90.0 + 25.0 * cluster + (x * 0.4).sin() * 3.0,
            -14.0 + 3.0 * cluster + (x * 0.9).cos(),
            f64::from(i % 12),
            f64::from(i % 2),
            4.0,
            0.3 + 0.2 * cluster + (x * 0.2).sin() * 0.05,
            0.2 + 0.25 * cluster + (x * 0.3).cos() * 0.05,
        ];
        // Alternate storage forms; the source reads both.
        if i % 2 == 0 {
            let json = serde_json::to_string(&values).unwrap();
            conn.execute(insert, rusqlite::params![format!("TR{i:04}"), json])
                .unwrap();
        } else {
            conn.execute(
                insert,
                rusqlite::params![format!("TR{i:04}"), encode_blob(&values)],
            )
            .unwrap();
        }
    }
    conn.execute(insert, rusqlite::params!["TRBROKEN", "[1.0, oops]"])
        .unwrap();
    conn.execute(insert, rusqlite::params![None::<String>, "[1.0]"])
        .unwrap();
}

fn test_config(dir: &TempDir) -> Config {
    let db_path = dir.path().join("features.db");
    create_feature_db(&db_path);
    Config::default().with_overrides(Some(db_path), Some(dir.path().join("models")))
}

#[test]
fn test_build_and_query() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let report = run_build(&config).unwrap();
    assert_eq!(report.n_songs, 30);
    assert_eq!(report.raw_dim, 8);
    assert_eq!(report.final_dim, 8);
    assert_eq!(report.skipped.malformed, 1);
    assert_eq!(report.skipped.missing_id, 1);

    let engine = QueryEngine::open(&ArtifactStore::new(&config.artifact_dir)).unwrap();
    assert_eq!(engine.manifest().build_id, report.build_id);
    assert_eq!(
        engine.manifest().feature_columns.columns()[1],
        "tempo".to_string()
    );

    let neighbors = engine.similar_to_track("TR0003", 5).unwrap();
    assert_eq!(neighbors.len(), 5);
    assert!(neighbors.iter().all(|n| n.id.as_str() != "TR0003"));
    for pair in neighbors.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_artifact_dir_layout() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let report = run_build(&config).unwrap();

    let build_dir: PathBuf = config.artifact_dir.join("builds").join(&report.build_id);
    assert_eq!(report.path, build_dir);
    for file in ["manifest.json", "standardizer.json", "reducer.json", "index.bin"] {
        assert!(build_dir.join(file).is_file(), "missing {file}");
    }
    let current = std::fs::read_to_string(config.artifact_dir.join("CURRENT")).unwrap();
    assert_eq!(current.trim(), report.build_id);
}

/// Test that the pipeline can be built, run, and leaves a live build
#[tokio::test]
async fn test_workflow_publishes_a_build() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let workflow = build_pipeline(&config).unwrap();
    let state_path = temp_dir.path().join("pipeline.db");
    let mut state = treadle::SqliteStateStore::open(&state_path).await.unwrap();

    let job = BuildJob::new();
    assert!(!job.id().is_empty());
    workflow.advance(&job, &mut state).await.unwrap();

    let store = ArtifactStore::new(&config.artifact_dir);
    assert!(store.current_build_id().unwrap().is_some());
    assert!(QueryEngine::open(&store).is_ok());
}

/// The stage publishes where its config points and records the build id.
#[tokio::test]
async fn test_stage_publishes_into_configured_store() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let stage = IndexStage::new(config.clone());

    let mut ctx = StageContext::new("build-index".to_string());
    let outcome = stage.execute(&BuildJob::new(), &mut ctx).await.unwrap();
    assert_eq!(outcome, StageOutcome::Complete);

    let store = ArtifactStore::new(&config.artifact_dir);
    let current = store.current_build_id().unwrap().unwrap();
    assert_eq!(
        ctx.metadata.get("build_id").and_then(|v| v.as_str()),
        Some(current.as_str())
    );
}

#[test]
fn test_pipeline_without_database_fails_early() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::default().with_overrides(None, Some(temp_dir.path().join("models")));
    assert!(build_pipeline(&config).is_err());
    assert!(!temp_dir.path().join("models").exists());
}
