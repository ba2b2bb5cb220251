//! Atomic on-disk storage for artifact sets.
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                       name of the live build
//! builds/<build_id>/manifest.json
//! builds/<build_id>/standardizer.json
//! builds/<build_id>/reducer.json     (only when reduction is enabled)
//! builds/<build_id>/index.bin
//! .staging-<build_id>/          in-progress publish
//! ```
//!
//! A publish writes and fsyncs every file into a staging directory,
//! renames it into `builds/`, then swaps `CURRENT` with a rename. Readers
//! resolve `CURRENT` first, so they see either the old set or the new
//! one. An interrupted publish only leaves staging debris behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EmbedResult, PersistenceError};
use crate::format::{decode_index, encode_index};
use crate::manifest::{Manifest, MANIFEST_SCHEMA_VERSION};
use crate::pipeline::ArtifactSet;
use crate::reduce::{ReductionBasis, REDUCER_SCHEMA_VERSION};
use crate::standardize::{StandardizationParams, STANDARDIZER_SCHEMA_VERSION};

pub const CURRENT_FILE: &str = "CURRENT";
pub const BUILDS_DIR: &str = "builds";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const STANDARDIZER_FILE: &str = "standardizer.json";
pub const REDUCER_FILE: &str = "reducer.json";
pub const INDEX_FILE: &str = "index.bin";
const STAGING_PREFIX: &str = ".staging-";

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishedBuild {
    pub build_id: String,
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// A directory holding versioned artifact sets and a pointer to the live one.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn builds_dir(&self) -> PathBuf {
        self.root.join(BUILDS_DIR)
    }

    /// Directory of a published build.
    #[must_use]
    pub fn build_path(&self, build_id: &str) -> PathBuf {
        self.builds_dir().join(build_id)
    }

    /// Write `artifacts` as a new build and make it the live one.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the set is inconsistent or any write
    /// fails. On failure the previously published build stays live.
    pub fn publish(&self, artifacts: &ArtifactSet) -> EmbedResult<PublishedBuild> {
        artifacts.validate()?;
        let build_id = artifacts.manifest.build_id.clone();
        check_build_id(&build_id)?;

        let builds = self.builds_dir();
        fs::create_dir_all(&builds).map_err(|e| PersistenceError::io(&builds, e))?;
        self.clean_staging()?;

        let final_dir = self.build_path(&build_id);
        if final_dir.exists() {
            return Err(PersistenceError::Inconsistent(format!(
                "build {build_id} is already published"
            ))
            .into());
        }

        let staging = self.root.join(format!("{STAGING_PREFIX}{build_id}"));
        fs::create_dir_all(&staging).map_err(|e| PersistenceError::io(&staging, e))?;

        let mut files = BTreeMap::new();
        let bytes = to_json("standardizer", &artifacts.standardizer)?;
        files.insert(
            STANDARDIZER_FILE.to_string(),
            write_synced(&staging.join(STANDARDIZER_FILE), &bytes)?,
        );
        if let Some(reducer) = &artifacts.reducer {
            let bytes = to_json("reducer", reducer)?;
            files.insert(
                REDUCER_FILE.to_string(),
                write_synced(&staging.join(REDUCER_FILE), &bytes)?,
            );
        }
        let bytes = encode_index(&artifacts.index);
        files.insert(
            INDEX_FILE.to_string(),
            write_synced(&staging.join(INDEX_FILE), &bytes)?,
        );

        let mut manifest = artifacts.manifest.clone();
        manifest.files = files;
        let bytes = to_json("manifest", &manifest)?;
        write_synced(&staging.join(MANIFEST_FILE), &bytes)?;
        sync_dir(&staging)?;

        fs::rename(&staging, &final_dir).map_err(|e| PersistenceError::io(&final_dir, e))?;
        sync_dir(&builds)?;

        let pointer_tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        write_synced(&pointer_tmp, build_id.as_bytes())?;
        let pointer = self.root.join(CURRENT_FILE);
        fs::rename(&pointer_tmp, &pointer).map_err(|e| PersistenceError::io(&pointer, e))?;
        sync_dir(&self.root)?;

        log::info!(
            "Published build {build_id} ({} tracks, {} -> {} dims) to {}",
            manifest.n_songs,
            manifest.raw_dim,
            manifest.final_dim,
            final_dir.display()
        );

        Ok(PublishedBuild {
            build_id,
            path: final_dir,
            manifest,
        })
    }

    /// Id of the live build, if any has been published.
    ///
    /// # Errors
    /// Returns `PersistenceError::Io` if the pointer exists but is unreadable.
    pub fn current_build_id(&self) -> EmbedResult<Option<String>> {
        let pointer = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&pointer) {
            Ok(text) => {
                let id = text.trim().to_string();
                check_build_id(&id)?;
                Ok(Some(id))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(pointer, e).into()),
        }
    }

    /// Load the live build.
    ///
    /// # Errors
    /// Returns `PersistenceError::NoCurrentBuild` when nothing is published,
    /// or any error from [`ArtifactStore::load_build`].
    pub fn load_current(&self) -> EmbedResult<ArtifactSet> {
        let Some(build_id) = self.current_build_id()? else {
            return Err(PersistenceError::NoCurrentBuild(self.root.clone()).into());
        };
        self.load_build(&build_id)
    }

    /// Load and verify one published build.
    ///
    /// Every artifact the manifest requires must be present and match its
    /// recorded checksum, and the pieces must agree on their dimensions.
    ///
    /// # Errors
    /// Returns a `PersistenceError` rather than a partial set.
    pub fn load_build(&self, build_id: &str) -> EmbedResult<ArtifactSet> {
        check_build_id(build_id)?;
        let dir = self.build_path(build_id);

        let manifest: Manifest = from_json("manifest", &read_artifact(&dir.join(MANIFEST_FILE))?)?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                artifact: "manifest",
                found: manifest.schema_version,
                expected: MANIFEST_SCHEMA_VERSION,
            }
            .into());
        }
        if manifest.build_id != build_id {
            return Err(PersistenceError::Inconsistent(format!(
                "directory {build_id} holds manifest for build {}",
                manifest.build_id
            ))
            .into());
        }

        let standardizer: StandardizationParams = from_json(
            "standardizer",
            &read_verified(&dir, STANDARDIZER_FILE, &manifest)?,
        )?;
        if standardizer.schema_version != STANDARDIZER_SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                artifact: "standardizer",
                found: standardizer.schema_version,
                expected: STANDARDIZER_SCHEMA_VERSION,
            }
            .into());
        }

        let reducer = if manifest.use_reduction {
            let basis: ReductionBasis =
                from_json("reducer", &read_verified(&dir, REDUCER_FILE, &manifest)?)?;
            if basis.schema_version != REDUCER_SCHEMA_VERSION {
                return Err(PersistenceError::UnsupportedVersion {
                    artifact: "reducer",
                    found: basis.schema_version,
                    expected: REDUCER_SCHEMA_VERSION,
                }
                .into());
            }
            Some(basis)
        } else {
            None
        };

        let index = decode_index(&read_verified(&dir, INDEX_FILE, &manifest)?)?;

        let artifacts = ArtifactSet {
            manifest,
            standardizer,
            reducer,
            index,
        };
        artifacts.validate()?;
        log::debug!("Loaded build {build_id} from {}", dir.display());
        Ok(artifacts)
    }

    /// Published build ids, oldest first.
    ///
    /// # Errors
    /// Returns `PersistenceError::Io` if the builds directory is unreadable.
    pub fn list_builds(&self) -> EmbedResult<Vec<String>> {
        let builds = self.builds_dir();
        let entries = match fs::read_dir(&builds) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(builds, e).into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&builds, e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete all but the newest `keep` builds. The live build is never
    /// removed. Returns the removed ids.
    ///
    /// # Errors
    /// Returns `PersistenceError::Io` if a build cannot be removed.
    pub fn prune(&self, keep: usize) -> EmbedResult<Vec<String>> {
        let current = self.current_build_id()?;
        let builds = self.list_builds()?;
        let cutoff = builds.len().saturating_sub(keep);
        let mut removed = Vec::new();
        for id in builds.into_iter().take(cutoff) {
            if current.as_deref() == Some(id.as_str()) {
                continue;
            }
            let path = self.build_path(&id);
            fs::remove_dir_all(&path).map_err(|e| PersistenceError::io(&path, e))?;
            log::info!("Pruned build {id}");
            removed.push(id);
        }
        Ok(removed)
    }

    /// Remove leftovers of interrupted publishes.
    fn clean_staging(&self) -> EmbedResult<()> {
        let entries = fs::read_dir(&self.root).map_err(|e| PersistenceError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.root, e))?;
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if is_staging {
                let path = entry.path();
                log::warn!("Removing interrupted publish at {}", path.display());
                fs::remove_dir_all(&path).map_err(|e| PersistenceError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

/// Build ids become directory names; keep them to one path component.
fn check_build_id(id: &str) -> Result<(), PersistenceError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::Inconsistent(format!("invalid build id {id:?}")))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<String, PersistenceError> {
    let mut file = File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| PersistenceError::io(path, e))?;
    Ok(sha256_hex(bytes))
}

fn sync_dir(path: &Path) -> Result<(), PersistenceError> {
    #[cfg(unix)]
    {
        File::open(path)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| PersistenceError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, PersistenceError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PersistenceError::MissingArtifact(path.to_path_buf()))
        }
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

fn read_verified(dir: &Path, name: &str, manifest: &Manifest) -> Result<Vec<u8>, PersistenceError> {
    let path = dir.join(name);
    let Some(expected) = manifest.files.get(name) else {
        return Err(PersistenceError::Inconsistent(format!(
            "manifest has no checksum for {name}"
        )));
    };
    let bytes = read_artifact(&path)?;
    let actual = sha256_hex(&bytes);
    if &actual != expected {
        return Err(PersistenceError::ChecksumMismatch {
            file: name.to_string(),
            expected: expected.clone(),
            actual,
        });
    }
    Ok(bytes)
}

fn to_json<T: Serialize>(artifact: &'static str, value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json { artifact, source })
}

fn from_json<T: DeserializeOwned>(
    artifact: &'static str,
    bytes: &[u8],
) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|source| PersistenceError::Json { artifact, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbedError;
    use crate::pipeline::{fit, BuildOptions};
    use songspace_core::Corpus;
    use tempfile::TempDir;

    fn sample_artifacts(use_reduction: bool) -> ArtifactSet {
        let corpus = Corpus::from_pairs(vec![
            ("TRA", vec![210.0, 120.0, -7.0, 0.6]),
            ("TRB", vec![180.0, 95.0, -12.0, 0.4]),
            ("TRC", vec![305.0, 140.0, -4.5, 0.8]),
            ("TRD", vec![240.0, 88.0, -9.0, 0.5]),
            ("TRE", vec![199.0, 101.0, -6.0, 0.7]),
        ])
        .unwrap();
        let options = BuildOptions {
            use_reduction,
            reduction_components: 3,
            feature_columns: None,
        };
        fit(&corpus, &options).unwrap()
    }

    #[test]
    fn test_publish_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        for use_reduction in [true, false] {
            let artifacts = sample_artifacts(use_reduction);
            let published = store.publish(&artifacts).unwrap();
            let loaded = store.load_current().unwrap();

            assert_eq!(loaded.manifest.build_id, published.build_id);
            assert_eq!(loaded.standardizer, artifacts.standardizer);
            assert_eq!(loaded.reducer, artifacts.reducer);
            assert_eq!(loaded.index, artifacts.index);
            assert_eq!(
                published.path.join(REDUCER_FILE).exists(),
                use_reduction
            );
        }
    }

    #[test]
    fn test_load_without_publish() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        assert!(matches!(
            store.load_current(),
            Err(EmbedError::Persistence(PersistenceError::NoCurrentBuild(_)))
        ));
    }

    #[test]
    fn test_missing_artifact_refuses_to_load() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let published = store.publish(&sample_artifacts(true)).unwrap();
        fs::remove_file(published.path.join(REDUCER_FILE)).unwrap();
        assert!(matches!(
            store.load_current(),
            Err(EmbedError::Persistence(PersistenceError::MissingArtifact(_)))
        ));
    }

    #[test]
    fn test_corrupt_artifact_refuses_to_load() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let published = store.publish(&sample_artifacts(false)).unwrap();
        let path = published.path.join(INDEX_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            store.load_current(),
            Err(EmbedError::Persistence(PersistenceError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn test_interrupted_publish_is_invisible_and_cleaned() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let first = store.publish(&sample_artifacts(true)).unwrap();

        let debris = temp.path().join(".staging-20990101T000000.000Z-deadbeef");
        fs::create_dir_all(&debris).unwrap();
        fs::write(debris.join(INDEX_FILE), b"half written").unwrap();

        assert_eq!(
            store.load_current().unwrap().manifest.build_id,
            first.build_id
        );

        let second = store.publish(&sample_artifacts(true)).unwrap();
        assert!(!debris.exists());
        assert_eq!(
            store.load_current().unwrap().manifest.build_id,
            second.build_id
        );
    }

    #[test]
    fn test_republishing_same_build_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let artifacts = sample_artifacts(true);
        store.publish(&artifacts).unwrap();
        assert!(store.publish(&artifacts).is_err());
    }

    #[test]
    fn test_prune_keeps_newest_and_current() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let mut published = Vec::new();
        for i in 0..4 {
            let mut artifacts = sample_artifacts(false);
            artifacts.manifest.build_id = format!("20260101T00000{i}.000Z-0000000{i}");
            published.push(store.publish(&artifacts).unwrap().build_id);
        }
        // Point CURRENT back at the oldest build.
        fs::write(temp.path().join(CURRENT_FILE), &published[0]).unwrap();

        let removed = store.prune(1).unwrap();
        assert_eq!(removed, vec![published[1].clone(), published[2].clone()]);
        assert_eq!(
            store.list_builds().unwrap(),
            vec![published[0].clone(), published[3].clone()]
        );
        assert!(store.load_current().is_ok());
    }

    #[test]
    fn test_build_id_validation() {
        assert!(check_build_id("20260101T000000Z-abcd").is_ok());
        assert!(check_build_id("../escape").is_err());
        assert!(check_build_id("").is_err());
        assert!(check_build_id("a/b").is_err());
    }
}
