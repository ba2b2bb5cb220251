//! Vector sources: where raw `(track_id, features)` records come from.
//!
//! A source pushes every record it can read into a [`CorpusBuilder`],
//! which validates, skips and counts. Records the source itself cannot
//! decode are reported with [`CorpusBuilder::skip_malformed`].

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use songspace_core::{Corpus, CorpusBuilder};
use std::path::{Path, PathBuf};

use crate::error::{SourceError, SourceResult};

/// Default table holding one feature vector per track.
pub const DEFAULT_FEATURES_TABLE: &str = "song_features";

/// Anything that can feed raw records into a corpus.
pub trait VectorSource {
    /// Short description for log lines.
    fn describe(&self) -> String;

    /// Push every record into `builder`.
    ///
    /// # Errors
    /// Only failures that stop the whole read are errors; bad individual
    /// records are skipped.
    fn load(&mut self, builder: &mut CorpusBuilder) -> SourceResult<()>;
}

/// Read a full corpus from `source`.
///
/// With `expected_dim`, vectors of any other length are skipped.
///
/// # Errors
/// Returns the source's read error, or `CorpusError::Empty` if no record
/// survived validation.
pub fn load_corpus(
    source: &mut dyn VectorSource,
    expected_dim: Option<usize>,
) -> SourceResult<Corpus> {
    log::info!("Loading feature vectors from {}", source.describe());
    let mut builder = match expected_dim {
        Some(dim) => CorpusBuilder::new().with_dim(dim),
        None => CorpusBuilder::new(),
    };
    source.load(&mut builder)?;
    let corpus = builder.finish()?;
    log::info!(
        "Loaded {} tracks of dimension {} ({} skipped)",
        corpus.len(),
        corpus.dim(),
        corpus.skipped().total()
    );
    Ok(corpus)
}

/// In-memory records, for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<(Option<String>, Option<Vec<f64>>)>,
}

impl MemorySource {
    #[must_use]
    pub fn new(records: Vec<(Option<String>, Option<Vec<f64>>)>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl VectorSource for MemorySource {
    fn describe(&self) -> String {
        format!("{} in-memory records", self.records.len())
    }

    fn load(&mut self, builder: &mut CorpusBuilder) -> SourceResult<()> {
        for (id, values) in &self.records {
            builder.push_raw(id.as_deref(), values.clone());
        }
        Ok(())
    }
}

/// A SQLite table with `track_id` and `features` columns.
///
/// `features` holds either a JSON array of numbers or a blob of
/// little-endian `f64` values. The connection is read-only and lives as
/// long as the source.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Connection,
    path: PathBuf,
    table: String,
}

impl SqliteSource {
    /// Open an existing database read-only.
    ///
    /// # Errors
    /// Returns `SourceError::InvalidTable` for a table name that is not a
    /// plain identifier, or `SourceError::Database` if the file cannot be
    /// opened.
    pub fn open(path: impl AsRef<Path>, table: &str) -> SourceResult<Self> {
        let path = path.as_ref();
        check_table_name(table)?;
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table: table.to_string(),
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl VectorSource for SqliteSource {
    fn describe(&self) -> String {
        format!("table {} in {}", self.table, self.path.display())
    }

    fn load(&mut self, builder: &mut CorpusBuilder) -> SourceResult<()> {
        let sql = format!("SELECT track_id, features FROM \"{}\"", self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut row_number = 0usize;
        while let Some(row) = rows.next()? {
            row_number += 1;
            let id = match row.get::<_, Value>(0)? {
                Value::Null => None,
                Value::Text(text) => Some(text),
                Value::Integer(n) => Some(n.to_string()),
                _ => {
                    builder.skip_malformed(&format!("row {row_number}"));
                    continue;
                }
            };
            let features = match row.get::<_, Value>(1)? {
                Value::Null => None,
                Value::Text(text) => match serde_json::from_str::<Vec<f64>>(&text) {
                    Ok(values) => Some(values),
                    Err(e) => {
                        log::debug!("Row {row_number}: features are not a JSON array: {e}");
                        builder.skip_malformed(&format!("row {row_number}"));
                        continue;
                    }
                },
                Value::Blob(bytes) => match decode_blob(&bytes) {
                    Ok(values) => Some(values),
                    Err(e) => {
                        log::debug!("Row {row_number}: {e}");
                        builder.skip_malformed(&format!("row {row_number}"));
                        continue;
                    }
                },
                _ => {
                    builder.skip_malformed(&format!("row {row_number}"));
                    continue;
                }
            };
            builder.push_raw(id.as_deref(), features);
        }
        log::debug!("Read {row_number} rows from {}", self.table);
        Ok(())
    }
}

/// Decode a blob of little-endian `f64` values.
///
/// # Errors
/// Returns `songspace_core::Error::InvalidData` if the length is not a
/// multiple of eight bytes.
pub fn decode_blob(bytes: &[u8]) -> songspace_core::Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(songspace_core::Error::InvalidData(format!(
            "feature blob of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Encode values in the blob layout [`decode_blob`] reads.
#[must_use]
pub fn encode_blob(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Table names are spliced into SQL, so only plain identifiers pass.
fn check_table_name(table: &str) -> SourceResult<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SourceError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songspace_core::{CorpusError, SkipReport};
    use tempfile::TempDir;

    fn fixture_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("features.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE song_features (track_id TEXT, features)",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO song_features (track_id, features) VALUES (?1, ?2)";
        conn.execute(insert, rusqlite::params!["TRA", "[1.0, 2.0, 3.0]"])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRB", encode_blob(&[4.0, 5.0, 6.5])])
            .unwrap();
        conn.execute(insert, rusqlite::params![None::<String>, "[1.0, 1.0, 1.0]"])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRC", None::<String>])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRD", "not json"])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRE", vec![1u8, 2, 3]])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRF", "[1.0, 2.0]"])
            .unwrap();
        conn.execute(insert, rusqlite::params!["TRA", "[9.0, 9.0, 9.0]"])
            .unwrap();
        path
    }

    #[test]
    fn test_sqlite_source_skips_and_counts_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = fixture_db(&dir);

        let mut source = SqliteSource::open(&path, DEFAULT_FEATURES_TABLE).unwrap();
        let corpus = load_corpus(&mut source, None).unwrap();

        let ids: Vec<&str> = corpus.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["TRA", "TRB"]);
        assert_eq!(corpus.dim(), 3);
        // First occurrence of a duplicate id wins.
        assert_eq!(corpus.vectors().next().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(corpus.vectors().nth(1).unwrap(), &[4.0, 5.0, 6.5]);

        let skipped = corpus.skipped();
        assert_eq!(skipped.missing_id, 1);
        assert_eq!(skipped.missing_vector, 1);
        assert_eq!(skipped.malformed, 2);
        assert_eq!(skipped.dimension_mismatch, 1);
        assert_eq!(skipped.duplicate_id, 1);
        assert_eq!(skipped.total(), 6);
    }

    #[test]
    fn test_expected_dimension_is_enforced() {
        let dir = TempDir::new().unwrap();
        let path = fixture_db(&dir);

        let mut source = SqliteSource::open(&path, DEFAULT_FEATURES_TABLE).unwrap();
        let corpus = load_corpus(&mut source, Some(2)).unwrap();
        let ids: Vec<&str> = corpus.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["TRF"]);
    }

    #[test]
    fn test_invalid_table_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = fixture_db(&dir);
        for bad in ["", "1table", "songs; DROP TABLE x", "a\"b", "song-features"] {
            assert!(matches!(
                SqliteSource::open(&path, bad),
                Err(SourceError::InvalidTable(_))
            ));
        }
        assert!(SqliteSource::open(&path, "_songs2").is_ok());
    }

    #[test]
    fn test_missing_table_is_a_database_error() {
        let dir = TempDir::new().unwrap();
        let path = fixture_db(&dir);
        let mut source = SqliteSource::open(&path, "nope").unwrap();
        let mut builder = CorpusBuilder::new();
        assert!(matches!(
            source.load(&mut builder),
            Err(SourceError::Database(_))
        ));
    }

    #[test]
    fn test_missing_database_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        assert!(SqliteSource::open(dir.path().join("absent.db"), "song_features").is_err());
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemorySource::new(vec![
            (Some("a".to_string()), Some(vec![1.0, 0.0])),
            (Some("  ".to_string()), Some(vec![1.0, 0.0])),
            (Some("b".to_string()), Some(vec![f64::NAN, 0.0])),
            (Some("c".to_string()), Some(vec![0.0, 1.0])),
        ]);
        assert_eq!(source.len(), 4);
        let corpus = load_corpus(&mut source, None).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.skipped().invalid_id, 1);
        assert_eq!(corpus.skipped().non_finite, 1);
    }

    #[test]
    fn test_nothing_valid_is_an_empty_corpus() {
        let mut source = MemorySource::new(vec![(None, Some(vec![1.0]))]);
        let err = load_corpus(&mut source, None).unwrap_err();
        match err {
            SourceError::Core(songspace_core::Error::Corpus(CorpusError::Empty { skipped })) => {
                assert_eq!(skipped.missing_id, 1);
                assert_ne!(skipped, SkipReport::default());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blob_decoding() {
        assert_eq!(decode_blob(&encode_blob(&[1.5, -2.0])).unwrap(), vec![1.5, -2.0]);
        assert!(decode_blob(&[0u8; 7]).is_err());
        assert!(decode_blob(&[]).unwrap().is_empty());
    }
}
