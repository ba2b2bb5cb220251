use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Deserializer, Serialize};
use songspace_core::FeatureSchema;
use songspace_embed::pipeline::DEFAULT_REDUCTION_COMPONENTS;
use songspace_embed::BuildOptions;
use std::path::PathBuf;

use crate::error::{SourceError, SourceResult};
use crate::source::DEFAULT_FEATURES_TABLE;

/// Configuration for songspace.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SONGSPACE_* prefix)
/// 3. Config file (~/.config/songspace/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the feature table. No default: a build
    /// refuses to start without one.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/features.db
    /// - ENV: SONGSPACE_DATABASE_PATH
    /// - Config: database_path = "/path/to/features.db"
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Table with `track_id` and `features` columns.
    #[serde(default = "default_features_table")]
    pub features_table: String,

    /// Root of the artifact store.
    ///
    /// Can be set via:
    /// - CLI: --artifacts /path/to/models
    /// - ENV: SONGSPACE_ARTIFACT_DIR
    /// - Default: ~/.local/share/songspace/models
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Project onto principal components before indexing.
    #[serde(default = "default_use_reduction", deserialize_with = "flexible_bool")]
    pub use_reduction: bool,

    /// Requested number of principal components, clamped to the raw dimension.
    #[serde(
        default = "default_reduction_components",
        deserialize_with = "flexible_usize"
    )]
    pub reduction_components: usize,

    /// Names of the raw feature columns, in vector order.
    #[serde(
        default = "default_feature_columns",
        deserialize_with = "flexible_list"
    )]
    pub feature_columns: Vec<String>,

    /// Newest published builds kept on disk. The live build is never removed.
    #[serde(default = "default_keep_builds", deserialize_with = "flexible_usize")]
    pub keep_builds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            features_table: default_features_table(),
            artifact_dir: default_artifact_dir(),
            use_reduction: default_use_reduction(),
            reduction_components: default_reduction_components(),
            feature_columns: default_feature_columns(),
            keep_builds: default_keep_builds(),
        }
    }
}

/// Where a build reads its vectors from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub database_path: PathBuf,
    pub table: String,
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/songspace/config.toml
    /// Reads environment variables with SONGSPACE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("songspace");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?;

        Ok(config)
    }

    /// Apply CLI overrides on top of a loaded configuration.
    #[must_use]
    pub fn with_overrides(
        mut self,
        database_path: Option<PathBuf>,
        artifact_dir: Option<PathBuf>,
    ) -> Self {
        if database_path.is_some() {
            self.database_path = database_path;
        }
        if let Some(dir) = artifact_dir {
            self.artifact_dir = dir;
        }
        self
    }

    /// The vector source a build should read.
    ///
    /// # Errors
    /// Returns `SourceError::Configuration` when no database is configured.
    pub fn source_config(&self) -> SourceResult<SourceConfig> {
        let Some(database_path) = self.database_path.clone() else {
            return Err(SourceError::Configuration(
                "no database configured; pass --db or set SONGSPACE_DATABASE_PATH".to_string(),
            ));
        };
        if self.features_table.trim().is_empty() {
            return Err(SourceError::Configuration(
                "features_table must not be empty".to_string(),
            ));
        }
        Ok(SourceConfig {
            database_path,
            table: self.features_table.clone(),
        })
    }

    /// Fit parameters for a build.
    ///
    /// An empty `feature_columns` list names columns by position.
    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            use_reduction: self.use_reduction,
            reduction_components: self.reduction_components,
            feature_columns: (!self.feature_columns.is_empty())
                .then(|| FeatureSchema::new(self.feature_columns.clone())),
        }
    }

    /// Raw dimension implied by `feature_columns`, if any are named.
    #[must_use]
    pub fn expected_dim(&self) -> Option<usize> {
        (!self.feature_columns.is_empty()).then_some(self.feature_columns.len())
    }
}

fn default_features_table() -> String {
    DEFAULT_FEATURES_TABLE.to_string()
}

/// Get the default artifact directory.
///
/// Returns: ~/.local/share/songspace/models (or platform equivalent)
fn default_artifact_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songspace")
        .join("models")
}

const fn default_use_reduction() -> bool {
    true
}

const fn default_reduction_components() -> usize {
    DEFAULT_REDUCTION_COMPONENTS
}

fn default_feature_columns() -> Vec<String> {
    FeatureSchema::default().columns().to_vec()
}

const fn default_keep_builds() -> usize {
    3
}

/// Environment values arrive as strings; accept both forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flexible<T> {
    Typed(T),
    Text(String),
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Flexible::<bool>::deserialize(deserializer)? {
        Flexible::Typed(value) => Ok(value),
        Flexible::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(serde::de::Error::custom(format!("not a boolean: {other:?}"))),
        },
    }
}

fn flexible_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    match Flexible::<usize>::deserialize(deserializer)? {
        Flexible::Typed(value) => Ok(value),
        Flexible::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not a count: {text:?}"))),
    }
}

/// A list, or one comma-separated string.
fn flexible_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Flexible::<Vec<String>>::deserialize(deserializer)? {
        Flexible::Typed(list) => list,
        Flexible::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/songspace/config.toml
/// - macOS: ~/Library/Application Support/songspace/config.toml
/// - Windows: %APPDATA%\songspace\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songspace")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Songspace Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SONGSPACE_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# SQLite database holding one feature vector per track
#
# Can also be set via:
# - CLI: songspace --db /custom/path.db build
# - Environment: SONGSPACE_DATABASE_PATH=/custom/path.db
#database_path = "/path/to/features.db"

# Table with a `track_id` column and a `features` column (JSON array or
# little-endian f64 blob)
features_table = "song_features"

# Where published builds are stored
#
# Default: Platform-specific data directory
#artifact_dir = "/path/to/models"

# Reduce dimensionality with PCA before indexing
use_reduction = true

# Requested principal components; clamped to the number of feature columns
reduction_components = 64

# Raw feature columns, in vector order. An empty list names them by position.
feature_columns = [
    "duration",
    "tempo",
    "loudness",
    "key",
    "mode",
    "time_signature",
    "danceability",
    "energy",
]

# Newest builds kept on disk after a build (the live one is always kept)
keep_builds = 3
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.features_table, "song_features");
        assert!(config.artifact_dir.ends_with("models"));
        assert!(config.use_reduction);
        assert_eq!(config.reduction_components, 64);
        assert_eq!(config.feature_columns.len(), 8);
        assert_eq!(config.keep_builds, 3);
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
database_path = "/data/msd.db"
use_reduction = false
feature_columns = []
"#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/data/msd.db")));
        assert!(!config.use_reduction);
        assert_eq!(config.reduction_components, 64);
        assert!(config.build_options().feature_columns.is_none());
        assert_eq!(config.expected_dim(), None);
    }

    #[test]
    fn test_string_values_from_environment_are_accepted() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "use_reduction": "false",
            "reduction_components": "16",
            "keep_builds": "1",
            "feature_columns": "tempo, loudness,energy"
        }))
        .unwrap();
        assert!(!config.use_reduction);
        assert_eq!(config.reduction_components, 16);
        assert_eq!(config.keep_builds, 1);
        assert_eq!(config.feature_columns, vec!["tempo", "loudness", "energy"]);

        let bad = serde_json::from_value::<Config>(serde_json::json!({"use_reduction": "maybe"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_source_config_requires_database() {
        let err = Config::default().source_config().unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
        assert!(err.is_configuration());

        let config = Config::default().with_overrides(Some(PathBuf::from("/tmp/f.db")), None);
        let source = config.source_config().unwrap();
        assert_eq!(source.database_path, PathBuf::from("/tmp/f.db"));
        assert_eq!(source.table, "song_features");
    }

    #[test]
    fn test_overrides() {
        let config = Config::default()
            .with_overrides(None, Some(PathBuf::from("/tmp/models")));
        assert!(config.database_path.is_none());
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/models"));
    }

    #[test]
    fn test_build_options_follow_config() {
        let config = Config {
            reduction_components: 4,
            ..Config::default()
        };
        let options = config.build_options();
        assert!(options.use_reduction);
        assert_eq!(options.reduction_components, 4);
        assert_eq!(options.feature_columns, Some(FeatureSchema::default()));
        assert_eq!(config.expected_dim(), Some(8));
    }
}
