use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "songspace", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the SQLite feature database (overrides SONGSPACE_DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Artifact store directory (default: ~/.local/share/songspace/models)
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Fit the embedding pipeline and publish a new index
    ///
    /// Reads every `(track_id, features)` row from the configured table,
    /// standardizes each feature column, optionally projects onto the top
    /// principal components, normalizes to unit length, and builds an
    /// exact cosine index.
    ///
    /// Rows with a missing id, missing or non-numeric features, a wrong
    /// number of values, or a duplicate id are skipped and counted. The
    /// build fails only if nothing usable remains.
    ///
    /// The new artifact set is written to a staging directory and switched
    /// live in one step; queries keep using the previous build until then.
    Build {
        /// Index standardized features directly, without PCA
        #[arg(long)]
        no_reduction: bool,

        /// Requested principal components (clamped to the feature count)
        #[arg(long)]
        components: Option<usize>,
    },
    /// Find tracks similar to a raw feature vector
    Query {
        /// Comma-separated raw feature values, in feature-column order
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vector: Vec<f64>,

        /// Number of results
        #[arg(short, default_value_t = 10, allow_negative_numbers = true)]
        k: i64,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find tracks similar to an indexed track
    Similar {
        /// Track id as stored in the feature table
        track_id: String,

        /// Number of results
        #[arg(short, default_value_t = 10, allow_negative_numbers = true)]
        k: i64,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the live build's manifest and the builds on disk
    Inspect {
        /// Inspect this build instead of the live one
        #[arg(long)]
        build: Option<String>,

        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print one value, or the whole config file
    Get {
        /// Key to print
        key: Option<String>,
    },
    /// Set a value in the config file
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Get { key } => commands::config::get_config(key),
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
        };
    }

    let config = songspace_etl::Config::load()?.with_overrides(cli.db, cli.artifacts);

    match cli.command {
        Commands::Build {
            no_reduction,
            components,
        } => {
            let mut config = config;
            if no_reduction {
                config.use_reduction = false;
            }
            if let Some(components) = components {
                config.reduction_components = components;
            }
            commands::run_build(config).await?;
        }
        Commands::Query { vector, k, json } => {
            commands::run_query(&config, &vector, k, json)?;
        }
        Commands::Similar { track_id, k, json } => {
            commands::run_similar(&config, &track_id, k, json)?;
        }
        Commands::Inspect { build, json } => {
            commands::show_inspect(&config, build.as_deref(), json)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_vector_parsing() {
        let cli = Cli::try_parse_from([
            "songspace", "query", "--vector", "1.5,-2,3e2", "-k", "5", "--db", "/tmp/f.db",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/f.db")));
        match cli.command {
            Commands::Query { vector, k, json } => {
                assert_eq!(vector, vec![1.5, -2.0, 300.0]);
                assert_eq!(k, 5);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_negative_k_reaches_the_command() {
        let cli = Cli::try_parse_from(["songspace", "similar", "TR0001", "-k", "-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Similar { k: -1, .. }));
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["songspace", "config", "set", "keep_builds", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }
}
