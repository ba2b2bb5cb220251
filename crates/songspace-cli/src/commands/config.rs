use anyhow::{Context, Result};
use songspace_etl::{config, Config};
use toml_edit::{value, Array, DocumentMut};

const VALID_KEYS: &str = "database_path, features_table, artifact_dir, use_reduction, \
                          reduction_components, feature_columns, keep_builds";

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    for key in VALID_KEYS.split(',').map(str::trim) {
        println!("  {key}: {}", config_value(&config, key)?);
    }

    println!("\nPriority: CLI args > ENV vars (SONGSPACE_*) > Config file > Defaults");

    Ok(())
}

/// Render one setting for display.
fn config_value(config: &Config, key: &str) -> Result<String> {
    Ok(match key {
        "database_path" => config
            .database_path
            .as_ref()
            .map_or_else(|| "<not set>".to_string(), |p| p.display().to_string()),
        "features_table" => config.features_table.clone(),
        "artifact_dir" => config.artifact_dir.display().to_string(),
        "use_reduction" => config.use_reduction.to_string(),
        "reduction_components" => config.reduction_components.to_string(),
        "feature_columns" => config.feature_columns.join(","),
        "keep_builds" => config.keep_builds.to_string(),
        _ => anyhow::bail!("Unknown config key: {key}\n\nValid keys: {VALID_KEYS}"),
    })
}

/// Get a specific config value.
pub fn get_config(key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load()?;
        println!("{}", config_value(&config, &key)?);
    } else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{contents}");
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'songspace config init' to create it.");
        }
    }

    Ok(())
}

/// Set `key` in a TOML document, keeping its comments and layout.
fn apply_setting(contents: &str, key: &str, raw: &str) -> Result<String> {
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Config file is not valid TOML")?;

    let item = match key {
        "database_path" | "features_table" | "artifact_dir" => value(raw),
        "use_reduction" => value(
            raw.parse::<bool>()
                .with_context(|| format!("{key} must be true or false"))?,
        ),
        "reduction_components" | "keep_builds" => {
            let n = raw
                .parse::<u32>()
                .with_context(|| format!("{key} must be a non-negative integer"))?;
            value(i64::from(n))
        }
        "feature_columns" => {
            let mut columns = Array::new();
            for column in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                columns.push(column);
            }
            value(columns)
        }
        _ => anyhow::bail!("Unknown config key: {key}\n\nValid keys: {VALID_KEYS}"),
    };
    doc[key] = item;

    Ok(doc.to_string())
}

/// Set a config value.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    let config_path = config::config_file_path();

    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let updated = apply_setting(&contents, key, value)?;

    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {key} = {value}");
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure songspace.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_preserves_comments() {
        let updated = apply_setting(config::example_config(), "keep_builds", "5").unwrap();
        assert!(updated.contains("keep_builds = 5"));
        assert!(updated.contains("# Songspace Configuration File"));
        assert!(!updated.contains("keep_builds = 3"));
    }

    #[test]
    fn test_set_typed_values() {
        let updated = apply_setting("", "use_reduction", "false").unwrap();
        assert_eq!(updated.trim(), "use_reduction = false");

        let updated = apply_setting("", "feature_columns", "tempo, energy").unwrap();
        assert_eq!(updated.trim(), r#"feature_columns = ["tempo", "energy"]"#);

        let updated = apply_setting("", "database_path", "/data/f.db").unwrap();
        assert_eq!(updated.trim(), r#"database_path = "/data/f.db""#);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        assert!(apply_setting("", "use_reduction", "maybe").is_err());
        assert!(apply_setting("", "keep_builds", "-1").is_err());
        assert!(apply_setting("", "unknown_key", "x").is_err());
        assert!(apply_setting("not = [valid", "keep_builds", "1").is_err());
    }

    #[test]
    fn test_config_values() {
        let config = Config::default();
        assert_eq!(config_value(&config, "database_path").unwrap(), "<not set>");
        assert_eq!(config_value(&config, "use_reduction").unwrap(), "true");
        assert_eq!(config_value(&config, "reduction_components").unwrap(), "64");
        assert!(config_value(&config, "feature_columns")
            .unwrap()
            .starts_with("duration,tempo"));
        assert!(config_value(&config, "nope").is_err());
    }
}
