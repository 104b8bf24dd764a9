//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use datasync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, config_path: &Path, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "cache_size": config.cache_size,
                    "database": config.database_path(),
                    "store_dir": config.store_dir(),
                    "config_file": config_path,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:   {}", config.data_dir.display());
            println!("  cache_size: {} bytes", config.cache_size);
            println!();
            println!("Database:    {}", config.database_path().display());
            println!("Blob store:  {}", config.store_dir().display());
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value and write the config file
pub fn set(
    mut config: Config,
    key: String,
    value: String,
    config_path: &Path,
    output: &Output,
) -> Result<()> {
    match key.as_str() {
        "data_dir" => {
            config.data_dir = value.clone().into();
        }
        "cache_size" => {
            config.cache_size = value
                .trim()
                .parse()
                .context("Invalid value for cache_size. Use a size in bytes.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, cache_size",
                key
            );
        }
    }

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_writes_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set(Config::default(), "cache_size".into(), "2048".into(), &path, &output).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("cache_size = 2048"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        assert!(set(Config::default(), "cache_size".into(), "big".into(), &path, &output).is_err());
        assert!(set(Config::default(), "sync_url".into(), "x".into(), &path, &output).is_err());
        assert!(!path.exists());
    }
}
