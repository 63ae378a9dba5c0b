//! Configuration loading

use anyhow::{Context, Result};
use std::path::Path;

use crate::Config;

/// Load and validate configuration
///
/// Config file search order:
/// 1. `explicit_path` (from `--config` or `CUEPOINT_CONFIG_PATH`)
/// 2. ./config.yaml (current working directory)
/// 3. Fall back to environment variables only
///
/// Logging is not initialized yet, so progress goes to stderr.
pub fn load_config(explicit_path: Option<&str>) -> Result<Config> {
    let config = match explicit_path {
        Some(path) => {
            if !Path::new(path).exists() {
                anyhow::bail!("Config file {path} does not exist");
            }
            eprintln!("Loading config from {path}");
            Config::from_file(path).with_context(|| format!("Failed to load {path}"))?
        }
        None if Path::new("config.yaml").exists() => {
            eprintln!("Loading config from config.yaml");
            Config::from_file("config.yaml").unwrap_or_else(|e| {
                eprintln!("Failed to load config.yaml: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            })
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().unwrap_or_else(|e| {
                eprintln!("Failed to load config: {e}");
                eprintln!("Using default configuration");
                Config::default()
            })
        }
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_explicit_path_fails() {
        assert!(load_config(Some("/definitely/not/here.yaml")).is_err());
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "logging:\n  format: xml\n").unwrap();

        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  port: 9300\n").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9300);
    }
}
