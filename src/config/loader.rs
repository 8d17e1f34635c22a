use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::ConfigFile;

/// Loads a configuration file from the provided path or default locations.
///
/// # Errors
///
/// Returns an error when the config file cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = path {
        let path = PathBuf::from(path);
        return Ok(Some(load_config_file(&path)?));
    }

    let toml_path = PathBuf::from("hailstorm.toml");
    if toml_path.exists() {
        return Ok(Some(load_config_file(&toml_path)?));
    }

    let json_path = PathBuf::from("hailstorm.json");
    if json_path.exists() {
        return Ok(Some(load_config_file(&json_path)?));
    }

    Ok(None)
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        source: err,
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            source: std::io::Error::other(err),
        }),
        Some("json") => serde_json::from_str(&content).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            source: std::io::Error::other(err),
        }),
        Some(extension) => Err(ConfigError::UnsupportedExtension {
            extension: extension.to_owned(),
        }),
        None => Err(ConfigError::MissingExtension),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_config_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hailstorm.toml");
        std::fs::write(
            &path,
            r#"
project_code = "shop"
master_slave_mode = true

[jmeter]
version = "5.6.3"

[[clusters]]
type = "data_center"
user_name = "hailstorm"
ssh_identity = "insecure"
machines = ["172.16.0.10", "172.16.0.11"]
title = "rack-1"

[[target_hosts]]
host_name = "db.internal"
role_name = "database"
"#,
        )
        .expect("write config");

        let config = load_config_file(&path).expect("parse config");
        assert_eq!(config.project_code, "shop");
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.target_hosts[0].monitor_type(), "nmon");
        assert_eq!(config.target_hosts[0].sampling_interval(), 10);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hailstorm.yaml");
        std::fs::write(&path, "project_code: shop").expect("write config");
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::UnsupportedExtension { .. })
        ));
    }
}
