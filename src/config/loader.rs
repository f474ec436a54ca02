use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult, ConfigError};

use super::types::{EngineConfig, ProjectConfig};

/// Read a TOML or JSON file, dispatching on the extension.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_config_file<T>(path: &Path) -> AppResult<T>
where
    T: DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseToml {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some("json") => serde_json::from_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some(ext) => Err(AppError::config(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        })),
        None => Err(AppError::config(ConfigError::MissingExtension)),
    }
}

/// Write `value` as TOML or JSON, dispatching on the extension.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub fn save_config_file<T>(path: &Path, value: &T) -> AppResult<()>
where
    T: Serialize,
{
    let content = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::to_string_pretty(value)
            .map_err(|err| AppError::config(ConfigError::SerializeToml { source: err }))?,
        Some("json") => serde_json::to_string_pretty(value)
            .map_err(|err| AppError::config(ConfigError::Serialize { source: err }))?,
        Some(ext) => {
            return Err(AppError::config(ConfigError::UnsupportedExtension {
                ext: ext.to_owned(),
            }));
        }
        None => return Err(AppError::config(ConfigError::MissingExtension)),
    };
    std::fs::write(path, content).map_err(|err| {
        AppError::config(ConfigError::WriteConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })
}

/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_project(path: &Path) -> AppResult<ProjectConfig> {
    load_config_file(path)
}

/// Load engine settings from `path`, or the defaults when no path is given.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn load_engine_config(path: Option<&Path>) -> AppResult<EngineConfig> {
    path.map_or_else(|| Ok(EngineConfig::default()), load_config_file)
}
