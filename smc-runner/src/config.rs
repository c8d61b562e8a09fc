//! Strategy configuration loading.
//!
//! A config file is a TOML rendering of `StrategyConfig`. Every section is
//! optional and falls back to the defaults, so a file may override a single
//! field. A top-level `preset = "<name>"` key picks the base configuration
//! that the remaining keys are layered onto.

use std::path::{Path, PathBuf};

use smc_core::{ConfigError, StrategyConfig, StrategyPreset};
use thiserror::Error;

/// Errors from loading a strategy configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("unknown preset '{0}' (expected one of: structure_gap, momentum_blend)")]
    UnknownPreset(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<StrategyConfig, ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&text)?;
    if config.name.is_empty() {
        config.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(config)
}

/// Parse and validate a TOML string.
pub fn parse_config(text: &str) -> Result<StrategyConfig, ConfigLoadError> {
    let mut table: toml::Table = text.parse()?;

    let base = match table.remove("preset") {
        Some(toml::Value::String(name)) => preset(&name)?.config(),
        Some(other) => return Err(ConfigLoadError::UnknownPreset(other.to_string())),
        None => StrategyConfig::default(),
    };

    let config = if table.is_empty() {
        base
    } else {
        // Layer the file onto the base by merging at the table level.
        let mut merged = match toml::Value::try_from(&base)? {
            toml::Value::Table(t) => t,
            _ => toml::Table::new(),
        };
        merge(&mut merged, table);
        toml::Value::Table(merged).try_into()?
    };

    config.validate()?;
    Ok(config)
}

/// Config file wins over preset; with neither, the default preset is used.
pub fn resolve_config(
    path: Option<&Path>,
    preset_name: Option<&str>,
) -> Result<StrategyConfig, ConfigLoadError> {
    match (path, preset_name) {
        (Some(path), _) => load_config(path),
        (None, Some(name)) => Ok(preset(name)?.config()),
        (None, None) => Ok(StrategyPreset::StructureGap.config()),
    }
}

fn preset(name: &str) -> Result<StrategyPreset, ConfigLoadError> {
    StrategyPreset::from_name(name).ok_or_else(|| ConfigLoadError::UnknownPreset(name.to_string()))
}

/// Recursive table merge. Nested tables merge key by key, anything else
/// is replaced.
fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) if key != "weights" => {
                merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
