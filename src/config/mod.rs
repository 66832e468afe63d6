pub mod builder;
pub mod defaults;
pub mod merge;
pub mod types;


pub use builder::ConfigBuilder;
pub use types::*;

use crate::error::SyncError;
use anyhow::{Context, Result};
use std::path::Path;

/// Main configuration loading function
///
/// A missing file yields an empty input; the caller decides whether that is
/// acceptable.
pub fn load_config(config_file: &str) -> Result<(ConfigInput, std::path::PathBuf)> {
    let config_dir = Path::new(config_file)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config_input = if Path::new(config_file).exists() {
        let contents = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read {}", config_file))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SyncError::user(format!("Invalid configuration {}: {}", config_file, e)))?
    } else {
        ConfigInput::default()
    };

    Ok((config_input, config_dir))
}
