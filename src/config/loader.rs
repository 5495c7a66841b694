//! YAML experiment loading

use super::schema::FinetuneSpec;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Load and validate a fine-tuning YAML file
///
/// Only values are validated here; file existence is checked by
/// [`validate_paths`](super::validate_paths) before a run starts.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<FinetuneSpec> {
    let path = config_path.as_ref();
    let yaml_content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let spec: FinetuneSpec = serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config {}: {e}", path.display())))?;

    validate_config(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;

    Ok(spec)
}
