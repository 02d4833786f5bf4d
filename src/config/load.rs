//! Loading and saving distillation configs

use super::schema::DistillSpec;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Parse and validate a YAML distillation config
pub fn parse_config(yaml: &str) -> Result<DistillSpec> {
    let spec: DistillSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

    validate_config(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    Ok(spec)
}

/// Load a distillation config from a YAML file
///
/// # Example
///
/// ```no_run
/// use destila::config::load_config;
///
/// let spec = load_config("distill.yaml")?;
/// println!("{} loss module(s)", spec.losses.len());
/// # Ok::<(), destila::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DistillSpec> {
    let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let spec = parse_config(&yaml)?;
    log::info!(
        "Loaded {} loss module(s) from {}",
        spec.losses.len(),
        path.as_ref().display()
    );
    Ok(spec)
}

/// Write a distillation config as YAML
pub fn save_config<P: AsRef<Path>>(spec: &DistillSpec, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(spec).map_err(|e| Error::Serialization(e.to_string()))?;
    fs::write(path, yaml)?;
    Ok(())
}
