use crate::config::schema::{OptionSchema, validate_types};
use crate::error::{ConfigError, ConfigResult};
use log::{debug, trace};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// File holding the option schema.
pub const NODE_JSON: &str = "node.json";
/// File holding the raw configuration document.
pub const CONFIG_JSON: &str = "config.json";

#[derive(Debug, Deserialize)]
struct NodeDescriptor {
    #[serde(default)]
    options: Option<Vec<OptionSchema>>,
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_owned(), source })
}

/// Read the `options` list from `node.json` inside `dir`.
///
/// Every type name is resolved here; a schema using an unknown type is
/// rejected as a whole.
pub fn load_schema(dir: impl AsRef<Path>) -> ConfigResult<Vec<OptionSchema>> {
    let path = dir.as_ref().join(NODE_JSON);
    debug!("Loading option schema from: {}", path.display());
    let content = read(&path)?;
    let descriptor: NodeDescriptor =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
    let options = descriptor.options.ok_or(ConfigError::MissingOptions { path })?;
    validate_types(&options)?;
    trace!("Loaded {} schema entries", options.len());
    Ok(options)
}

/// Read the raw configuration document from `config.json` inside `dir`.
pub fn load_config(dir: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = dir.as_ref().join(CONFIG_JSON);
    debug!("Loading config from: {}", path.display());
    let content = read(&path)?;
    let config: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
    trace!("Loaded config: {:#}", config);
    Ok(config)
}
