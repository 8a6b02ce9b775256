use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, coercing or reading node configuration.
///
/// Every variant is fatal for the update that produced it: the store keeps
/// its previously committed tree and hands the error back to the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} has no top level 'options' list", path.display())]
    MissingOptions { path: PathBuf },
    #[error("unknown option type '{0}'")]
    UnknownType(String),
    #[error("option '{path}' is declared in the schema but missing from the config")]
    MissingOption { path: String },
    #[error("list option '{path}' is not a list in the config")]
    NotAList { path: String },
    #[error("no such config option '{0}'")]
    UnknownKey(String),
}

/// Errors raised while reading the node environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {0} is empty")]
    Empty(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
