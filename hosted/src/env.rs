use crate::error::EnvError;
use std::path::PathBuf;

/// Identity of this node, prefixed to every peer message.
pub const NODE_VAR: &str = "NODE";
/// Directory shared between nodes for cached artifacts.
pub const SCRATCH_VAR: &str = "SCRATCH";
/// Overrides the path of the device daemon socket.
pub const SYNCER_SOCKET_VAR: &str = "SYNCER_SOCKET";
pub const DEFAULT_SYNCER_SOCKET: &str = "/tmp/syncer";

/// Everything the supervisor hands to a node through its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEnvironment {
    pub node: String,
    pub scratch: PathBuf,
    pub syncer_socket: PathBuf,
    /// Directory holding node.json and config.json.
    pub node_dir: PathBuf,
}

impl NodeEnvironment {
    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvError> {
        let node = required(&lookup, NODE_VAR)?;
        let scratch = PathBuf::from(required(&lookup, SCRATCH_VAR)?);
        Ok(Self { node, scratch, syncer_socket: syncer_socket_from(&lookup), node_dir: PathBuf::from(".") })
    }

    pub fn with_node_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.node_dir = dir.into();
        self
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, EnvError> {
    let value = lookup(key).ok_or(EnvError::Missing(key))?;
    if value.trim().is_empty() {
        return Err(EnvError::Empty(key));
    }
    Ok(value)
}

/// Socket path of the device daemon, honouring `SYNCER_SOCKET`.
pub fn syncer_socket_from(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(SYNCER_SOCKET_VAR).filter(|path| !path.trim().is_empty()).unwrap_or_else(|| DEFAULT_SYNCER_SOCKET.to_string()).into()
}
