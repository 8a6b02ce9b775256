//! Runtime bridge between a hosted content node and its supervisor.
//!
//! - [`config`]: typed configuration from `node.json` and `config.json`, with
//!   hot reload and a restart-on-update escape hatch
//! - [`node`]: best effort datagrams to the co-located peer process
//! - [`device`]: self-healing command channel to the device daemon
//! - [`context`]: explicit construction of all of the above

pub mod config;
pub mod context;
pub mod device;
pub mod env;
pub mod error;
pub mod node;
pub mod restart;

pub use context::NodeContext;
pub use device::Device;
pub use env::NodeEnvironment;
pub use error::{ConfigError, EnvError};
pub use node::Node;
