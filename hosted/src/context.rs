use crate::config::{ChangeWatcher, ConfigurationStore, UpdatePolicy};
use crate::device::Device;
use crate::env::NodeEnvironment;
use crate::node::Node;
use crate::restart::{AbortService, RestartHook};
use anyhow::{Context, Result};
use log::info;
use notify::RecommendedWatcher;
use std::sync::Arc;

/// Everything a running node talks to, constructed once at startup.
///
/// Construction order is fixed: peer channel, device channel, configuration,
/// then the change watcher that feeds the configuration. Dropping the context
/// stops the watcher.
pub struct NodeContext {
    env: NodeEnvironment,
    node: Node,
    device: Device,
    config: Arc<ConfigurationStore>,
    _watcher: RecommendedWatcher,
}

impl NodeContext {
    pub fn init(env: NodeEnvironment) -> Result<Self> {
        Self::init_with(env, Arc::new(AbortService), UpdatePolicy::default())
    }

    pub fn init_with(env: NodeEnvironment, hook: Arc<dyn RestartHook>, policy: UpdatePolicy) -> Result<Self> {
        info!("initializing");
        let node = Node::from_env(&env).context("Failed to open peer socket")?;
        let device = Device::new(env.syncer_socket.clone());
        let config = Arc::new(
            ConfigurationStore::open_with_hook(&env.node_dir, hook.clone())
                .with_context(|| format!("Failed to load configuration from {}", env.node_dir.display()))?,
        );
        let watcher = ChangeWatcher::new(config.clone(), hook)
            .with_policy(policy)
            .start()
            .context("Failed to watch the node directory")?;
        info!("initialized. ready to go!");
        Ok(Self { env, node, device, config, _watcher: watcher })
    }

    pub fn env(&self) -> &NodeEnvironment {
        &self.env
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn device(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn config(&self) -> &Arc<ConfigurationStore> {
        &self.config
    }
}
