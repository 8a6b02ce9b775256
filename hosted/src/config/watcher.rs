use crate::config::loader::{CONFIG_JSON, NODE_JSON};
use crate::config::store::ConfigurationStore;
use crate::error::ConfigError;
use crate::restart::RestartHook;
use log::{debug, error, info, trace, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;

/// Extension of the node's code files. A change to any of them makes the
/// running process stale.
pub const DEFAULT_CODE_EXTENSION: &str = ".py";

/// What a changed path asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    ReloadSchema,
    ReloadConfig,
    Restart,
    Ignore,
}

/// What to do when a reload triggered by a change fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Log the error and keep serving the last good tree.
    #[default]
    KeepLastGood,
    /// Treat a broken update as fatal and restart the service.
    Restart,
}

/// Decide what a change to `path` means, by its final component only.
pub fn route(path: &Path, code_extension: &str) -> ChangeAction {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return ChangeAction::Ignore;
    };
    match name {
        NODE_JSON => ChangeAction::ReloadSchema,
        CONFIG_JSON => ChangeAction::ReloadConfig,
        _ if name.ends_with(code_extension) => ChangeAction::Restart,
        _ => ChangeAction::Ignore,
    }
}

/// Files are updated by writing elsewhere and moving them into place, so
/// only rename targets count. Creations and in-place writes are ignored: a
/// file created in place may still be empty when the event arrives.
pub fn is_moved_into_place(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)))
}

/// Routes file change events in the node directory to the configuration
/// store or to a restart.
pub struct ChangeWatcher {
    store: Arc<ConfigurationStore>,
    hook: Arc<dyn RestartHook>,
    code_extension: String,
    policy: UpdatePolicy,
}

impl ChangeWatcher {
    pub fn new(store: Arc<ConfigurationStore>, hook: Arc<dyn RestartHook>) -> Self {
        Self { store, hook, code_extension: DEFAULT_CODE_EXTENSION.to_string(), policy: UpdatePolicy::default() }
    }

    pub fn with_code_extension(mut self, extension: impl Into<String>) -> Self {
        self.code_extension = extension.into();
        self
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn route(&self, path: &Path) -> ChangeAction {
        route(path, &self.code_extension)
    }

    /// Act on a change to `path` and report what was done.
    pub fn dispatch(&self, path: &Path) -> ChangeAction {
        let action = self.route(path);
        match action {
            ChangeAction::ReloadSchema => {
                info!("{NODE_JSON} changed");
                if let Err(e) = self.store.reload_schema() {
                    self.update_failed(e);
                }
            }
            ChangeAction::ReloadConfig => {
                info!("{CONFIG_JSON} changed");
                if let Err(e) = self.store.reload_config() {
                    self.update_failed(e);
                }
            }
            ChangeAction::Restart => {
                self.hook.restart(&format!("code file {} changed", path.display()));
            }
            ChangeAction::Ignore => trace!("Ignoring change to {}", path.display()),
        }
        action
    }

    fn update_failed(&self, e: ConfigError) {
        error!("Failed to reload config: {}", e);
        if self.policy == UpdatePolicy::Restart {
            self.hook.restart(&format!("config update failed: {e}"));
        }
    }

    /// Handle one event from the notification source.
    pub fn handle_event(&self, event: &Event) {
        if !is_moved_into_place(&event.kind) {
            trace!("Change event ignored: {:?}", event);
            return;
        }
        if let Some(path) = event.paths.last() {
            self.dispatch(path);
        }
    }

    /// Start watching the store's directory on notify's background thread.
    ///
    /// Events stop being delivered once the returned watcher is dropped.
    pub fn start(self) -> notify::Result<RecommendedWatcher> {
        let dir = self.store.dir().to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => self.handle_event(&event),
                Err(e) => warn!("Failed to receive change event: {:?}", e),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!("Watching {} for changes", dir.display());
        Ok(watcher)
    }
}
