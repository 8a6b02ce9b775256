// Configuration module
//
// Typed node configuration split into focused submodules:
// - schema: option schema entries and the registry of option types
// - tree: schema driven coercion of the raw config into a typed tree
// - loader: reading node.json and config.json
// - store: the current typed tree, reloads and the restart-on-update flag
// - watcher: routing of file change events to reloads or a restart

pub mod loader;
pub mod schema;
pub mod store;
pub mod tree;
pub mod watcher;

pub use schema::{OptionKind, OptionSchema};
pub use store::{ConfigurationStore, ReloadOutcome};
pub use tree::{ConfigValue, TypedTree};
pub use watcher::{ChangeAction, ChangeWatcher, UpdatePolicy};
