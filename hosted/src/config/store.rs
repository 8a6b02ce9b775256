use crate::config::loader::{load_config, load_schema};
use crate::config::schema::OptionSchema;
use crate::config::tree::{ConfigValue, TypedTree, coerce};
use crate::error::{ConfigError, ConfigResult};
use crate::restart::{AbortService, RestartHook};
use arc_swap::ArcSwap;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const RESTART_ARMED_REASON: &str = "restart_on_update set";

/// Result of a reload that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new typed tree was published.
    Updated,
    /// The store was armed to restart; the restart hook was invoked and
    /// nothing was changed.
    RestartRequested,
}

#[derive(Debug)]
struct Sources {
    schema: Vec<OptionSchema>,
    raw: Value,
}

/// Owns the option schema, the raw config and the typed tree derived from both.
///
/// Reloads are serialized by a writer lock. A source that was read and parsed
/// is always kept, even when the tree built from it fails to coerce: schema
/// and config files are replaced one after the other, and the next reload of
/// the other file must see the newer one. Only the published tree is
/// transactional; it is replaced once coercion succeeded, so a failed reload
/// leaves the last good tree in place. Readers never block on writers and
/// always see a complete tree.
pub struct ConfigurationStore {
    dir: PathBuf,
    sources: Mutex<Sources>,
    tree: ArcSwap<TypedTree>,
    restart_armed: AtomicBool,
    hook: Arc<dyn RestartHook>,
}

impl ConfigurationStore {
    /// Load `node.json` and `config.json` from `dir`, restarting the process
    /// through [`AbortService`] when armed.
    pub fn open(dir: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::open_with_hook(dir, Arc::new(AbortService))
    }

    pub fn open_with_hook(dir: impl AsRef<Path>, hook: Arc<dyn RestartHook>) -> ConfigResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let schema = load_schema(&dir)?;
        let store = Self {
            dir,
            sources: Mutex::new(Sources { schema, raw: Value::Object(Map::new()) }),
            tree: ArcSwap::from_pointee(TypedTree::new()),
            restart_armed: AtomicBool::new(false),
            hook,
        };
        // The first tree is built from both freshly loaded sources together.
        store.reload_config()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Turn the next reload into a restart. Cannot be undone.
    pub fn arm_restart_on_next_update(&self) {
        info!("going to restart when config is updated");
        self.restart_armed.store(true, Ordering::SeqCst);
    }

    pub fn is_restart_armed(&self) -> bool {
        self.restart_armed.load(Ordering::SeqCst)
    }

    /// Re-read `node.json` and rebuild the typed tree.
    pub fn reload_schema(&self) -> ConfigResult<ReloadOutcome> {
        let schema = load_schema(&self.dir)?;
        self.update(Some(schema), None)
    }

    /// Re-read `config.json` and rebuild the typed tree.
    pub fn reload_config(&self) -> ConfigResult<ReloadOutcome> {
        let raw = load_config(&self.dir)?;
        self.update(None, Some(raw))
    }

    /// Rebuild the typed tree from the current sources.
    pub fn recompute(&self) -> ConfigResult<ReloadOutcome> {
        self.update(None, None)
    }

    fn update(&self, schema: Option<Vec<OptionSchema>>, raw: Option<Value>) -> ConfigResult<ReloadOutcome> {
        let mut sources = self.lock_sources();
        if self.is_restart_armed() {
            self.hook.restart(RESTART_ARMED_REASON);
            return Ok(ReloadOutcome::RestartRequested);
        }

        if let Some(schema) = schema {
            sources.schema = schema;
        }
        if let Some(raw) = raw {
            sources.raw = raw;
        }

        let tree = coerce(&sources.schema, &sources.raw)
            .inspect_err(|e| warn!("Failed to update config, keeping the previous one: {}", e))?;
        debug!("Publishing config with {} options", tree.len());
        self.tree.store(Arc::new(tree));
        info!("updated config");
        Ok(ReloadOutcome::Updated)
    }

    fn lock_sources(&self) -> MutexGuard<'_, Sources> {
        // A panicking hook in tests must not wedge the store.
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value of a top level option in the current tree.
    pub fn get(&self, key: &str) -> ConfigResult<ConfigValue> {
        self.tree.load().get(key).cloned().ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
    }

    /// The current tree as one consistent view.
    pub fn snapshot(&self) -> Arc<TypedTree> {
        self.tree.load_full()
    }

    pub fn schema(&self) -> Vec<OptionSchema> {
        self.lock_sources().schema.clone()
    }

    pub fn raw_config(&self) -> Value {
        self.lock_sources().raw.clone()
    }
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("dir", &self.dir)
            .field("tree", &self.tree.load())
            .field("restart_armed", &self.is_restart_armed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::loader::{CONFIG_JSON, NODE_JSON};
    use crate::config::tree::tree_to_json;
    use crate::restart::testing::RecordingHook;
    use serde_json::json;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"{"options": [
        {"name": "brightness", "type": "integer"},
        {"name": "items", "type": "list", "items": [{"name": "label", "type": "string"}]}
    ]}"#;

    pub(crate) fn node_dir(schema: &str, config: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NODE_JSON), schema).unwrap();
        std::fs::write(dir.path().join(CONFIG_JSON), config).unwrap();
        dir
    }

    fn open(dir: &TempDir) -> (ConfigurationStore, Arc<RecordingHook>) {
        let hook = Arc::new(RecordingHook::default());
        let store = ConfigurationStore::open_with_hook(dir.path(), hook.clone()).unwrap();
        (store, hook)
    }

    #[test]
    fn test_open_builds_tree_from_both_sources() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 42, "items": [{"label": "a"}, {"label": "b"}]}"#);
        let (store, hook) = open(&dir);
        assert_eq!(tree_to_json(&store.snapshot()), json!({"brightness": 42, "items": [{"label": "a"}, {"label": "b"}]}));
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(42));
        assert!(hook.reasons().is_empty());
    }

    #[test]
    fn test_open_fails_on_incomplete_config() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 42}"#);
        let hook = Arc::new(RecordingHook::default());
        let err = ConfigurationStore::open_with_hook(dir.path(), hook).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { .. }));
    }

    #[test]
    fn test_open_fails_on_unknown_type_in_empty_list() {
        let dir = node_dir(
            r#"{"options": [{"name": "items", "type": "list", "items": [{"name": "label", "type": "colour"}]}]}"#,
            r#"{"items": []}"#,
        );
        let hook = Arc::new(RecordingHook::default());
        let err = ConfigurationStore::open_with_hook(dir.path(), hook).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType(ref name) if name == "colour"));
    }

    #[test]
    fn test_get_unknown_key() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, _) = open(&dir);
        assert!(matches!(store.get("contrast"), Err(ConfigError::UnknownKey(ref key)) if key == "contrast"));
    }

    #[test]
    fn test_reload_config() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, _) = open(&dir);
        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 2, "items": [{"label": "x"}]}"#).unwrap();

        assert_eq!(store.reload_config().unwrap(), ReloadOutcome::Updated);
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(2));
        assert_eq!(store.get("items").unwrap().as_list().unwrap().len(), 1);
    }

    #[test]
    fn test_reload_schema_replaces_tree() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": [], "title": "hi"}"#);
        let (store, _) = open(&dir);
        std::fs::write(dir.path().join(NODE_JSON), r#"{"options": [{"name": "title", "type": "text"}]}"#).unwrap();

        assert_eq!(store.reload_schema().unwrap(), ReloadOutcome::Updated);
        assert_eq!(tree_to_json(&store.snapshot()), json!({"title": "hi"}));
        assert!(store.get("brightness").is_err());
        assert_eq!(store.schema().len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_last_good_tree() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, _) = open(&dir);
        let before = store.snapshot();

        std::fs::write(dir.path().join(CONFIG_JSON), "{ not json").unwrap();
        assert!(matches!(store.reload_config(), Err(ConfigError::Parse { .. })));

        std::fs::write(dir.path().join(NODE_JSON), r#"{"options": [{"name": "brightness", "type": "percent"}]}"#).unwrap();
        assert!(matches!(store.reload_schema(), Err(ConfigError::UnknownType(_))));
        assert_eq!(store.schema().len(), 2);

        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 5}"#).unwrap();
        assert!(matches!(store.reload_config(), Err(ConfigError::MissingOption { .. })));

        assert_eq!(store.snapshot(), before);
        // the parsed document is kept even though its tree was rejected
        assert_eq!(store.raw_config(), json!({"brightness": 5}));
    }

    #[test]
    fn test_schema_ahead_of_config_is_kept() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, _) = open(&dir);
        let before = store.snapshot();

        std::fs::write(
            dir.path().join(NODE_JSON),
            r#"{"options": [{"name": "brightness", "type": "integer"}, {"name": "contrast", "type": "integer"}]}"#,
        )
        .unwrap();
        let err = store.reload_schema().unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { ref path } if path == "contrast"));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.schema().len(), 2);
        assert_eq!(store.schema()[1], OptionSchema::new("contrast", "integer"));

        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 1, "contrast": 70}"#).unwrap();
        assert_eq!(store.reload_config().unwrap(), ReloadOutcome::Updated);
        assert_eq!(store.get("contrast").unwrap().as_i64(), Some(70));
        assert!(store.get("items").is_err());
    }

    #[test]
    fn test_config_ahead_of_schema_is_kept() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, _) = open(&dir);

        // a config dropping "items" arrives before the schema that drops it
        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 3}"#).unwrap();
        assert!(store.reload_config().is_err());
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(1));

        std::fs::write(dir.path().join(NODE_JSON), r#"{"options": [{"name": "brightness", "type": "integer"}]}"#).unwrap();
        assert_eq!(store.reload_schema().unwrap(), ReloadOutcome::Updated);
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_armed_restart_does_not_mutate() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let (store, hook) = open(&dir);
        let before = store.snapshot();

        store.arm_restart_on_next_update();
        store.arm_restart_on_next_update();
        assert!(store.is_restart_armed());

        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 9, "items": []}"#).unwrap();
        assert_eq!(store.reload_config().unwrap(), ReloadOutcome::RestartRequested);
        assert_eq!(store.reload_schema().unwrap(), ReloadOutcome::RestartRequested);
        assert_eq!(store.recompute().unwrap(), ReloadOutcome::RestartRequested);

        assert_eq!(hook.reasons(), vec![RESTART_ARMED_REASON; 3]);
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(1));
        // the flag is never reset
        assert!(store.is_restart_armed());
    }

    struct PanickingHook;

    impl RestartHook for PanickingHook {
        fn restart(&self, reason: &str) {
            panic!("restart: {reason}");
        }
    }

    #[test]
    fn test_armed_restart_with_raising_hook() {
        let dir = node_dir(SCHEMA, r#"{"brightness": 1, "items": []}"#);
        let store = Arc::new(ConfigurationStore::open_with_hook(dir.path(), Arc::new(PanickingHook)).unwrap());
        store.arm_restart_on_next_update();

        std::fs::write(dir.path().join(CONFIG_JSON), r#"{"brightness": 9, "items": []}"#).unwrap();
        let reloading = store.clone();
        let result = std::thread::spawn(move || reloading.reload_config()).join();
        assert!(result.is_err());
        assert_eq!(store.get("brightness").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_readers_never_see_partial_tree() {
        let first = r#"{"brightness": 1, "items": [{"label": "a"}]}"#;
        let second = r#"{"brightness": 2, "items": [{"label": "b"}, {"label": "c"}]}"#;
        let dir = node_dir(SCHEMA, first);
        let (store, _) = open(&dir);
        let expected = [serde_json::from_str::<Value>(first).unwrap(), serde_json::from_str::<Value>(second).unwrap()];

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let seen = tree_to_json(&store.snapshot());
                        assert!(expected.contains(&seen), "unexpected tree {seen}");
                    }
                });
            }
            for i in 0..50 {
                let content = if i % 2 == 0 { second } else { first };
                std::fs::write(dir.path().join(CONFIG_JSON), content).unwrap();
                store.reload_config().unwrap();
            }
        });
    }
}
