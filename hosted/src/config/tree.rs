use crate::config::schema::{OptionKind, OptionSchema};
use crate::error::{ConfigError, ConfigResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Coerced configuration, keyed by option name.
///
/// Keys are kept sorted by name, not in schema order, so equal trees compare
/// and serialize identically. Order only matters inside lists, which keep
/// document order.
pub type TypedTree = BTreeMap<String, ConfigValue>;

/// A single coerced option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A repeated group; one sub-tree per element, in document order.
    List(Vec<TypedTree>),
    Value(Value),
}

impl ConfigValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ConfigValue::Value(value) => Some(value),
            ConfigValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TypedTree]> {
        match self {
            ConfigValue::List(items) => Some(items),
            ConfigValue::Value(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }
}

impl From<&ConfigValue> for Value {
    fn from(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Value(value) => value.clone(),
            ConfigValue::List(items) => Value::Array(items.iter().map(tree_to_json).collect()),
        }
    }
}

/// Render a typed tree back into plain JSON.
pub fn tree_to_json(tree: &TypedTree) -> Value {
    Value::Object(tree.iter().map(|(name, value)| (name.clone(), Value::from(value))).collect::<Map<_, _>>())
}

/// Walk `schema` against the raw document and build the typed tree.
///
/// Pure: no I/O and no shared state. Fails on the first option that is
/// missing from `raw`, has an unknown type, or is declared as a list but is
/// not an array.
pub fn coerce(schema: &[OptionSchema], raw: &Value) -> ConfigResult<TypedTree> {
    coerce_at(schema, raw, "")
}

fn coerce_at(schema: &[OptionSchema], raw: &Value, prefix: &str) -> ConfigResult<TypedTree> {
    let mut tree = TypedTree::new();
    for option in schema {
        let Some(name) = option.name.as_deref() else {
            continue;
        };
        let path = if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") };
        let value = raw.get(name).ok_or_else(|| ConfigError::MissingOption { path: path.clone() })?;

        let coerced = if option.is_list() {
            let elements = value.as_array().ok_or_else(|| ConfigError::NotAList { path: path.clone() })?;
            let items = elements
                .iter()
                .enumerate()
                .map(|(index, element)| coerce_at(&option.items, element, &format!("{path}[{index}]")))
                .collect::<ConfigResult<Vec<_>>>()?;
            ConfigValue::List(items)
        } else {
            ConfigValue::Value(OptionKind::from_name(&option.kind)?.coerce(value))
        };
        tree.insert(name.to_string(), coerced);
    }
    Ok(tree)
}
