use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

/// Type name of a repeated group of options.
pub const LIST_TYPE: &str = "list";

/// One entry of the `options` list in `node.json`.
///
/// Entries without a `name` are structural markers (section headers and the
/// like) and never produce a value. Any other keys an entry carries (title,
/// hint, default, ...) are authoring metadata and are ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OptionSchema>,
}

impl OptionSchema {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: Some(name.into()), kind: kind.into(), items: Vec::new() }
    }

    pub fn list(name: impl Into<String>, items: Vec<OptionSchema>) -> Self {
        Self { name: Some(name.into()), kind: LIST_TYPE.to_string(), items }
    }

    pub fn is_list(&self) -> bool {
        self.kind == LIST_TYPE
    }
}

/// The registered option types.
///
/// Every kind currently accepts the raw JSON value unchanged. Richer per-kind
/// validation belongs in [`OptionKind::coerce`], the tree walk never needs to
/// know about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Color,
    String,
    Text,
    Section,
    Boolean,
    Select,
    Duration,
    Integer,
    Float,
    Font,
    Device,
    Resource,
    Json,
    Custom,
    Date,
}

impl OptionKind {
    pub const ALL: [OptionKind; 15] = [
        OptionKind::Color,
        OptionKind::String,
        OptionKind::Text,
        OptionKind::Section,
        OptionKind::Boolean,
        OptionKind::Select,
        OptionKind::Duration,
        OptionKind::Integer,
        OptionKind::Float,
        OptionKind::Font,
        OptionKind::Device,
        OptionKind::Resource,
        OptionKind::Json,
        OptionKind::Custom,
        OptionKind::Date,
    ];

    /// Resolve a type name from the schema. Unknown names are an error, there
    /// is no fallback kind.
    pub fn from_name(name: &str) -> ConfigResult<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name).ok_or_else(|| ConfigError::UnknownType(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptionKind::Color => "color",
            OptionKind::String => "string",
            OptionKind::Text => "text",
            OptionKind::Section => "section",
            OptionKind::Boolean => "boolean",
            OptionKind::Select => "select",
            OptionKind::Duration => "duration",
            OptionKind::Integer => "integer",
            OptionKind::Float => "float",
            OptionKind::Font => "font",
            OptionKind::Device => "device",
            OptionKind::Resource => "resource",
            OptionKind::Json => "json",
            OptionKind::Custom => "custom",
            OptionKind::Date => "date",
        }
    }

    pub fn coerce(&self, raw: &Value) -> Value {
        match self {
            OptionKind::Color
            | OptionKind::String
            | OptionKind::Text
            | OptionKind::Section
            | OptionKind::Boolean
            | OptionKind::Select
            | OptionKind::Duration
            | OptionKind::Integer
            | OptionKind::Float
            | OptionKind::Font
            | OptionKind::Device
            | OptionKind::Resource
            | OptionKind::Json
            | OptionKind::Custom
            | OptionKind::Date => raw.clone(),
        }
    }
}

/// Check that every named entry, list items included, uses a registered type.
///
/// Unnamed entries never produce a value and are not checked. Runs when a
/// schema is loaded, so a type error inside the items of a list that is
/// currently empty is still reported.
pub fn validate_types(schema: &[OptionSchema]) -> ConfigResult<()> {
    for option in schema.iter().filter(|option| option.name.is_some()) {
        if option.is_list() {
            validate_types(&option.items)?;
        } else {
            OptionKind::from_name(&option.kind)?;
        }
    }
    Ok(())
}

impl Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
