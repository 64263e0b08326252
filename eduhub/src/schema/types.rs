use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level schema definition parsed from a schema YAML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub collections: HashMap<String, CollectionDefinition>,
}

impl SchemaDefinition {
    pub fn collection(&self, name: &str) -> Option<&CollectionDefinition> {
        self.collections.get(name)
    }
}

/// Definition of a single collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDefinition {
    /// Name of the field holding the document's unique id (e.g. `userId`)
    pub key: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
    #[serde(default)]
    pub additional_properties: bool,
    /// Whether documents may be physically removed from this collection
    #[serde(default)]
    pub hard_delete: bool,
    #[serde(default)]
    pub id: Option<IdConfig>,
}

impl CollectionDefinition {
    pub fn auto_id(&self) -> Option<&AutoIdStrategy> {
        self.id.as_ref().and_then(|c| c.auto.as_ref())
    }
}

/// Configuration for document key generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    pub auto: Option<AutoIdStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    Uuid,
}

/// Definition of a single field in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    /// Regex the value must match (string fields only)
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Collection a ref field points at
    #[serde(default)]
    pub target: Option<String>,
    /// Element type name for array fields (string, number, ...)
    #[serde(default)]
    pub items: Option<String>,
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Int,
    Boolean,
    Date,
    Array,
    Object,
    Ref,
}
