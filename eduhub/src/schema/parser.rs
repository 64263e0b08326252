use super::types::SchemaDefinition;
use crate::error::{EduHubError, Result};
use std::path::Path;

/// Parse a schema YAML file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    check_schema(&schema)?;
    Ok(schema)
}

/// Structural checks that serde cannot express: every collection's key
/// field must be declared, and ref fields must name a target collection.
fn check_schema(schema: &SchemaDefinition) -> Result<()> {
    for (name, collection) in &schema.collections {
        if !collection.fields.contains_key(&collection.key) {
            return Err(EduHubError::Schema(format!(
                "Collection '{name}': key field '{}' is not declared",
                collection.key
            )));
        }
        for (field_name, field) in &collection.fields {
            if field.field_type == super::FieldType::Ref {
                match &field.target {
                    Some(target) if schema.collections.contains_key(target) => {}
                    Some(target) => {
                        return Err(EduHubError::Schema(format!(
                            "Collection '{name}': field '{field_name}' targets unknown collection '{target}'"
                        )));
                    }
                    None => {
                        return Err(EduHubError::Schema(format!(
                            "Collection '{name}': ref field '{field_name}' has no target"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
