mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::{
    AutoIdStrategy, CollectionDefinition, FieldDefinition, FieldType, IdConfig, SchemaDefinition,
};

/// The built-in EduHub schema: six collections covering the
/// learning-management domain.
pub const EDUHUB_SCHEMA: &str = include_str!("../../schema/eduhub.yaml");

/// Parse the built-in EduHub schema.
pub fn default_schema() -> SchemaDefinition {
    // The embedded schema is validated by tests; a parse failure here is a bug.
    parse_schema_str(EDUHUB_SCHEMA).expect("built-in schema must parse")
}
