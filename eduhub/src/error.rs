use thiserror::Error;

#[derive(Error, Debug)]
pub enum EduHubError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate key: {collection}.{field} = '{value}'")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Collection '{0}' not found in schema")]
    UnknownCollection(String),

    #[error("Collection '{0}' does not support hard deletes")]
    DeleteNotSupported(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EduHubError>;
