// Stored document envelope - implicit fields plus the raw field data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document with implicit fields and its field data.
/// `id` is the value of the collection's key field (e.g. `userId`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Document {
    /// Read a top-level field from the document data.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }
}
