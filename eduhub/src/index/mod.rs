// Index catalog - declared indexes per collection. Only unique indexes
// have behavioral effect (enforced at write time); everything else is a
// performance hint and must never change query results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Unique,
    Single,
    Text,
    Compound,
    Multikey,
}

/// A declared index over one or more fields of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub collection: String,
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
}

impl IndexSpec {
    pub fn new(
        collection: impl Into<String>,
        kind: IndexKind,
        fields: &[&str],
    ) -> Self {
        let collection = collection.into();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let name = format!("{}_{}", collection, fields.join("_"));
        IndexSpec {
            collection,
            name,
            kind,
            fields,
        }
    }
}

/// The baseline index set every store carries.
pub fn default_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new("users", IndexKind::Unique, &["email"]),
        IndexSpec::new("courses", IndexKind::Text, &["title"]),
        IndexSpec::new("courses", IndexKind::Single, &["category"]),
        IndexSpec::new("assignments", IndexKind::Single, &["dueDate"]),
        IndexSpec::new("enrollments", IndexKind::Single, &["studentId"]),
        IndexSpec::new("enrollments", IndexKind::Single, &["courseId"]),
    ]
}

/// Recommended additions for heavier workloads. Registering them must not
/// change any query result.
pub fn recommended_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new("courses", IndexKind::Multikey, &["tags"]),
        IndexSpec::new("users", IndexKind::Single, &["dateJoined"]),
        IndexSpec::new("users", IndexKind::Compound, &["role", "isActive"]),
        IndexSpec::new("courses", IndexKind::Single, &["price"]),
        IndexSpec::new("submissions", IndexKind::Compound, &["studentId", "grade"]),
    ]
}
