use crate::catalog::Catalog;
use crate::document::Document;
use crate::error::{EduHubError, Result};
use crate::filter::{compare_values, Filter};
use crate::index::{self, IndexKind, IndexSpec};
use crate::pipeline::{self, Stage};
use crate::schema::{AutoIdStrategy, CollectionDefinition, SchemaDefinition};
use crate::validation;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

/// The main entry point for EduHub.
/// Owns the schema, the per-collection document maps, and the index
/// catalog, and hands out collection handles for CRUD operations.
pub struct Store {
    schema: SchemaDefinition,
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    indexes: RwLock<Vec<IndexSpec>>,
}

/// Outcome of an update. Zero matched means the target id did not exist,
/// which is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

impl UpdateReport {
    pub const NONE: UpdateReport = UpdateReport {
        matched: 0,
        modified: 0,
    };
}

/// On-disk snapshot of a store's contents.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    collections: HashMap<String, Vec<Document>>,
}

impl Store {
    /// Create an empty store for the given schema, carrying the default
    /// index catalog.
    pub fn new(schema: SchemaDefinition) -> Self {
        let mut collections = HashMap::new();
        for name in schema.collections.keys() {
            collections.insert(name.clone(), BTreeMap::new());
        }
        Store {
            schema,
            collections: RwLock::new(collections),
            indexes: RwLock::new(index::default_indexes()),
        }
    }

    /// Create an empty store with the built-in EduHub schema.
    pub fn open_default() -> Self {
        Store::new(crate::schema::default_schema())
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Get a collection handle. Unknown names are a caller error.
    pub fn collection(&self, name: &str) -> Result<Collection<'_>> {
        if !self.schema.collections.contains_key(name) {
            return Err(EduHubError::UnknownCollection(name.to_string()));
        }
        Ok(Collection {
            store: self,
            name: name.to_string(),
        })
    }

    /// The named query/aggregation catalog over this store.
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self)
    }

    /// Run an aggregation pipeline against a collection.
    pub fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<Vec<Value>> {
        pipeline::run(self, collection, stages)
    }

    /// Register additional declared indexes. Apart from `Unique` these are
    /// performance metadata only; results are identical with or without them.
    pub fn register_indexes(&self, specs: Vec<IndexSpec>) {
        let mut indexes = self.indexes.write().expect("index lock poisoned");
        for spec in specs {
            if !indexes.iter().any(|existing| existing.name == spec.name) {
                indexes.push(spec);
            }
        }
    }

    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.indexes.read().expect("index lock poisoned").clone()
    }

    /// Collection counts, for the CLI status command.
    pub fn status(&self) -> Value {
        let collections = self.collections.read().expect("store lock poisoned");
        let mut counts = serde_json::Map::new();
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();
        for name in names {
            counts.insert(
                name.clone(),
                serde_json::json!({ "count": collections[name].len() }),
            );
        }
        serde_json::json!({ "collections": counts })
    }

    /// Validate every stored document against the schema and report issues
    /// per collection. Useful after loading an externally produced snapshot.
    pub fn validate_all(&self) -> Value {
        let collections = self.collections.read().expect("store lock poisoned");
        let mut report = serde_json::Map::new();

        for (name, definition) in &self.schema.collections {
            let docs = &collections[name];
            let mut issues = Vec::new();
            for doc in docs.values() {
                let vr = validation::validate_document(definition, &doc.data);
                if !vr.is_ok() {
                    issues.push(serde_json::json!({
                        "id": doc.id,
                        "errors": vr.errors,
                    }));
                }
            }
            report.insert(
                name.clone(),
                serde_json::json!({ "total": docs.len(), "issues": issues }),
            );
        }

        Value::Object(report)
    }

    /// Write the store contents to a JSON snapshot file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let collections = self.collections.read().expect("store lock poisoned");
        let snapshot = Snapshot {
            collections: collections
                .iter()
                .map(|(name, docs)| (name.clone(), docs.values().cloned().collect()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a snapshot produced by [`Store::save`]. Documents that no
    /// longer validate against the schema are skipped with a warning;
    /// unknown collections are skipped entirely.
    pub fn load(path: &Path, schema: SchemaDefinition) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        let store = Store::new(schema);

        {
            let mut collections = store.collections.write().expect("store lock poisoned");
            for (name, docs) in snapshot.collections {
                let definition = match store.schema.collections.get(&name) {
                    Some(d) => d,
                    None => {
                        log::warn!("snapshot contains unknown collection '{name}', skipping");
                        continue;
                    }
                };
                let target = collections.get_mut(&name).expect("collection map exists");
                for doc in docs {
                    let vr = validation::validate_document(definition, &doc.data);
                    if !vr.is_ok() {
                        log::warn!(
                            "skipping invalid document {name}/{}: {}",
                            doc.id,
                            vr.errors.join("; ")
                        );
                        continue;
                    }
                    // A hand-edited snapshot can desync id and key field
                    let key_value = doc.data.get(&definition.key).and_then(Value::as_str);
                    if key_value != Some(doc.id.as_str()) {
                        log::warn!(
                            "skipping document {name}/{}: key field '{}' is {:?}, expected the document id",
                            doc.id,
                            definition.key,
                            key_value
                        );
                        continue;
                    }
                    target.insert(doc.id.clone(), doc);
                }
            }
        }

        Ok(store)
    }
}

/// A handle to a collection within a store, providing CRUD operations
/// over dynamic JSON data.
pub struct Collection<'a> {
    store: &'a Store,
    name: String,
}

impl<'a> Collection<'a> {
    fn definition(&self) -> &CollectionDefinition {
        &self.store.schema.collections[&self.name]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a document by its key value. Absence is not an error.
    pub fn get(&self, id: &str) -> Option<Document> {
        let collections = self.store.collections.read().expect("store lock poisoned");
        collections[&self.name].get(id).cloned()
    }

    /// All documents in key order.
    pub fn list(&self) -> Vec<Document> {
        let collections = self.store.collections.read().expect("store lock poisoned");
        collections[&self.name].values().cloned().collect()
    }

    /// Field data of all documents, for pipeline input.
    pub fn list_data(&self) -> Result<Vec<Value>> {
        let collections = self.store.collections.read().expect("store lock poisoned");
        Ok(collections[&self.name]
            .values()
            .map(|d| d.data.clone())
            .collect())
    }

    pub fn count(&self) -> usize {
        let collections = self.store.collections.read().expect("store lock poisoned");
        collections[&self.name].len()
    }

    /// All documents matching the filter. Zero matches returns an empty
    /// vec, never an error.
    pub fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let collections = self.store.collections.read().expect("store lock poisoned");
        let mut out = Vec::new();
        for doc in collections[&self.name].values() {
            if filter.matches(&doc.data)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        let collections = self.store.collections.read().expect("store lock poisoned");
        for doc in collections[&self.name].values() {
            if filter.matches(&doc.data)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    /// Insert a new document. Rejects schema violations and uniqueness
    /// conflicts before anything is written. Returns the document's key.
    pub fn insert(&self, mut data: Value) -> Result<String> {
        let definition = self.definition();

        // Generate the key if the collection declares an auto strategy
        let key_field = definition.key.clone();
        if data.get(&key_field).and_then(Value::as_str).is_none() {
            if let Some(AutoIdStrategy::Uuid) = definition.auto_id() {
                if let Some(obj) = data.as_object_mut() {
                    obj.insert(
                        key_field.clone(),
                        Value::String(uuid::Uuid::new_v4().to_string()),
                    );
                }
            }
        }

        validation::validate_and_prepare(definition, &mut data)?;

        let id = data
            .get(&key_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EduHubError::Validation(format!(
                    "Key field '{key_field}' must be a string"
                ))
            })?
            .to_string();

        let mut collections = self.store.collections.write().expect("store lock poisoned");
        let docs = collections.get_mut(&self.name).expect("collection exists");

        if docs.contains_key(&id) {
            return Err(EduHubError::DuplicateKey {
                collection: self.name.clone(),
                field: key_field,
                value: id,
            });
        }

        self.check_unique(docs, &data, None)?;

        let now = Utc::now();
        log::debug!("insert {}/{id}", self.name);
        docs.insert(
            id.clone(),
            Document {
                id: id.clone(),
                created_at: now,
                modified_at: now,
                data,
            },
        );

        Ok(id)
    }

    /// Bulk insert with per-document results. Partial success is allowed;
    /// the caller inspects each entry to see which documents were written.
    pub fn insert_many(&self, docs: Vec<Value>) -> Vec<Result<String>> {
        docs.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Merge the given fields into an existing document ($set semantics:
    /// top-level fields are replaced, explicit nulls are stored as null).
    /// A missing id yields a zero-matched report, not an error; an update
    /// that would violate the schema or a unique index is rejected whole.
    pub fn update(&self, id: &str, fields: Value) -> Result<UpdateReport> {
        let definition = self.definition();

        let fields_obj = match fields {
            Value::Object(o) => o,
            _ => {
                return Err(EduHubError::InvalidQuery(
                    "update fields must be a JSON object".into(),
                ))
            }
        };

        let mut collections = self.store.collections.write().expect("store lock poisoned");
        let docs = collections.get_mut(&self.name).expect("collection exists");

        let existing = match docs.get(id) {
            Some(doc) => doc.clone(),
            None => return Ok(UpdateReport::NONE),
        };

        let mut merged = existing.data.clone();
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in &fields_obj {
                obj.insert(k.clone(), v.clone());
            }
        }

        if merged
            .get(&definition.key)
            .and_then(Value::as_str)
            .map(|k| k != id)
            .unwrap_or(true)
        {
            return Err(EduHubError::Validation(format!(
                "Key field '{}' cannot be changed by update",
                definition.key
            )));
        }

        let vr = validation::validate_document(definition, &merged);
        if !vr.is_ok() {
            return Err(EduHubError::Validation(format!(
                "Update validation failed:\n  - {}",
                vr.errors.join("\n  - ")
            )));
        }

        self.check_unique(docs, &merged, Some(id))?;

        let modified = merged != existing.data;
        if modified {
            let doc = docs.get_mut(id).expect("checked above");
            doc.data = merged;
            doc.modified_at = Utc::now();
            log::debug!("update {}/{id}", self.name);
        }

        Ok(UpdateReport {
            matched: 1,
            modified: modified as u64,
        })
    }

    /// Add values to an array field, with set semantics: values already
    /// present are not duplicated. A missing field starts as an empty array.
    pub fn add_to_set(&self, id: &str, field: &str, values: Vec<Value>) -> Result<UpdateReport> {
        let existing = match self.get(id) {
            Some(doc) => doc,
            None => return Ok(UpdateReport::NONE),
        };

        let mut array = match existing.field(field) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(EduHubError::InvalidQuery(format!(
                    "Field '{field}' is not an array (got {other})"
                )))
            }
        };

        for value in values {
            if !array.contains(&value) {
                array.push(value);
            }
        }

        self.update(id, serde_json::json!({ field: array }))
    }

    /// Hard delete. Only collections declaring `hard_delete` support this;
    /// a missing id is a no-op returning false.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !self.definition().hard_delete {
            return Err(EduHubError::DeleteNotSupported(self.name.clone()));
        }

        let mut collections = self.store.collections.write().expect("store lock poisoned");
        let docs = collections.get_mut(&self.name).expect("collection exists");
        let removed = docs.remove(id).is_some();
        if removed {
            log::debug!("delete {}/{id}", self.name);
        }
        Ok(removed)
    }

    /// Enforce unique indexes declared for this collection, excluding the
    /// document with key `exclude` (for updates).
    fn check_unique(
        &self,
        docs: &BTreeMap<String, Document>,
        data: &Value,
        exclude: Option<&str>,
    ) -> Result<()> {
        let indexes = self.store.indexes.read().expect("index lock poisoned");
        for spec in indexes
            .iter()
            .filter(|s| s.kind == IndexKind::Unique && s.collection == self.name)
        {
            // Unique indexes are single-field in this catalog
            let field = match spec.fields.first() {
                Some(f) => f,
                None => continue,
            };
            let value = match data.get(field) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };

            let conflict = docs.values().any(|doc| {
                Some(doc.id.as_str()) != exclude
                    && doc
                        .field(field)
                        .map(|v| compare_values(v, value) == Some(Ordering::Equal) || v == value)
                        .unwrap_or(false)
            });

            if conflict {
                return Err(EduHubError::DuplicateKey {
                    collection: self.name.clone(),
                    field: field.clone(),
                    value: value.as_str().unwrap_or_default().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> Store {
        Store::open_default()
    }

    fn alice() -> Value {
        json!({ "userId": "u1", "email": "alice@example.com", "role": "student" })
    }

    #[test]
    fn insert_and_get() {
        let store = store();
        let users = store.collection("users").unwrap();
        let id = users.insert(alice()).unwrap();
        assert_eq!(id, "u1");

        let doc = users.get("u1").unwrap();
        assert_eq!(doc.data["email"], "alice@example.com");
        // isActive default applied
        assert_eq!(doc.data["isActive"], json!(true));
    }

    #[test]
    fn insert_rejects_schema_violation() {
        let store = store();
        let users = store.collection("users").unwrap();
        let result = users.insert(json!({ "userId": "u1", "role": "student" }));
        assert!(matches!(result, Err(EduHubError::Validation(_))));
        assert_eq!(users.count(), 0);
    }

    #[test]
    fn insert_rejects_duplicate_email() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();

        let result = users.insert(json!({
            "userId": "u2", "email": "alice@example.com", "role": "student",
        }));
        assert!(matches!(result, Err(EduHubError::DuplicateKey { .. })));
        assert_eq!(users.count(), 1);
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();

        let result = users.insert(json!({
            "userId": "u1", "email": "other@example.com", "role": "student",
        }));
        assert!(matches!(result, Err(EduHubError::DuplicateKey { .. })));
    }

    #[test]
    fn update_missing_id_is_zero_matched() {
        let store = store();
        let users = store.collection("users").unwrap();
        let report = users.update("ghost", json!({ "isActive": false })).unwrap();
        assert_eq!(report, UpdateReport::NONE);
    }

    #[test]
    fn update_merges_and_revalidates() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();

        let report = users
            .update("u1", json!({ "firstName": "Alice" }))
            .unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.modified, 1);

        // Out-of-enum role is rejected and nothing changes
        let result = users.update("u1", json!({ "role": "wizard" }));
        assert!(result.is_err());
        assert_eq!(users.get("u1").unwrap().data["role"], "student");
    }

    #[test]
    fn update_cannot_change_key() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();
        assert!(users.update("u1", json!({ "userId": "u9" })).is_err());
    }

    #[test]
    fn update_rejects_unique_conflict() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();
        users
            .insert(json!({ "userId": "u2", "email": "bob@example.com", "role": "student" }))
            .unwrap();

        let result = users.update("u2", json!({ "email": "alice@example.com" }));
        assert!(matches!(result, Err(EduHubError::DuplicateKey { .. })));
    }

    #[test]
    fn update_to_own_email_is_fine() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();
        let report = users
            .update("u1", json!({ "email": "alice@example.com" }))
            .unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.modified, 0);
    }

    #[test]
    fn soft_deactivation_keeps_document() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();

        users.update("u1", json!({ "isActive": false })).unwrap();
        let doc = users.get("u1").unwrap();
        assert_eq!(doc.data["isActive"], json!(false));
    }

    #[test]
    fn hard_delete_only_on_enrollments() {
        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();
        assert!(matches!(
            users.delete("u1"),
            Err(EduHubError::DeleteNotSupported(_))
        ));

        let courses = store.collection("courses").unwrap();
        courses
            .insert(json!({
                "courseId": "c1", "title": "Rust", "instructorId": "u1",
                "category": "Programming",
            }))
            .unwrap();

        let enrollments = store.collection("enrollments").unwrap();
        let id = enrollments
            .insert(json!({ "studentId": "u1", "courseId": "c1" }))
            .unwrap();
        assert!(enrollments.delete(&id).unwrap());
        // Second delete is a no-op
        assert!(!enrollments.delete(&id).unwrap());
    }

    #[test]
    fn enrollment_id_auto_generated() {
        let store = store();
        let enrollments = store.collection("enrollments").unwrap();
        let id = enrollments
            .insert(json!({ "studentId": "u1", "courseId": "c1" }))
            .unwrap();
        assert!(!id.is_empty());
        assert_eq!(enrollments.get(&id).unwrap().data["enrollmentId"], id);
    }

    #[test]
    fn add_to_set_is_idempotent() {
        let store = store();
        let courses = store.collection("courses").unwrap();
        courses
            .insert(json!({
                "courseId": "c1", "title": "Rust", "instructorId": "u1",
                "category": "Programming", "tags": ["rust"],
            }))
            .unwrap();

        courses
            .add_to_set("c1", "tags", vec![json!("rust"), json!("systems")])
            .unwrap();
        assert_eq!(
            courses.get("c1").unwrap().data["tags"],
            json!(["rust", "systems"])
        );
    }

    #[test]
    fn insert_many_partial_success() {
        let store = store();
        let users = store.collection("users").unwrap();
        let results = users.insert_many(vec![
            alice(),
            json!({ "userId": "u2", "role": "student" }), // missing email
            json!({ "userId": "u3", "email": "cara@example.com", "role": "instructor" }),
        ]);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(users.count(), 2);
    }

    #[test]
    fn find_zero_matches_is_empty() {
        let store = store();
        let users = store.collection("users").unwrap();
        let found = users.find(&Filter::eq("role", "instructor")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn unknown_collection_errors() {
        let store = store();
        assert!(matches!(
            store.collection("wizards"),
            Err(EduHubError::UnknownCollection(_))
        ));
    }

    #[test]
    fn results_identical_with_recommended_indexes() {
        let build = || {
            let s = Store::open_default();
            let users = s.collection("users").unwrap();
            users.insert(alice()).unwrap();
            users
                .insert(json!({ "userId": "u2", "email": "bob@example.com", "role": "instructor" }))
                .unwrap();
            s
        };

        let plain = build();
        let indexed = build();
        indexed.register_indexes(crate::index::recommended_indexes());

        let f = Filter::and(vec![
            Filter::eq("role", "student"),
            Filter::eq("isActive", true),
        ]);
        let a = plain.collection("users").unwrap().find(&f).unwrap();
        let b = indexed.collection("users").unwrap().find(&f).unwrap();
        assert_eq!(
            a.iter().map(|d| &d.id).collect::<Vec<_>>(),
            b.iter().map(|d| &d.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn snapshot_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshot.json");

        let store = store();
        store.collection("users").unwrap().insert(alice()).unwrap();
        store.save(&path).unwrap();

        let restored = Store::load(&path, default_schema()).unwrap();
        let doc = restored.collection("users").unwrap().get("u1").unwrap();
        assert_eq!(doc.data["email"], "alice@example.com");
    }

    #[test]
    fn load_skips_document_with_mismatched_key() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshot.json");

        let store = store();
        let users = store.collection("users").unwrap();
        users.insert(alice()).unwrap();
        users
            .insert(json!({ "userId": "u2", "email": "bob@example.com", "role": "student" }))
            .unwrap();
        store.save(&path).unwrap();

        // Desync u2's map id from its key field, as a hand edit might
        let mut snapshot: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for doc in snapshot["collections"]["users"].as_array_mut().unwrap() {
            if doc["id"] == "u2" {
                doc["data"]["userId"] = json!("u9");
            }
        }
        std::fs::write(&path, snapshot.to_string()).unwrap();

        let restored = Store::load(&path, default_schema()).unwrap();
        let users = restored.collection("users").unwrap();
        assert_eq!(users.count(), 1);
        assert!(users.get("u1").is_some());
        assert!(users.get("u2").is_none());
    }

    #[test]
    fn status_reports_counts() {
        let store = store();
        store.collection("users").unwrap().insert(alice()).unwrap();
        let status = store.status();
        assert_eq!(status["collections"]["users"]["count"], json!(1));
        assert_eq!(status["collections"]["courses"]["count"], json!(0));
    }
}
