// Sample-data seeding. Input is a JSON object mapping collection names
// to arrays of documents; every document goes through the same insert
// path as user writes, so invalid ones are skipped and reported rather
// than stored.

use crate::error::{EduHubError, Result};
use crate::store::Store;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Per-collection outcome of a seeding run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CollectionSeed {
    pub inserted: usize,
    pub skipped: usize,
}

/// Outcome of a full seeding run, keyed by collection name.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SeedReport {
    pub collections: BTreeMap<String, CollectionSeed>,
}

impl SeedReport {
    pub fn total_inserted(&self) -> usize {
        self.collections.values().map(|c| c.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.collections.values().map(|c| c.skipped).sum()
    }
}

/// Read a sample-data file from disk.
pub fn load_sample_data(path: &Path) -> Result<Value> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Insert sample data into the store. Collections are seeded in a fixed
/// order so referenced documents (users, courses) land before the
/// documents that point at them. Documents that fail validation or
/// collide on a key are skipped with a warning.
pub fn seed(store: &Store, data: &Value) -> Result<SeedReport> {
    let root = data.as_object().ok_or_else(|| {
        EduHubError::InvalidQuery("sample data must be a JSON object of collections".into())
    })?;

    let mut report = SeedReport::default();

    for name in seeding_order(store) {
        let docs = match root.get(&name) {
            Some(Value::Array(docs)) => docs.clone(),
            Some(other) => {
                return Err(EduHubError::InvalidQuery(format!(
                    "sample data for '{name}' must be an array (got {other})"
                )))
            }
            None => continue,
        };

        let collection = store.collection(&name)?;
        let mut outcome = CollectionSeed::default();
        for result in collection.insert_many(docs) {
            match result {
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    log::warn!("seed: skipping {name} document: {e}");
                    outcome.skipped += 1;
                }
            }
        }
        report.collections.insert(name, outcome);
    }

    for name in root.keys() {
        if !store.schema().collections.contains_key(name) {
            log::warn!("seed: unknown collection '{name}', ignoring");
        }
    }

    Ok(report)
}

/// Referenced-first ordering: users and courses before everything that
/// points at them, then any remaining schema collections alphabetically.
fn seeding_order(store: &Store) -> Vec<String> {
    let preferred = [
        "users",
        "courses",
        "lessons",
        "assignments",
        "enrollments",
        "submissions",
    ];
    let mut order: Vec<String> = preferred
        .iter()
        .filter(|name| store.schema().collections.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    let mut rest: Vec<String> = store
        .schema()
        .collections
        .keys()
        .filter(|name| !preferred.contains(&name.as_str()))
        .cloned()
        .collect();
    rest.sort();
    order.extend(rest);
    order
}
