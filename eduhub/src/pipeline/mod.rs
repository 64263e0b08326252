// Aggregation pipeline - an explicit sequence of transformation stages
// applied to a collection's documents. Each stage is a pure function of
// its input rows and the current collection snapshots; joins are an
// explicit Lookup stage rather than implicit reference resolution.

use crate::error::{EduHubError, Result};
use crate::filter::{compare_values, lookup, Filter};
use crate::store::Store;
use crate::validation::parse_date;
use chrono::Datelike;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Keep only rows matching the filter
    Match(Filter),
    /// Join: for each row, collect documents from `from` whose
    /// `foreign_field` equals the row's `local_field`, into `as_field`.
    /// A missing referenced document yields an empty array, not an error.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Flatten an array field into one row per element. Rows whose field
    /// is empty or missing are dropped unless `preserve_empty` is set,
    /// in which case they pass through with the field set to null.
    Unwind { path: String, preserve_empty: bool },
    /// Group rows by key, computing named accumulators.
    /// Output rows carry the key under `_id` plus one field per accumulator,
    /// in first-seen key order.
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Stable multi-key sort. Output order is only defined after this stage.
    Sort { keys: Vec<SortKey> },
    Limit(usize),
    /// Reshape rows into the named output fields.
    Project(Vec<ProjectField>),
}

#[derive(Debug, Clone)]
pub enum GroupKey {
    /// Single group holding every row
    Null,
    Field(String),
    /// Calendar year/month extracted from a date field
    YearMonth(String),
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Count,
    /// Sum of a numeric field; booleans count as 1/0, missing as 0
    Sum(String),
    /// Average of a numeric field; null when no numeric values exist
    Avg(String),
    /// All values of a field, in row order
    Push(String),
    /// Distinct values of a field
    AddToSet(String),
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectField {
    pub name: String,
    pub source: ProjectSource,
}

impl ProjectField {
    pub fn path(name: impl Into<String>, path: impl Into<String>) -> Self {
        ProjectField {
            name: name.into(),
            source: ProjectSource::Path(path.into()),
        }
    }

    pub fn concat(name: impl Into<String>, parts: Vec<ProjectSource>) -> Self {
        ProjectField {
            name: name.into(),
            source: ProjectSource::Concat(parts),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProjectSource {
    Path(String),
    Literal(Value),
    /// String concatenation; null if any part is missing or not a string
    Concat(Vec<ProjectSource>),
}

impl ProjectSource {
    pub fn path(p: impl Into<String>) -> Self {
        ProjectSource::Path(p.into())
    }

    pub fn literal(v: impl Into<Value>) -> Self {
        ProjectSource::Literal(v.into())
    }
}

/// Run a pipeline against a collection. The input rows are the field data
/// of every document in the collection; each stage transforms the row set.
pub fn run(store: &Store, collection: &str, stages: &[Stage]) -> Result<Vec<Value>> {
    let mut rows = store.collection(collection)?.list_data()?;

    for stage in stages {
        rows = apply_stage(store, rows, stage)?;
    }

    Ok(rows)
}

fn apply_stage(store: &Store, rows: Vec<Value>, stage: &Stage) -> Result<Vec<Value>> {
    match stage {
        Stage::Match(filter) => {
            let mut kept = Vec::new();
            for row in rows {
                if filter.matches(&row)? {
                    kept.push(row);
                }
            }
            Ok(kept)
        }

        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        } => {
            let foreign_rows = store.collection(from)?.list_data()?;
            let mut out = Vec::with_capacity(rows.len());
            for mut row in rows {
                let matched: Vec<Value> = match lookup(&row, local_field) {
                    Some(local) if !local.is_null() => foreign_rows
                        .iter()
                        .filter(|f| {
                            lookup(f, foreign_field)
                                .map(|v| compare_values(v, local) == Some(Ordering::Equal) || v == local)
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect(),
                    _ => Vec::new(),
                };
                if let Some(obj) = row.as_object_mut() {
                    obj.insert(as_field.clone(), Value::Array(matched));
                }
                out.push(row);
            }
            Ok(out)
        }

        Stage::Unwind {
            path,
            preserve_empty,
        } => {
            let mut out = Vec::new();
            for row in rows {
                match lookup(&row, path).cloned() {
                    Some(Value::Array(items)) if !items.is_empty() => {
                        for item in items {
                            out.push(set_path(row.clone(), path, item));
                        }
                    }
                    _ => {
                        if *preserve_empty {
                            out.push(set_path(row, path, Value::Null));
                        }
                    }
                }
            }
            Ok(out)
        }

        Stage::Group { key, accumulators } => {
            // First-seen key order keeps grouping deterministic
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for row in rows {
                let k = group_key_value(key, &row)?;
                match groups.iter_mut().find(|(existing, _)| *existing == k) {
                    Some((_, members)) => members.push(row),
                    None => groups.push((k, vec![row])),
                }
            }

            let mut out = Vec::with_capacity(groups.len());
            for (key_value, members) in groups {
                let mut obj = serde_json::Map::new();
                obj.insert("_id".into(), key_value);
                for (name, acc) in accumulators {
                    obj.insert(name.clone(), accumulate(acc, &members));
                }
                out.push(Value::Object(obj));
            }
            Ok(out)
        }

        Stage::Sort { keys } => {
            let mut rows = rows;
            rows.sort_by(|a, b| {
                for key in keys {
                    let ord = compare_at(a, b, &key.field);
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            Ok(rows)
        }

        Stage::Limit(n) => {
            let mut rows = rows;
            rows.truncate(*n);
            Ok(rows)
        }

        Stage::Project(fields) => Ok(rows
            .into_iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for field in fields {
                    obj.insert(field.name.clone(), resolve_source(&field.source, &row));
                }
                Value::Object(obj)
            })
            .collect()),
    }
}

fn group_key_value(key: &GroupKey, row: &Value) -> Result<Value> {
    match key {
        GroupKey::Null => Ok(Value::Null),
        GroupKey::Field(path) => Ok(lookup(row, path).cloned().unwrap_or(Value::Null)),
        GroupKey::YearMonth(path) => {
            let date = lookup(row, path)
                .and_then(Value::as_str)
                .and_then(parse_date);
            match date {
                Some(d) => Ok(json!({ "year": d.year(), "month": d.month() })),
                None => Err(EduHubError::InvalidQuery(format!(
                    "group key '{path}' is not a date field"
                ))),
            }
        }
    }
}

fn accumulate(acc: &Accumulator, members: &[Value]) -> Value {
    match acc {
        Accumulator::Count => json!(members.len()),
        Accumulator::Sum(path) => {
            let total: f64 = members.iter().filter_map(|m| numeric_at(m, path)).sum();
            json!(total)
        }
        Accumulator::Avg(path) => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|m| lookup(m, path).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                Value::Null
            } else {
                json!(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Accumulator::Push(path) => Value::Array(
            members
                .iter()
                .filter_map(|m| lookup(m, path).cloned())
                .filter(|v| !v.is_null())
                .collect(),
        ),
        Accumulator::AddToSet(path) => {
            let mut set: Vec<Value> = Vec::new();
            for member in members {
                if let Some(v) = lookup(member, path) {
                    if !v.is_null() && !set.contains(v) {
                        set.push(v.clone());
                    }
                }
            }
            Value::Array(set)
        }
    }
}

fn numeric_at(row: &Value, path: &str) -> Option<f64> {
    match lookup(row, path)? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Sort comparator for a single key. Null and missing fields rank below
/// every present value, so a descending sort puts them last.
fn compare_at(a: &Value, b: &Value, path: &str) -> Ordering {
    let x = lookup(a, path).filter(|v| !v.is_null());
    let y = lookup(b, path).filter(|v| !v.is_null());
    match (x, y) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn resolve_source(source: &ProjectSource, row: &Value) -> Value {
    match source {
        ProjectSource::Path(path) => lookup(row, path).cloned().unwrap_or(Value::Null),
        ProjectSource::Literal(v) => v.clone(),
        ProjectSource::Concat(parts) => {
            let mut s = String::new();
            for part in parts {
                match resolve_source(part, row) {
                    Value::String(piece) => s.push_str(&piece),
                    _ => return Value::Null,
                }
            }
            Value::String(s)
        }
    }
}

/// Replace the value at a dot-separated path, creating nothing new:
/// if an intermediate segment is missing the row is returned unchanged.
fn set_path(mut row: Value, path: &str, new_value: Value) -> Value {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = &mut row;
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        match current.as_object_mut() {
            Some(obj) => {
                if last {
                    obj.insert((*segment).to_string(), new_value);
                    return row;
                }
                match obj.get_mut(*segment) {
                    Some(next) => current = next,
                    None => return row,
                }
            }
            None => return row,
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_schema;
    use crate::store::Store;
    use pretty_assertions::assert_eq;

    fn seeded_store() -> Store {
        let store = Store::new(default_schema());
        let users = store.collection("users").unwrap();
        users
            .insert(json!({
                "userId": "u0", "email": "ines@example.com", "role": "instructor",
                "firstName": "Ines", "lastName": "Moreau",
            }))
            .unwrap();
        users
            .insert(json!({
                "userId": "u1", "email": "alice@example.com", "role": "student",
                "firstName": "Alice", "lastName": "Chen",
            }))
            .unwrap();
        users
            .insert(json!({
                "userId": "u2", "email": "bob@example.com", "role": "student",
                "firstName": "Bob", "lastName": "Iyer",
            }))
            .unwrap();

        let courses = store.collection("courses").unwrap();
        courses
            .insert(json!({
                "courseId": "c1", "title": "Rust Basics", "instructorId": "u0",
                "category": "Programming", "price": 50, "rating": 4.0,
            }))
            .unwrap();
        courses
            .insert(json!({
                "courseId": "c2", "title": "SQL Deep Dive", "instructorId": "u0",
                "category": "Databases", "price": 80, "rating": 5.0,
            }))
            .unwrap();

        let enrollments = store.collection("enrollments").unwrap();
        for (id, student, course, date, completed) in [
            ("e1", "u1", "c1", "2026-01-15T00:00:00Z", true),
            ("e2", "u2", "c1", "2026-01-20T00:00:00Z", false),
            ("e3", "u1", "c2", "2026-02-01T00:00:00Z", false),
        ] {
            enrollments
                .insert(json!({
                    "enrollmentId": id, "studentId": student, "courseId": course,
                    "enrollmentDate": date, "completed": completed,
                }))
                .unwrap();
        }

        store
    }

    #[test]
    fn match_then_group_counts() {
        let store = seeded_store();
        let rows = run(
            &store,
            "enrollments",
            &[
                Stage::Match(Filter::eq("courseId", "c1")),
                Stage::Group {
                    key: GroupKey::Field("courseId".into()),
                    accumulators: vec![("total".into(), Accumulator::Count)],
                },
            ],
        )
        .unwrap();

        assert_eq!(rows, vec![json!({ "_id": "c1", "total": 2 })]);
    }

    #[test]
    fn lookup_joins_and_unwind_drops_missing() {
        let store = seeded_store();
        // e4 points at a course that does not exist
        store
            .collection("enrollments")
            .unwrap()
            .insert(json!({
                "enrollmentId": "e4", "studentId": "u2", "courseId": "ghost",
            }))
            .unwrap();

        let rows = run(
            &store,
            "enrollments",
            &[
                Stage::Lookup {
                    from: "courses".into(),
                    local_field: "courseId".into(),
                    foreign_field: "courseId".into(),
                    as_field: "course".into(),
                },
                Stage::Unwind {
                    path: "course".into(),
                    preserve_empty: false,
                },
            ],
        )
        .unwrap();

        // 3 seeded enrollments resolve; the dangling one is dropped
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r["course"]["title"].is_string()));
    }

    #[test]
    fn unwind_preserve_empty_keeps_row_with_null() {
        let store = seeded_store();
        store
            .collection("enrollments")
            .unwrap()
            .insert(json!({
                "enrollmentId": "e4", "studentId": "u2", "courseId": "ghost",
            }))
            .unwrap();

        let rows = run(
            &store,
            "enrollments",
            &[
                Stage::Match(Filter::eq("enrollmentId", "e4")),
                Stage::Lookup {
                    from: "courses".into(),
                    local_field: "courseId".into(),
                    foreign_field: "courseId".into(),
                    as_field: "course".into(),
                },
                Stage::Unwind {
                    path: "course".into(),
                    preserve_empty: true,
                },
            ],
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["course"], Value::Null);
    }

    #[test]
    fn group_sum_counts_booleans() {
        let store = seeded_store();
        let rows = run(
            &store,
            "enrollments",
            &[Stage::Group {
                key: GroupKey::Field("courseId".into()),
                accumulators: vec![
                    ("total".into(), Accumulator::Count),
                    ("completed".into(), Accumulator::Sum("completed".into())),
                ],
            }],
        )
        .unwrap();

        let c1 = rows.iter().find(|r| r["_id"] == "c1").unwrap();
        assert_eq!(c1["total"], json!(2));
        assert_eq!(c1["completed"], json!(1.0));
    }

    #[test]
    fn avg_of_empty_group_is_null() {
        let store = seeded_store();
        let rows = run(
            &store,
            "enrollments",
            &[Stage::Group {
                key: GroupKey::Null,
                accumulators: vec![("avgGrade".into(), Accumulator::Avg("grade".into()))],
            }],
        )
        .unwrap();
        assert_eq!(rows[0]["avgGrade"], Value::Null);
    }

    #[test]
    fn empty_collection_aggregates_to_empty() {
        let store = Store::new(default_schema());
        let rows = run(
            &store,
            "submissions",
            &[Stage::Group {
                key: GroupKey::Field("studentId".into()),
                accumulators: vec![("avg".into(), Accumulator::Avg("grade".into()))],
            }],
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn sort_desc_and_limit() {
        let store = seeded_store();
        let rows = run(
            &store,
            "courses",
            &[
                Stage::Sort {
                    keys: vec![SortKey::desc("price")],
                },
                Stage::Limit(1),
            ],
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["courseId"], "c2");
    }

    #[test]
    fn sort_desc_ranks_null_below_numbers() {
        let store = seeded_store();
        let submissions = store.collection("submissions").unwrap();
        // Ungraded submission inserted first so key order would favor it
        submissions
            .insert(json!({
                "submissionId": "s1", "assignmentId": "a1", "studentId": "u1",
            }))
            .unwrap();
        submissions
            .insert(json!({
                "submissionId": "s2", "assignmentId": "a1", "studentId": "u2",
                "grade": 95.0,
            }))
            .unwrap();

        let rows = run(
            &store,
            "submissions",
            &[Stage::Sort {
                keys: vec![SortKey::desc("grade")],
            }],
        )
        .unwrap();

        assert_eq!(rows[0]["submissionId"], "s2");
        assert_eq!(rows[1]["submissionId"], "s1");
    }

    #[test]
    fn year_month_grouping_sorts_chronologically() {
        let store = seeded_store();
        let rows = run(
            &store,
            "enrollments",
            &[
                Stage::Group {
                    key: GroupKey::YearMonth("enrollmentDate".into()),
                    accumulators: vec![("total".into(), Accumulator::Count)],
                },
                Stage::Sort {
                    keys: vec![SortKey::asc("_id.year"), SortKey::asc("_id.month")],
                },
            ],
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], json!({ "year": 2026, "month": 1 }));
        assert_eq!(rows[0]["total"], json!(2));
        assert_eq!(rows[1]["_id"], json!({ "year": 2026, "month": 2 }));
    }

    #[test]
    fn add_to_set_is_distinct() {
        let store = seeded_store();
        let rows = run(
            &store,
            "enrollments",
            &[Stage::Group {
                key: GroupKey::Null,
                accumulators: vec![("students".into(), Accumulator::AddToSet("studentId".into()))],
            }],
        )
        .unwrap();

        let students = rows[0]["students"].as_array().unwrap();
        assert_eq!(students.len(), 2);
    }

    #[test]
    fn project_concat_builds_names() {
        let store = seeded_store();
        let rows = run(
            &store,
            "users",
            &[
                Stage::Match(Filter::eq("userId", "u1")),
                Stage::Project(vec![
                    ProjectField::path("userId", "userId"),
                    ProjectField::concat(
                        "name",
                        vec![
                            ProjectSource::path("firstName"),
                            ProjectSource::literal(" "),
                            ProjectSource::path("lastName"),
                        ],
                    ),
                ]),
            ],
        )
        .unwrap();

        assert_eq!(rows, vec![json!({ "userId": "u1", "name": "Alice Chen" })]);
    }
}
