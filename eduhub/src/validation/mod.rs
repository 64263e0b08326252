use crate::error::{EduHubError, Result};
use crate::schema::{CollectionDefinition, FieldDefinition, FieldType};
use serde_json::Value;

/// Result of validating a document
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a document's data against its collection definition.
/// Every rule violation is collected; the store rejects the write when
/// any error is present (no partial writes).
pub fn validate_document(collection: &CollectionDefinition, data: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let obj = match data.as_object() {
        Some(o) => o,
        None => {
            result.errors.push("Document must be a JSON object".into());
            return result;
        }
    };

    // Check required fields and validate each declared field
    for (field_name, field_def) in &collection.fields {
        let value = obj.get(field_name);

        if field_def.required && (value.is_none() || value == Some(&Value::Null)) {
            if field_def.default.is_none() {
                result
                    .errors
                    .push(format!("Required field '{field_name}' is missing"));
            }
            continue;
        }

        if let Some(val) = value {
            if *val != Value::Null {
                validate_field_value(field_name, field_def, val, &mut result);
            }
        }
    }

    // Check for additional properties
    if !collection.additional_properties {
        for key in obj.keys() {
            if !collection.fields.contains_key(key) {
                result.errors.push(format!(
                    "Unexpected field '{key}' (additional_properties is false)"
                ));
            }
        }
    }

    result
}

/// Apply default values to a document's data. Modifies the data in place.
pub fn apply_defaults(collection: &CollectionDefinition, data: &mut Value) {
    let obj = match data.as_object_mut() {
        Some(o) => o,
        None => return,
    };

    for (field_name, field_def) in &collection.fields {
        let has_value = obj
            .get(field_name)
            .map(|v| *v != Value::Null)
            .unwrap_or(false);

        if !has_value {
            if let Some(default) = &field_def.default {
                obj.insert(field_name.clone(), default.clone());
            }
        }
    }
}

/// Validate and apply defaults. Returns an error if validation fails.
pub fn validate_and_prepare(collection: &CollectionDefinition, data: &mut Value) -> Result<()> {
    apply_defaults(collection, data);
    let result = validate_document(collection, data);

    if !result.is_ok() {
        return Err(EduHubError::Validation(format!(
            "Document validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }

    Ok(())
}

fn validate_field_value(
    field_name: &str,
    field_def: &FieldDefinition,
    value: &Value,
    result: &mut ValidationResult,
) {
    match &field_def.field_type {
        FieldType::String => {
            let s = match value.as_str() {
                Some(s) => s,
                None => {
                    result.errors.push(format!(
                        "Field '{field_name}' expected string, got {}",
                        type_name(value)
                    ));
                    return;
                }
            };

            if let Some(enum_values) = &field_def.enum_values {
                if !enum_values.iter().any(|e| e == s) {
                    result.errors.push(format!(
                        "Field '{field_name}' value '{s}' is not in enum: {enum_values:?}"
                    ));
                }
            }

            if let Some(pattern) = &field_def.pattern {
                match regex::Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(s) {
                            result.errors.push(format!(
                                "Field '{field_name}' value '{s}' does not match pattern '{pattern}'"
                            ));
                        }
                    }
                    Err(e) => {
                        result.errors.push(format!(
                            "Field '{field_name}' has an invalid pattern '{pattern}': {e}"
                        ));
                    }
                }
            }
        }
        FieldType::Number => {
            match value.as_f64() {
                Some(n) => check_bounds(field_name, field_def, n, result),
                None => result.errors.push(format!(
                    "Field '{field_name}' expected number, got {}",
                    type_name(value)
                )),
            };
        }
        FieldType::Int => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                result.errors.push(format!(
                    "Field '{field_name}' expected integer, got {}",
                    type_name(value)
                ));
            } else if let Some(n) = value.as_f64() {
                check_bounds(field_name, field_def, n, result);
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                result.errors.push(format!(
                    "Field '{field_name}' expected boolean, got {}",
                    type_name(value)
                ));
            }
        }
        FieldType::Date => match value.as_str() {
            Some(s) if parse_date(s).is_some() => {}
            Some(s) => {
                result.errors.push(format!(
                    "Field '{field_name}' value '{s}' is not an RFC 3339 datetime or YYYY-MM-DD date"
                ));
            }
            None => {
                result.errors.push(format!(
                    "Field '{field_name}' expected date string, got {}",
                    type_name(value)
                ));
            }
        },
        FieldType::Array => {
            let items = match value.as_array() {
                Some(items) => items,
                None => {
                    result.errors.push(format!(
                        "Field '{field_name}' expected array, got {}",
                        type_name(value)
                    ));
                    return;
                }
            };

            if let Some(item_type) = &field_def.items {
                for (i, item) in items.iter().enumerate() {
                    let ok = match item_type.as_str() {
                        "string" => item.is_string(),
                        "number" => item.is_number(),
                        "boolean" => item.is_boolean(),
                        "object" => item.is_object(),
                        _ => true,
                    };
                    if !ok {
                        result.errors.push(format!(
                            "Field '{field_name}[{i}]' expected {item_type}, got {}",
                            type_name(item)
                        ));
                    }
                }
            }
        }
        FieldType::Object => {
            if !value.is_object() {
                result.errors.push(format!(
                    "Field '{field_name}' expected object, got {}",
                    type_name(value)
                ));
            }
        }
        FieldType::Ref => {
            // Refs hold the target document's key as a string. Existence of
            // the referenced document is application convention, not checked.
            if !value.is_string() {
                result.errors.push(format!(
                    "Field '{field_name}' (ref) expected string ID, got {}",
                    type_name(value)
                ));
            }
        }
    }
}

fn check_bounds(field_name: &str, field_def: &FieldDefinition, n: f64, result: &mut ValidationResult) {
    if let Some(min) = field_def.minimum {
        if n < min {
            result
                .errors
                .push(format!("Field '{field_name}' value {n} is below minimum {min}"));
        }
    }
    if let Some(max) = field_def.maximum {
        if n > max {
            result
                .errors
                .push(format!("Field '{field_name}' value {n} is above maximum {max}"));
        }
    }
}

/// Parse a date field value: full RFC 3339 datetime or a bare calendar date.
pub fn parse_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, NaiveDate, Utc};

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_schema;
    use serde_json::json;

    #[test]
    fn valid_user() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let data = json!({
            "userId": "u1",
            "email": "alice@example.com",
            "role": "student",
        });

        let result = validate_document(users, &data);
        assert!(result.is_ok(), "errors: {:?}", result.errors);
    }

    #[test]
    fn missing_required_field() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let data = json!({ "userId": "u1", "role": "student" });

        let result = validate_document(users, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("email")));
    }

    #[test]
    fn invalid_email_pattern() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let data = json!({
            "userId": "u1",
            "email": "not-an-email",
            "role": "student",
        });

        let result = validate_document(users, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("pattern")));
    }

    #[test]
    fn invalid_enum_value() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let data = json!({
            "userId": "u1",
            "email": "alice@example.com",
            "role": "superadmin",
        });

        let result = validate_document(users, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("superadmin")));
    }

    #[test]
    fn progress_out_of_range() {
        let schema = default_schema();
        let enrollments = &schema.collections["enrollments"];
        let data = json!({
            "enrollmentId": "e1",
            "studentId": "u1",
            "courseId": "c1",
            "progress": 1.2,
        });

        let result = validate_document(enrollments, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("maximum")));
    }

    #[test]
    fn rating_out_of_range() {
        let schema = default_schema();
        let courses = &schema.collections["courses"];
        let data = json!({
            "courseId": "c1",
            "title": "Intro to Rust",
            "instructorId": "u9",
            "category": "Programming",
            "rating": 0.5,
        });

        let result = validate_document(courses, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("minimum")));
    }

    #[test]
    fn tags_must_be_string_array() {
        let schema = default_schema();
        let courses = &schema.collections["courses"];
        let data = json!({
            "courseId": "c1",
            "title": "Intro to Rust",
            "instructorId": "u9",
            "category": "Programming",
            "tags": ["rust", 42],
        });

        let result = validate_document(courses, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("tags[1]")));
    }

    #[test]
    fn date_field_accepts_rfc3339_and_bare_date() {
        let schema = default_schema();
        let assignments = &schema.collections["assignments"];
        for due in ["2026-09-01T12:00:00Z", "2026-09-01"] {
            let data = json!({
                "assignmentId": "a1",
                "courseId": "c1",
                "title": "Homework 1",
                "dueDate": due,
            });
            let result = validate_document(assignments, &data);
            assert!(result.is_ok(), "{due}: {:?}", result.errors);
        }
    }

    #[test]
    fn date_field_rejects_garbage() {
        let schema = default_schema();
        let assignments = &schema.collections["assignments"];
        let data = json!({
            "assignmentId": "a1",
            "courseId": "c1",
            "title": "Homework 1",
            "dueDate": "next tuesday",
        });
        let result = validate_document(assignments, &data);
        assert!(!result.is_ok());
    }

    #[test]
    fn additional_properties_rejected() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let data = json!({
            "userId": "u1",
            "email": "alice@example.com",
            "role": "student",
            "favoriteColor": "green",
        });

        let result = validate_document(users, &data);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("favoriteColor")));
    }

    #[test]
    fn apply_defaults_fills_missing() {
        let schema = default_schema();
        let enrollments = &schema.collections["enrollments"];
        let mut data = json!({
            "enrollmentId": "e1",
            "studentId": "u1",
            "courseId": "c1",
        });

        apply_defaults(enrollments, &mut data);
        assert_eq!(data["progress"], json!(0.0));
        assert_eq!(data["completed"], json!(false));
        assert_eq!(data["certificateIssued"], json!(false));
    }

    #[test]
    fn apply_defaults_doesnt_overwrite() {
        let schema = default_schema();
        let enrollments = &schema.collections["enrollments"];
        let mut data = json!({
            "enrollmentId": "e1",
            "studentId": "u1",
            "courseId": "c1",
            "progress": 0.7,
        });

        apply_defaults(enrollments, &mut data);
        assert_eq!(data["progress"], json!(0.7));
    }

    #[test]
    fn validate_and_prepare_rejects_bad_document() {
        let schema = default_schema();
        let users = &schema.collections["users"];
        let mut data = json!({ "userId": "u1" });
        assert!(validate_and_prepare(users, &mut data).is_err());
    }
}
