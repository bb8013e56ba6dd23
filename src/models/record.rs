//! Record helpers
//!
//! Records are ordered JSON objects. The pipeline only ever looks at the
//! identifier field and at whatever the transform changed.

use serde_json::{Map, Value};

/// One document moving through the pipeline
pub type Record = Map<String, Value>;

/// Ordered run of records transferred between stages
pub type Batch = Vec<Record>;

/// Stringified record identifier used for failure matching and retry accounting
pub type RecordId = String;

/// Extract a record's identifier as a string
///
/// String identifiers are returned as-is; any other JSON value uses its JSON
/// rendering so numeric ids still match what the store reports back.
pub fn record_id(record: &Record, id_field: &str) -> Option<RecordId> {
    match record.get(id_field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Look up a possibly dotted field path (`"metadata.title"`)
pub fn field_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Keep only the identifier and the selected fields (dotted paths keep their root)
pub fn project(record: &Record, fields: &[String], id_field: &str) -> Record {
    if fields.is_empty() {
        return record.clone();
    }

    record
        .iter()
        .filter(|(key, _)| {
            key.as_str() == id_field
                || fields.iter().any(|field| {
                    field == *key
                        || field
                            .strip_prefix(key.as_str())
                            .is_some_and(|rest| rest.starts_with('.'))
                })
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
