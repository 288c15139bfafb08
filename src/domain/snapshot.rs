//! Snapshot serialization and field-level diffs.
//!
//! A snapshot is the entity's serde representation as a JSON object, so
//! instants come out as RFC 3339 strings, UUIDs as strings and references
//! (which entities store as ids) as the referenced id.

use {
    super::error::AuditError,
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
};

pub type Snapshot = Map<String, Value>;

/// Serialize an entity into a snapshot. `None` in, `None` out.
pub fn serialize<E: Serialize>(entity: Option<&E>) -> Result<Option<Snapshot>, AuditError> {
    let Some(entity) = entity else {
        return Ok(None);
    };

    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(AuditError::Validation(format!(
            "entity must serialize to an object, got: {other}"
        ))),
    }
}

pub fn deserialize<E: DeserializeOwned>(snapshot: &Snapshot) -> Result<E, AuditError> {
    Ok(serde_json::from_value(Value::Object(snapshot.clone()))?)
}

/// Names of the fields in `new` whose value differs from `old`, in `new`'s
/// field order.
///
/// Returns `None` both when there is no prior state and when nothing changed;
/// the record's action tells the two apart.
pub fn diff(old: Option<&Snapshot>, new: &Snapshot) -> Option<Vec<String>> {
    let old = old?;

    let changed: Vec<String> = new
        .iter()
        .filter(|(field, value)| old.get(field.as_str()) != Some(*value))
        .map(|(field, _)| field.clone())
        .collect();

    (!changed.is_empty()).then_some(changed)
}
