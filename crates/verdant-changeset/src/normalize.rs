//! Canonical shape of an aggregate before diffing.
//!
//! Both sides of every diff go through [`normalize_value`]. In the canonical
//! shape:
//!
//! - `null` fields are absent (the two are never distinguished),
//! - every keyed collection the configuration expects is present, possibly empty,
//! - every keyed member carries a unique, non-empty identity,
//! - store-managed root fields (the revision counter) are dropped.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};

use verdant_core::error::AppError;
use verdant_core::result::AppResult;

use crate::identity::{IdentityKeys, join};

/// Root fields maintained by the store rather than by contributors.
const STORE_MANAGED_FIELDS: &[&str] = &["revision"];

/// Serialize an aggregate and bring it to canonical shape.
pub fn normalize<T: Serialize>(aggregate: &T, keys: &IdentityKeys) -> AppResult<Value> {
    normalize_value(serde_json::to_value(aggregate)?, keys)
}

/// Bring an already-serialized aggregate to canonical shape.
pub fn normalize_value(value: Value, keys: &IdentityKeys) -> AppResult<Value> {
    let Value::Object(mut root) = value else {
        return Err(AppError::invalid_input("Aggregate must be a JSON object"));
    };
    for field in STORE_MANAGED_FIELDS {
        root.remove(*field);
    }
    Ok(Value::Object(normalize_object(root, "", keys)?))
}

/// Identity of a collection member as a string key.
///
/// Returns `None` when the member is not an object or its identity field is
/// missing, null, empty, or not a scalar.
pub fn member_identity(member: &Value, key_field: &str) -> Option<String> {
    match member.as_object()?.get(key_field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_object(
    object: Map<String, Value>,
    path: &str,
    keys: &IdentityKeys,
) -> AppResult<Map<String, Value>> {
    let mut out = Map::new();

    for (field, value) in object {
        if value.is_null() {
            continue;
        }
        let child_path = join(path, &field);
        let normalized = match keys.key_for(&child_path) {
            Some(key_field) => normalize_collection(value, &child_path, key_field, keys)?,
            None => normalize_plain(value, &child_path, keys)?,
        };
        out.insert(field, normalized);
    }

    for (field, _) in keys.children_of(path) {
        out.entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    Ok(out)
}

fn normalize_collection(
    value: Value,
    path: &str,
    key_field: &str,
    keys: &IdentityKeys,
) -> AppResult<Value> {
    let Value::Array(members) = value else {
        return Err(AppError::invalid_input(format!(
            "Collection '{path}' must be an array"
        )));
    };

    let mut seen = HashSet::with_capacity(members.len());
    let mut out = Vec::with_capacity(members.len());

    for member in members {
        let identity = member_identity(&member, key_field).ok_or_else(|| {
            AppError::invalid_input(format!(
                "Every member of '{path}' needs a '{key_field}' identity"
            ))
        })?;
        if !seen.insert(identity.clone()) {
            return Err(AppError::invalid_input(format!(
                "Duplicate identity '{identity}' in '{path}'"
            )));
        }
        let Value::Object(fields) = member else {
            return Err(AppError::invalid_input(format!(
                "Members of '{path}' must be objects"
            )));
        };
        out.push(Value::Object(normalize_object(fields, path, keys)?));
    }

    Ok(Value::Array(out))
}

fn normalize_plain(value: Value, path: &str, keys: &IdentityKeys) -> AppResult<Value> {
    match value {
        Value::Object(fields) => Ok(Value::Object(normalize_object(fields, path, keys)?)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(Value::Object(normalize_object(fields, path, keys)?)),
                other => Ok(other),
            })
            .collect::<AppResult<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_core::error::ErrorKind;

    #[test]
    fn test_null_and_absent_collapse() {
        let keys = IdentityKeys::default();
        let with_null = normalize_value(json!({"id": "v", "origin": null}), &keys).unwrap();
        let without = normalize_value(json!({"id": "v"}), &keys).unwrap();
        assert_eq!(with_null, without);
        assert!(with_null.get("origin").is_none());
    }

    #[test]
    fn test_keyed_collections_always_present() {
        let keys = IdentityKeys::default();
        let out = normalize_value(
            json!({"id": "v", "varieties": [{"id": "a", "names": ["Roxa"]}]}),
            &keys,
        )
        .unwrap();
        assert_eq!(out["photos"], json!([]));
        assert_eq!(out["friends"], json!([]));
        assert_eq!(out["varieties"][0]["photos"], json!([]));
    }

    #[test]
    fn test_revision_dropped() {
        let keys = IdentityKeys::default();
        let out = normalize_value(json!({"id": "v", "revision": 7}), &keys).unwrap();
        assert!(out.get("revision").is_none());
    }

    #[test]
    fn test_missing_identity_rejected() {
        let keys = IdentityKeys::default();
        let err = normalize_value(json!({"photos": [{"label": "x"}]}), &keys).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let keys = IdentityKeys::default();
        let err = normalize_value(
            json!({"tips": [{"id": "t", "content": "a"}, {"id": "t", "content": "b"}]}),
            &keys,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_nested_nulls_stripped() {
        let keys = IdentityKeys::default();
        let out = normalize_value(
            json!({"photos": [{"id": "p", "label": null, "sources": [{"id": "s", "credits": null}]}]}),
            &keys,
        )
        .unwrap();
        assert_eq!(out["photos"][0], json!({"id": "p", "sources": [{"id": "s"}]}));
    }

    #[test]
    fn test_non_object_rejected() {
        let keys = IdentityKeys::default();
        assert!(normalize_value(json!([1, 2]), &keys).is_err());
    }
}
