//! Identity-keyed structural diff.
//!
//! Members of keyed collections are matched by identity, never by position:
//! moving a photo within its array is not a change, and deleting one member
//! while adding another at the same index is always a REMOVE plus an ADD.
//! Operations are emitted in lexicographic key order at every level so that
//! equal inputs serialize to identical diffs.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use verdant_entity::changeset::ChangeOperation;

use crate::identity::{IdentityKeys, join};
use crate::normalize::member_identity;

/// Compute the operations that turn `before` into `after`.
///
/// Both values are expected in canonical shape (see [`crate::normalize`]).
/// Non-object inputs are compared as a whole and yield a single root-level
/// replacement keyed by the empty string.
pub fn diff(before: &Value, after: &Value, keys: &IdentityKeys) -> Vec<ChangeOperation> {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => diff_objects(b, a, "", keys),
        _ if before == after => Vec::new(),
        _ => vec![ChangeOperation::replace("", before.clone(), after.clone())],
    }
}

fn diff_objects(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    path: &str,
    keys: &IdentityKeys,
) -> Vec<ChangeOperation> {
    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let mut ops = Vec::new();

    for field in fields {
        let child_path = join(path, field);
        let key_field = keys.key_for(&child_path);

        match (before.get(field), after.get(field)) {
            (None, None) => {}
            (Some(old), Some(new)) if old == new => {}
            (old, new) if key_field.is_some() && is_array_or_absent(old) && is_array_or_absent(new) => {
                let key_field = key_field.unwrap_or("id");
                let changes = diff_collection(
                    as_slice(old),
                    as_slice(new),
                    &child_path,
                    key_field,
                    keys,
                );
                if !changes.is_empty() {
                    ops.push(ChangeOperation::collection(field.as_str(), key_field, changes));
                }
            }
            (None, Some(new)) => ops.push(ChangeOperation::add(field.as_str(), new.clone())),
            (Some(old), None) => ops.push(ChangeOperation::remove(field.as_str(), old.clone())),
            (Some(Value::Object(old)), Some(Value::Object(new))) => {
                let changes = diff_objects(old, new, &child_path, keys);
                if !changes.is_empty() {
                    ops.push(ChangeOperation::nested(field.as_str(), changes));
                }
            }
            (Some(old), Some(new)) => {
                ops.push(ChangeOperation::replace(field.as_str(), old.clone(), new.clone()))
            }
        }
    }

    ops
}

fn diff_collection(
    before: &[Value],
    after: &[Value],
    path: &str,
    key_field: &str,
    keys: &IdentityKeys,
) -> Vec<ChangeOperation> {
    let before = index_members(before, key_field);
    let after = index_members(after, key_field);
    let identities: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let mut ops = Vec::new();

    for identity in identities {
        match (before.get(identity), after.get(identity)) {
            (None, None) => {}
            (None, Some(new)) => ops.push(ChangeOperation::add(identity.as_str(), (*new).clone())),
            (Some(old), None) => {
                ops.push(ChangeOperation::remove(identity.as_str(), (*old).clone()))
            }
            (Some(old), Some(new)) if old == new => {}
            (Some(Value::Object(old)), Some(Value::Object(new))) => {
                let changes = diff_objects(old, new, path, keys);
                if !changes.is_empty() {
                    ops.push(ChangeOperation::nested(identity.as_str(), changes));
                }
            }
            (Some(old), Some(new)) => ops.push(ChangeOperation::replace(
                identity.as_str(),
                (*old).clone(),
                (*new).clone(),
            )),
        }
    }

    ops
}

/// Index members by identity. Members without an identity cannot be matched
/// and are skipped; the normalizer rejects them before they get here.
fn index_members<'a>(members: &'a [Value], key_field: &str) -> BTreeMap<String, &'a Value> {
    members
        .iter()
        .filter_map(|m| member_identity(m, key_field).map(|id| (id, m)))
        .collect()
}

fn is_array_or_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Array(_)))
}

fn as_slice(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_entity::changeset::ChangeKind;

    fn keys() -> IdentityKeys {
        IdentityKeys::default()
    }

    #[test]
    fn test_root_scalar_update() {
        let ops = diff(
            &json!({"origin": "Andes", "handle": "batata"}),
            &json!({"origin": "Peru", "handle": "batata"}),
            &keys(),
        );
        assert_eq!(ops, vec![ChangeOperation::replace("origin", json!("Andes"), json!("Peru"))]);
    }

    #[test]
    fn test_reordering_is_not_a_change() {
        let before = json!({"photos": [{"id": "a", "storage_id": "1"}, {"id": "b", "storage_id": "2"}]});
        let after = json!({"photos": [{"id": "b", "storage_id": "2"}, {"id": "a", "storage_id": "1"}]});
        assert!(diff(&before, &after, &keys()).is_empty());
    }

    #[test]
    fn test_replace_at_same_index_is_remove_plus_add() {
        let before = json!({"friends": [{"id": "x"}, {"id": "y"}]});
        let after = json!({"friends": [{"id": "x"}, {"id": "z"}]});
        let ops = diff(&before, &after, &keys());
        assert_eq!(ops.len(), 1);
        let kinds: Vec<(ChangeKind, &str)> = ops[0]
            .changes
            .iter()
            .map(|op| (op.kind, op.key.as_str()))
            .collect();
        assert_eq!(kinds, vec![(ChangeKind::Remove, "y"), (ChangeKind::Add, "z")]);
    }

    #[test]
    fn test_nested_member_update_describes_only_changed_fields() {
        let before = json!({"varieties": [
            {"id": "v1", "names": ["Roxa"], "photos": [{"id": "p1", "label": "old", "storage_id": "s"}]},
            {"id": "v2", "names": ["Branca"], "photos": []}
        ]});
        let after = json!({"varieties": [
            {"id": "v1", "names": ["Roxa"], "photos": [{"id": "p1", "label": "new", "storage_id": "s"}]},
            {"id": "v2", "names": ["Branca"], "photos": []}
        ]});

        let ops = diff(&before, &after, &keys());
        let expected = vec![ChangeOperation::collection(
            "varieties",
            "id",
            vec![ChangeOperation::nested(
                "v1",
                vec![ChangeOperation::collection(
                    "photos",
                    "id",
                    vec![ChangeOperation::nested(
                        "p1",
                        vec![ChangeOperation::replace("label", json!("old"), json!("new"))],
                    )],
                )],
            )],
        )];
        assert_eq!(ops, expected);
    }

    #[test]
    fn test_unkeyed_arrays_are_atomic() {
        let ops = diff(
            &json!({"names": ["Aipim", "Mandioca"]}),
            &json!({"names": ["Mandioca", "Aipim"]}),
            &keys(),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, ChangeKind::Update);
        assert_eq!(ops[0].value, Some(json!(["Mandioca", "Aipim"])));
    }

    #[test]
    fn test_output_is_key_ordered_and_deterministic() {
        let before = json!({"origin": "a", "content": "x", "handle": "h"});
        let after = json!({"origin": "b", "content": "y", "handle": "i"});
        let first = serde_json::to_string(&diff(&before, &after, &keys())).unwrap();
        let second = serde_json::to_string(&diff(&before, &after, &keys())).unwrap();
        assert_eq!(first, second);

        let order: Vec<String> = diff(&before, &after, &keys())
            .into_iter()
            .map(|op| op.key)
            .collect();
        assert_eq!(order, vec!["content", "handle", "origin"]);
    }

    #[test]
    fn test_added_and_removed_fields() {
        let ops = diff(&json!({"content": "x"}), &json!({"origin": "Peru"}), &keys());
        assert_eq!(
            ops,
            vec![
                ChangeOperation::remove("content", json!("x")),
                ChangeOperation::add("origin", json!("Peru")),
            ]
        );
    }
}
