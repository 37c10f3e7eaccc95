//! Replaying change operations onto a canonical shape.
//!
//! The target may be newer than the shape the operations were computed
//! against. Replay is tolerant of that: updates of members that no longer
//! exist are skipped, removals of absent members are no-ops, and an ADD of a
//! member that already exists replaces it.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_entity::changeset::{ChangeKind, ChangeOperation};

use crate::identity::{IdentityKeys, join};
use crate::normalize::member_identity;

/// Apply `ops` to `target` in place.
///
/// Added collection members are appended after the existing ones, in the
/// order the operations list them.
pub fn apply_changes(
    target: &mut Value,
    ops: &[ChangeOperation],
    keys: &IdentityKeys,
) -> AppResult<()> {
    let Value::Object(root) = target else {
        return Err(AppError::invalid_input("Changes can only be applied to an object"));
    };
    apply_object(root, "", ops, keys)
}

/// Root fields whose values differ between `before` and `after`, mapped to
/// their value in `after`. A field absent from `after` maps to `null`.
pub fn changed_root_fields(before: &Value, after: &Value) -> BTreeMap<String, Value> {
    let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
        return BTreeMap::new();
    };

    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    fields
        .into_iter()
        .filter(|field| before.get(*field) != after.get(*field))
        .map(|field| (field.clone(), after.get(field).cloned().unwrap_or(Value::Null)))
        .collect()
}

fn apply_object(
    object: &mut Map<String, Value>,
    path: &str,
    ops: &[ChangeOperation],
    keys: &IdentityKeys,
) -> AppResult<()> {
    for op in ops {
        let child_path = join(path, &op.key);

        if let Some(key_field) = op.embedded_key.as_deref() {
            let slot = object
                .entry(op.key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(members) = slot else {
                return Err(AppError::invalid_input(format!(
                    "'{child_path}' is not a collection"
                )));
            };
            apply_collection(members, &child_path, key_field, &op.changes, keys)?;
            continue;
        }

        match op.kind {
            ChangeKind::Add => {
                object.insert(op.key.clone(), required_value(op, &child_path)?);
            }
            ChangeKind::Remove => {
                object.remove(&op.key);
            }
            ChangeKind::Update => {
                if let Some(value) = &op.value {
                    object.insert(op.key.clone(), value.clone());
                } else if let Some(Value::Object(nested)) = object.get_mut(&op.key) {
                    apply_object(nested, &child_path, &op.changes, keys)?;
                } else {
                    debug!(path = %child_path, "Skipping nested update of a missing object");
                }
            }
        }
    }
    Ok(())
}

fn apply_collection(
    members: &mut Vec<Value>,
    path: &str,
    key_field: &str,
    ops: &[ChangeOperation],
    keys: &IdentityKeys,
) -> AppResult<()> {
    for op in ops {
        let position = members
            .iter()
            .position(|m| member_identity(m, key_field).as_deref() == Some(op.key.as_str()));

        match (op.kind, position) {
            (ChangeKind::Add, Some(index)) => {
                members[index] = required_value(op, path)?;
            }
            (ChangeKind::Add, None) => {
                members.push(required_value(op, path)?);
            }
            (ChangeKind::Remove, Some(index)) => {
                members.remove(index);
            }
            (ChangeKind::Remove, None) => {}
            (ChangeKind::Update, None) => {
                debug!(path, identity = %op.key, "Skipping update of a member no longer present");
            }
            (ChangeKind::Update, Some(index)) => {
                if let Some(value) = &op.value {
                    members[index] = value.clone();
                    continue;
                }
                let Value::Object(member) = &mut members[index] else {
                    return Err(AppError::invalid_input(format!(
                        "Member '{}' of '{path}' is not an object",
                        op.key
                    )));
                };
                apply_object(member, path, &op.changes, keys)?;
            }
        }
    }
    Ok(())
}

fn required_value(op: &ChangeOperation, path: &str) -> AppResult<Value> {
    op.value.clone().ok_or_else(|| {
        AppError::invalid_input(format!("{} of '{path}/{}' carries no value", op.kind, op.key))
    })
}
