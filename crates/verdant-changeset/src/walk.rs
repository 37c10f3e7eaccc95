//! Flattening a diff to the values it adds.

use serde_json::Value;

use verdant_entity::changeset::{ChangeKind, ChangeOperation};

use crate::identity::join;

/// A value introduced by an ADD somewhere in a diff.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedValue<'a> {
    /// Dotted path of the field, or of the collection the member was added to.
    pub path: String,
    /// Field name or member identity.
    pub key: &'a str,
    /// The added value.
    pub value: &'a Value,
}

impl AddedValue<'_> {
    /// Whether this value was added as a member of the collection `field`
    /// (matched against the last path segment).
    pub fn is_member_of(&self, field: &str) -> bool {
        self.path.rsplit('.').next() == Some(field)
    }
}

/// Every ADD in `ops`, at any depth, in diff order.
pub fn added_values(ops: &[ChangeOperation]) -> Vec<AddedValue<'_>> {
    let mut out = Vec::new();
    walk_object(ops, "", &mut out);
    out
}

fn walk_object<'a>(ops: &'a [ChangeOperation], path: &str, out: &mut Vec<AddedValue<'a>>) {
    for op in ops {
        let child_path = join(path, &op.key);
        if op.embedded_key.is_some() {
            walk_collection(&op.changes, &child_path, out);
        } else if op.kind == ChangeKind::Add {
            if let Some(value) = &op.value {
                out.push(AddedValue {
                    path: child_path,
                    key: &op.key,
                    value,
                });
            }
        } else {
            walk_object(&op.changes, &child_path, out);
        }
    }
}

fn walk_collection<'a>(ops: &'a [ChangeOperation], path: &str, out: &mut Vec<AddedValue<'a>>) {
    for op in ops {
        match (op.kind, &op.value) {
            (ChangeKind::Add, Some(value)) => out.push(AddedValue {
                path: path.to_string(),
                key: &op.key,
                value,
            }),
            (ChangeKind::Update, None) => walk_object(&op.changes, path, out),
            _ => {}
        }
    }
}
