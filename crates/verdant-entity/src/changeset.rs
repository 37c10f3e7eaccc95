//! Structural change operations stored inside an edit suggestion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A field or collection member exists only after the edit.
    Add,
    /// A field or collection member exists on both sides with different content.
    Update,
    /// A field or collection member exists only before the edit.
    Remove,
}

impl ChangeKind {
    /// Return the kind as an uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of a structural diff.
///
/// `key` is a field name, or the identity value of a collection member when
/// the operation sits inside a keyed collection. Containers (a keyed
/// collection, or a member of one) describe their edits through nested
/// `changes` instead of replacing the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOperation {
    /// ADD, UPDATE or REMOVE.
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Field name or member identity.
    pub key: String,
    /// Identity field used to match the members of this collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_key: Option<String>,
    /// New value (ADD, scalar UPDATE).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Previous value (REMOVE, scalar UPDATE).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Nested operations for container updates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeOperation>,
}

impl ChangeOperation {
    /// An ADD carrying the new value.
    pub fn add(key: impl Into<String>, value: Value) -> Self {
        Self {
            kind: ChangeKind::Add,
            key: key.into(),
            embedded_key: None,
            value: Some(value),
            old_value: None,
            changes: Vec::new(),
        }
    }

    /// A REMOVE carrying the previous value.
    pub fn remove(key: impl Into<String>, old_value: Value) -> Self {
        Self {
            kind: ChangeKind::Remove,
            key: key.into(),
            embedded_key: None,
            value: None,
            old_value: Some(old_value),
            changes: Vec::new(),
        }
    }

    /// A flat UPDATE replacing one value with another.
    pub fn replace(key: impl Into<String>, old_value: Value, value: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            key: key.into(),
            embedded_key: None,
            value: Some(value),
            old_value: Some(old_value),
            changes: Vec::new(),
        }
    }

    /// An UPDATE of a keyed collection.
    pub fn collection(
        key: impl Into<String>,
        embedded_key: impl Into<String>,
        changes: Vec<ChangeOperation>,
    ) -> Self {
        Self {
            kind: ChangeKind::Update,
            key: key.into(),
            embedded_key: Some(embedded_key.into()),
            value: None,
            old_value: None,
            changes,
        }
    }

    /// An UPDATE of a nested object (collection member) described field by field.
    pub fn nested(key: impl Into<String>, changes: Vec<ChangeOperation>) -> Self {
        Self {
            kind: ChangeKind::Update,
            key: key.into(),
            embedded_key: None,
            value: None,
            old_value: None,
            changes,
        }
    }

    /// Total number of operations in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.changes.iter().map(ChangeOperation::count).sum::<usize>()
    }
}
