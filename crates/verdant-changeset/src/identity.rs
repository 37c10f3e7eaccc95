//! Identity keys for collection members.

use std::collections::BTreeMap;

/// Maps a dotted collection path to the member field that identifies
/// members of that collection.
///
/// Paths are chains of collection field names from the aggregate root,
/// skipping member identities: the photos of any variety live at
/// `varieties.photos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKeys {
    keys: BTreeMap<String, String>,
}

impl IdentityKeys {
    /// An empty configuration: every array is diffed as an atomic value.
    pub fn empty() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    /// Register a keyed collection path.
    pub fn with(mut self, path: impl Into<String>, key_field: impl Into<String>) -> Self {
        self.keys.insert(path.into(), key_field.into());
        self
    }

    /// The identity field for members at `path`, if that path is keyed.
    pub fn key_for(&self, path: &str) -> Option<&str> {
        self.keys.get(path).map(String::as_str)
    }

    /// Keyed collection paths directly below `parent` (`""` is the root),
    /// as `(field, key_field)` pairs.
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.keys.iter().filter_map(move |(path, key)| {
            let field = if parent.is_empty() {
                path.as_str()
            } else {
                path.strip_prefix(parent)?.strip_prefix('.')?
            };
            (!field.contains('.')).then_some((field, key.as_str()))
        })
    }
}

impl Default for IdentityKeys {
    /// The collections of the vegetable aggregate, all keyed by `id`.
    fn default() -> Self {
        [
            "photos",
            "photos.sources",
            "sources",
            "varieties",
            "varieties.photos",
            "varieties.photos.sources",
            "varieties.sources",
            "tips",
            "tips.sources",
            "friends",
        ]
        .into_iter()
        .fold(Self::empty(), |keys, path| keys.with(path, "id"))
    }
}

/// Join a parent path and a field name.
pub(crate) fn join(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let keys = IdentityKeys::default();
        assert_eq!(keys.key_for("varieties.photos"), Some("id"));
        assert_eq!(keys.key_for("tips.sources"), Some("id"));
        assert_eq!(keys.key_for("varieties.sources"), Some("id"));
        assert_eq!(keys.key_for("names"), None);
    }

    #[test]
    fn test_children_of() {
        let keys = IdentityKeys::default();
        let root: Vec<&str> = keys.children_of("").map(|(f, _)| f).collect();
        assert_eq!(root, vec!["friends", "photos", "sources", "tips", "varieties"]);

        let variety: Vec<&str> = keys.children_of("varieties").map(|(f, _)| f).collect();
        assert_eq!(variety, vec!["photos", "sources"]);

        assert_eq!(keys.children_of("friends").count(), 0);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "photos"), "photos");
        assert_eq!(join("varieties", "photos"), "varieties.photos");
    }
}
