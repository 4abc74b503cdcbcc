//! Layer 2: Tags
//!
//! Tags: sorted key/value attribute map, keys unique.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute tags - sorted, deduplicated by key.
///
/// Insertion order is irrelevant; BTreeMap keeps the principal form by
/// construction, so structural equality is order-independent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a tag, returning the previous value for the key if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_by_key() {
        let mut tags = Tags::new();
        assert_eq!(tags.insert("highway", "residential"), None);
        assert_eq!(
            tags.insert("highway", "primary"),
            Some("residential".to_string())
        );
        assert_eq!(tags.get("highway"), Some("primary"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a: Tags = [("name", "A"), ("ref", "B")].into_iter().collect();
        let b: Tags = [("ref", "B"), ("name", "A")].into_iter().collect();
        assert_eq!(a, b);
    }
}
