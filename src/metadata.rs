//! Ordered name/value metadata containers.
//!
//! The flat map is append-only with last-write-wins on duplicate keys and a
//! first-class "most recent" lookup: the TRE interpreter resolves loop
//! counters and variable field lengths by looking backwards through what it
//! has already decoded.

use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Flat, ordered name/value accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct MetadataMap {
    entries: IndexMap<String, String>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. A duplicate key keeps its original position but
    /// takes the new value (last write wins).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Most recent entry whose bare name matches `name`, scanning newest
    /// first. Loop iterations prefix their entries (`0003_NUMPTS`), so a
    /// key matches either exactly or on its suffix at a `_` boundary.
    pub fn most_recent(&self, name: &str) -> Option<&str> {
        for (key, value) in self.entries.iter().rev() {
            if key == name {
                return Some(value);
            }
            if key.ends_with(name) {
                let boundary = key.len() - name.len();
                if key.as_bytes().get(boundary.wrapping_sub(1)) == Some(&b'_') {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Most recent entry parsed as an unsigned integer.
    pub fn most_recent_uint(&self, name: &str) -> Option<u64> {
        crate::field::parse_uint(self.most_recent(name)?.as_bytes())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One node of the nested metadata tree the TRE interpreter emits in
/// structured mode. Leaves carry a value; loop iterations and groups carry
/// children.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MetadataNode {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub value: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<MetadataNode>,
}

impl MetadataNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_keeps_position() {
        let mut m = MetadataMap::new();
        m.insert("A", "1");
        m.insert("B", "2");
        m.insert("A", "3");
        assert_eq!(m.get("A"), Some("3"));
        let keys: Vec<_> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn most_recent_sees_prefixed_entries() {
        let mut m = MetadataMap::new();
        m.insert("NUMPTS", "2");
        m.insert("0001_NUMPTS", "7");
        assert_eq!(m.most_recent("NUMPTS"), Some("7"));
        assert_eq!(m.most_recent_uint("NUMPTS"), Some(7));
    }

    #[test]
    fn most_recent_ignores_partial_names() {
        let mut m = MetadataMap::new();
        m.insert("XNUMPTS", "9");
        assert_eq!(m.most_recent("NUMPTS"), None);
    }
}
