use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// One traversal step from a parent container to a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Structural path from the document root, displayed as `.key` / `[index]` steps.
///
/// Keys are written verbatim: a key containing `.` or `[` produces a path that
/// cannot be parsed back unambiguously. Use [`KeyPath::resolve`] for lookups
/// instead of re-parsing the display string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<PathSegment>);

impl KeyPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child_key(&self, key: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The key of the last step, if the last step was an object member.
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Walk `root` along this path.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments().iter().try_fold(root, |node, segment| match (segment, node) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k),
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.segments() {
            match segment {
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_displays_empty() {
        assert_eq!(KeyPath::root().to_string(), "");
        assert!(KeyPath::root().is_root());
    }

    #[test]
    fn display_mixes_keys_and_indices() {
        let path = KeyPath::root().child_key("items").child_index(3).child_key("id");
        assert_eq!(path.to_string(), ".items[3].id");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.last_key(), Some("id"));
        assert_eq!(path.segments()[1], PathSegment::Index(3));
    }

    #[test]
    fn keys_with_punctuation_are_not_escaped() {
        let path = KeyPath::root().child_key("a.b").child_key("c[0]");
        assert_eq!(path.to_string(), ".a.b.c[0]");
    }

    #[test]
    fn resolve_walks_structure() {
        let doc = json!({"a": [{"b": true}, {"c": null}]});
        let path = KeyPath::root().child_key("a").child_index(1).child_key("c");
        assert_eq!(path.resolve(&doc), Some(&Value::Null));
        assert_eq!(KeyPath::root().resolve(&doc), Some(&doc));
    }

    #[test]
    fn resolve_rejects_shape_mismatch() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(KeyPath::root().child_key("a").child_key("0").resolve(&doc), None);
        assert_eq!(KeyPath::root().child_index(0).resolve(&doc), None);
        assert_eq!(KeyPath::root().child_key("a").child_index(9).resolve(&doc), None);
    }

    #[test]
    fn serializes_as_display_string() {
        let path = KeyPath::root().child_key("x").child_index(0);
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(".x[0]"));
    }
}
