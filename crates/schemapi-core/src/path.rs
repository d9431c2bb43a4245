//! # Instance Paths
//!
//! A path from the root of a JSON instance to one of its nodes. Validation
//! errors carry one so a user can find the offending value in a large
//! hand-written document without reading the schema.
//!
//! Two renderings are provided:
//!
//! - JSON Pointer (RFC 6901): `/encoding/x/scale/domain/2`
//! - dotted: `encoding.x.scale.domain[2]`, with `(root)` for the empty path.

use std::fmt;

/// One step into a JSON instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// An object member.
    Key(String),
    /// An array element.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A location inside a JSON instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstancePath {
    segments: Vec<PathSegment>,
}

impl InstancePath {
    /// The empty path, pointing at the document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this path points at the document root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The path segments, root first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Append an object member in place.
    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    /// Append an array index in place.
    pub fn push_index(&mut self, index: usize) {
        self.segments.push(PathSegment::Index(index));
    }

    /// Remove the last segment.
    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// A new path one object member deeper.
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push_key(key);
        next
    }

    /// A new path one array element deeper.
    pub fn child_index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.push_index(index);
        next
    }

    /// Prefix every segment of `self` with `parent`.
    pub fn prefixed(&self, parent: &InstancePath) -> Self {
        let mut segments = parent.segments.clone();
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// Render as an RFC 6901 JSON Pointer. The root renders as `""`.
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                PathSegment::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
                PathSegment::Index(i) => out.push_str(&i.to_string()),
            }
        }
        out
    }

    /// Render in dotted form, e.g. `encoding.x.scale.domain[2]`.
    pub fn to_dotted(&self) -> String {
        if self.segments.is_empty() {
            return "(root)".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(k) if is_plain_key(k) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(k);
                }
                PathSegment::Key(k) => {
                    // Quoted through serde_json so embedded quotes are escaped.
                    let quoted = serde_json::Value::String(k.clone()).to_string();
                    out.push('[');
                    out.push_str(&quoted);
                    out.push(']');
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl FromIterator<PathSegment> for InstancePath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> InstancePath {
        let mut p = InstancePath::root();
        p.push_key("encoding");
        p.push_key("x");
        p.push_key("scale");
        p.push_key("domain");
        p.push_index(2);
        p
    }

    #[test]
    fn test_root_rendering() {
        let root = InstancePath::root();
        assert!(root.is_root());
        assert_eq!(root.to_pointer(), "");
        assert_eq!(root.to_dotted(), "(root)");
    }

    #[test]
    fn test_dotted_rendering() {
        assert_eq!(sample().to_dotted(), "encoding.x.scale.domain[2]");
        assert_eq!(sample().to_string(), "encoding.x.scale.domain[2]");
    }

    #[test]
    fn test_pointer_rendering() {
        assert_eq!(sample().to_pointer(), "/encoding/x/scale/domain/2");
    }

    #[test]
    fn test_pointer_escapes_tilde_and_slash() {
        let p = InstancePath::root().child_key("a/b").child_key("c~d");
        assert_eq!(p.to_pointer(), "/a~1b/c~0d");
    }

    #[test]
    fn test_dotted_quotes_unusual_keys() {
        let p = InstancePath::root().child_key("data").child_key("field name");
        assert_eq!(p.to_dotted(), r#"data["field name"]"#);
    }

    #[test]
    fn test_leading_index() {
        let p = InstancePath::root().child_index(0).child_key("mark");
        assert_eq!(p.to_dotted(), "[0].mark");
    }

    #[test]
    fn test_prefixed_and_pop() {
        let parent = InstancePath::root().child_key("layer").child_index(1);
        let child = InstancePath::root().child_key("mark");
        let mut joined = child.prefixed(&parent);
        assert_eq!(joined.to_dotted(), "layer[1].mark");
        assert_eq!(joined.depth(), 3);
        assert_eq!(joined.pop(), Some(PathSegment::Key("mark".into())));
        assert_eq!(joined, parent);
    }

    proptest! {
        /// Depth equals the number of segments pushed, and the pointer has
        /// one slash per segment.
        #[test]
        fn pointer_segment_count(keys in prop::collection::vec("[a-z]{1,6}", 0..8)) {
            let path: InstancePath = keys.iter().map(|k| PathSegment::from(k.as_str())).collect();
            prop_assert_eq!(path.depth(), keys.len());
            prop_assert_eq!(path.to_pointer().matches('/').count(), keys.len());
        }
    }
}
