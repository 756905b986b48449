//! JSON-Pointer-style addressing (RFC 6901 subset) over [`crate::value::State`].
//!
//! A [`Path`] is immutable and normalized to its segment list at parse time;
//! [`Pointer`] provides the pure resolve/assign/remove operations that walk a
//! state tree along a path.

use crate::error::CoreError;
use crate::value::State;
use serde_json::{Map, Value};
use std::fmt;

/// An RFC 6901-style JSON pointer: the empty path addresses the whole state,
/// anything else is a `/`-joined, non-empty list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path (`""`), addressing the whole state.
    pub fn root() -> Self {
        Path { segments: Vec::new() }
    }

    /// Parses a string of the form `""`, `"/"`, or `"/a/b/c"`.
    ///
    /// Each segment must be non-empty; `//` or a trailing `/` is invalid.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() || raw == "/" {
            return Ok(Path::root());
        }
        if !raw.starts_with('/') {
            return Err(CoreError::PathInvalid(raw.to_string()));
        }
        let mut segments = Vec::new();
        for seg in raw[1..].split('/') {
            if seg.is_empty() {
                return Err(CoreError::PathInvalid(raw.to_string()));
            }
            segments.push(unescape_segment(seg));
        }
        Ok(Path { segments })
    }

    /// Builds a path from an explicit segment list, skipping validation
    /// beyond non-emptiness of each segment.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::PathInvalid("<empty segment>".to_string()));
        }
        Ok(Path { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The parent path; `parent(root) = root`.
    pub fn parent(&self) -> Path {
        if self.segments.is_empty() {
            self.clone()
        } else {
            Path {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            }
        }
    }

    /// The final segment, or `None` at root.
    pub fn basename(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Appends a single segment, returning a new path.
    pub fn join(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Path { segments }
    }

    /// Whether `self` is a strict ancestor of `other` (i.e. `other` is nested
    /// under `self`, not equal to it).
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "");
        }
        for seg in &self.segments {
            write!(f, "/{}", escape_segment(seg))?;
        }
        Ok(())
    }
}

fn escape_segment(seg: &str) -> String {
    seg.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(seg: &str) -> String {
    seg.replace("~1", "/").replace("~0", "~")
}

/// Pure resolve/assign/remove operations over a [`State`] tree, addressed by
/// [`Path`].
pub struct Pointer;

impl Pointer {
    /// Resolves `path` against `state`. Returns `None` iff any intermediate
    /// segment is missing or of the wrong kind (indexing a scalar, or a
    /// non-numeric index into a sequence).
    pub fn resolve<'a>(state: &'a State, path: &Path) -> Option<&'a Value> {
        let mut current = state;
        for seg in path.segments() {
            current = step(current, seg)?;
        }
        Some(current)
    }

    /// Mutable variant of [`Pointer::resolve`], used internally by
    /// assign/remove.
    fn resolve_mut<'a>(state: &'a mut State, path: &Path) -> Option<&'a mut Value> {
        let mut current = state;
        for seg in path.segments() {
            current = step_mut(current, seg)?;
        }
        Some(current)
    }

    /// Assigns `value` at `path`, creating intermediate object containers as
    /// needed. Assigning at root replaces the whole state.
    pub fn assign(state: &mut State, path: &Path, value: Value) {
        if path.is_root() {
            *state = value;
            return;
        }
        let parent_path = path.parent();
        let key = path.basename().expect("non-root path has a basename");
        ensure_container(state, &parent_path);
        if let Some(parent) = Pointer::resolve_mut(state, &parent_path) {
            assign_child(parent, key, value);
        }
    }

    /// Removes the entry at `path` from its parent container. Removing at
    /// root is an error.
    pub fn remove(state: &mut State, path: &Path) -> Result<(), CoreError> {
        if path.is_root() {
            return Err(CoreError::Internal(
                "cannot remove the root of a state tree".to_string(),
            ));
        }
        let parent_path = path.parent();
        let key = path.basename().expect("non-root path has a basename");
        if let Some(parent) = Pointer::resolve_mut(state, &parent_path) {
            remove_child(parent, key);
        }
        Ok(())
    }
}

fn step<'a>(value: &'a Value, seg: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, seg: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(move |i| arr.get_mut(i)),
        _ => None,
    }
}

/// Ensures every intermediate container along `path` exists, creating
/// objects as necessary (never arrays — array elements are only created via
/// explicit index assignment on an existing array).
fn ensure_container(state: &mut State, path: &Path) {
    let mut current = state;
    for seg in path.segments() {
        if !matches!(current, Value::Object(_) | Value::Array(_)) {
            *current = Value::Object(Map::new());
        }
        if matches!(current, Value::Array(_)) && seg.parse::<usize>().is_err() {
            // Non-numeric segment against an array: fall back to
            // treating this position as an object.
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => {
                current = map.entry(seg.clone()).or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Array(arr) => {
                let i = seg.parse::<usize>().expect("non-numeric segment handled above");
                while arr.len() <= i {
                    arr.push(Value::Null);
                }
                current = &mut arr[i];
            }
            _ => unreachable!("container check above forces Object or Array"),
        }
    }
}

fn assign_child(parent: &mut Value, key: &str, value: Value) {
    match parent {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
        }
        Value::Array(arr) => {
            if let Ok(i) = key.parse::<usize>() {
                while arr.len() <= i {
                    arr.push(Value::Null);
                }
                arr[i] = value;
            }
        }
        _ => {
            *parent = Value::Object(Map::from_iter([(key.to_string(), value)]));
        }
    }
}

fn remove_child(parent: &mut Value, key: &str) {
    match parent {
        Value::Object(map) => {
            map.remove(key);
        }
        Value::Array(arr) => {
            if let Ok(i) = key.parse::<usize>() {
                if i < arr.len() {
                    arr.remove(i);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_root() {
        assert_eq!(Path::parse("").unwrap(), Path::root());
        assert_eq!(Path::parse("/").unwrap(), Path::root());
    }

    #[test]
    fn parses_segments() {
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.segments(), &["a", "b", "c"]);
        assert_eq!(p.to_string(), "/a/b/c");
    }

    #[test]
    fn rejects_malformed() {
        assert!(Path::parse("a/b").is_err());
        assert!(Path::parse("/a//b").is_err());
    }

    #[test]
    fn parent_and_basename() {
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.parent(), Path::parse("/a/b").unwrap());
        assert_eq!(p.basename(), Some("c"));
        assert_eq!(Path::root().parent(), Path::root());
    }

    #[test]
    fn join_appends_one_segment() {
        let p = Path::parse("/a").unwrap().join("b");
        assert_eq!(p, Path::parse("/a/b").unwrap());
    }

    #[test]
    fn resolve_walks_objects_and_arrays() {
        let s = json!({"a": {"b": [1, 2, {"c": "e"}]}});
        let p = Path::parse("/a/b/2/c").unwrap();
        assert_eq!(Pointer::resolve(&s, &p), Some(&json!("e")));
    }

    #[test]
    fn resolve_missing_returns_none() {
        let s = json!({"a": 1});
        assert_eq!(Pointer::resolve(&s, &Path::parse("/a/b").unwrap()), None);
        assert_eq!(Pointer::resolve(&s, &Path::parse("/z").unwrap()), None);
    }

    #[test]
    fn resolve_root_returns_whole_state() {
        let s = json!({"a": 1});
        assert_eq!(Pointer::resolve(&s, &Path::root()), Some(&s));
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let mut s = json!({});
        Pointer::assign(&mut s, &Path::parse("/a/b").unwrap(), json!(5));
        assert_eq!(s, json!({"a": {"b": 5}}));
    }

    #[test]
    fn assign_at_root_replaces_state() {
        let mut s = json!({"a": 1});
        Pointer::assign(&mut s, &Path::root(), json!({"z": 9}));
        assert_eq!(s, json!({"z": 9}));
    }

    #[test]
    fn remove_deletes_object_key() {
        let mut s = json!({"a": {"b": 1, "c": 2}});
        Pointer::remove(&mut s, &Path::parse("/a/b").unwrap()).unwrap();
        assert_eq!(s, json!({"a": {"c": 2}}));
    }

    #[test]
    fn remove_splices_array_element() {
        let mut s = json!({"a": [1, 2, 3]});
        Pointer::remove(&mut s, &Path::parse("/a/1").unwrap()).unwrap();
        assert_eq!(s, json!({"a": [1, 3]}));
    }

    #[test]
    fn remove_at_root_is_error() {
        let mut s = json!({"a": 1});
        assert!(Pointer::remove(&mut s, &Path::root()).is_err());
    }

    #[test]
    fn is_ancestor_of() {
        let a = Path::parse("/a").unwrap();
        let ab = Path::parse("/a/b").unwrap();
        assert!(a.is_ancestor_of(&ab));
        assert!(!ab.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&a));
    }
}
