//! A [`Lens`] is a [`Path`] template containing `:name` placeholders; it
//! matches concrete paths and extracts argument [`Bindings`].

use crate::error::CoreError;
use crate::path::Path;
use serde_json::Value;
use std::collections::BTreeMap;

/// Argument bindings extracted from a successful [`Lens`] match.
pub type Bindings = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A path template: literal segments matched exactly, `:name` segments bound
/// to the corresponding value in the concrete path.
#[derive(Debug, Clone, PartialEq)]
pub struct Lens {
    raw: String,
    segments: Vec<Segment>,
}

impl Lens {
    /// Parses a lens template such as `/a/:x/c`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let path = Path::parse(raw)?;
        let segments = path
            .segments()
            .iter()
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    Segment::Placeholder(name.to_string())
                } else {
                    Segment::Literal(s.clone())
                }
            })
            .collect();
        Ok(Lens { raw: raw.to_string(), segments })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Attempts to match `path`, returning the extracted bindings on
    /// success. Segment counts must match exactly — a lens never matches a
    /// path with extra trailing segments.
    pub fn matches(&self, path: &Path) -> Option<Bindings> {
        if self.segments.len() != path.segments().len() {
            return None;
        }
        let mut bindings = Bindings::new();
        for (lens_seg, path_seg) in self.segments.iter().zip(path.segments()) {
            match lens_seg {
                Segment::Literal(expected) => {
                    if expected != path_seg {
                        return None;
                    }
                }
                Segment::Placeholder(name) => {
                    let value = match path_seg.parse::<u64>() {
                        Ok(n) => Value::Number(n.into()),
                        Err(_) => Value::String(path_seg.clone()),
                    };
                    bindings.insert(name.clone(), value);
                }
            }
        }
        Some(bindings)
    }

    /// Grounds this lens into a concrete [`Path`] by substituting each
    /// placeholder with its bound value.
    pub fn ground(&self, bindings: &Bindings) -> Result<Path, CoreError> {
        let mut segments = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => segments.push(s.clone()),
                Segment::Placeholder(name) => {
                    let value = bindings.get(name).ok_or_else(|| {
                        CoreError::Internal(format!(
                            "lens {} missing binding for :{name}",
                            self.raw
                        ))
                    })?;
                    segments.push(value_to_segment(value));
                }
            }
        }
        Path::from_segments(segments)
    }

    /// The set of placeholder names this lens declares, in segment order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn value_to_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_with_one_placeholder() {
        let lens = Lens::parse("/:x/b").unwrap();
        let path = Path::parse("/a/b").unwrap();
        let bindings = lens.matches(&path).unwrap();
        assert_eq!(bindings.get("x"), Some(&Value::String("a".to_string())));
    }

    #[test]
    fn does_not_match_longer_path() {
        let lens = Lens::parse("/a/b").unwrap();
        let path = Path::parse("/a/b/c").unwrap();
        assert!(lens.matches(&path).is_none());
    }

    #[test]
    fn matches_middle_placeholder() {
        let lens = Lens::parse("/a/:x/c").unwrap();
        let path = Path::parse("/a/b/c").unwrap();
        let bindings = lens.matches(&path).unwrap();
        assert_eq!(bindings.get("x"), Some(&Value::String("b".to_string())));
    }

    #[test]
    fn numeric_segment_binds_as_number() {
        let lens = Lens::parse("/items/:i").unwrap();
        let path = Path::parse("/items/2").unwrap();
        let bindings = lens.matches(&path).unwrap();
        assert_eq!(bindings.get("i"), Some(&Value::Number(2.into())));
    }

    #[test]
    fn ground_substitutes_bindings() {
        let lens = Lens::parse("/counters/:k").unwrap();
        let mut b = Bindings::new();
        b.insert("k".to_string(), Value::String("a".to_string()));
        let path = lens.ground(&b).unwrap();
        assert_eq!(path, Path::parse("/counters/a").unwrap());
    }

    #[test]
    fn ground_without_binding_errors() {
        let lens = Lens::parse("/counters/:k").unwrap();
        assert!(lens.ground(&Bindings::new()).is_err());
    }
}
