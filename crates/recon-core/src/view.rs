//! [`View`]: a scoped read/write/delete handle onto a sub-tree, plus the
//! tracked-scope machinery that records change operations and reverts the
//! root state on failure.
//!
//! Tracking uses a copy-on-write snapshot taken before the scope runs,
//! compared against the final buffer on commit — the variant the design
//! notes call out as simpler and preferred over mutation-recording through
//! the View API alone.

use crate::diff::OpKind;
use crate::error::CoreError;
use crate::path::{Path, Pointer};
use crate::value::State;
use serde_json::Value;

/// A scoped reference to a sub-tree at a [`Path`]. Writes and deletes
/// through a view propagate to the root buffer it was constructed from.
pub struct View<'a> {
    root: &'a mut State,
    path: Path,
    target: Option<Value>,
}

impl<'a> View<'a> {
    pub fn new(root: &'a mut State, path: Path) -> Self {
        View { root, path, target: None }
    }

    /// A view additionally carrying the grounded target value for its
    /// location, as produced by diffing against the desired state. Actions
    /// that simply adopt the desired value read it via [`View::target`]
    /// instead of recomputing it.
    pub fn with_target(root: &'a mut State, path: Path, target: Option<Value>) -> Self {
        View { root, path, target }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn read(&self) -> Option<&Value> {
        Pointer::resolve(self.root, &self.path)
    }

    pub fn write(&mut self, value: Value) {
        Pointer::assign(self.root, &self.path, value);
    }

    pub fn delete(&mut self) -> Result<(), CoreError> {
        Pointer::remove(self.root, &self.path)
    }

    /// A view onto a child of this view's location.
    pub fn child(&mut self, segment: impl Into<String>) -> View<'_> {
        View { root: self.root, path: self.path.join(segment), target: None }
    }

    /// A read-only snapshot of the entire root state, for cross-cutting
    /// conditions (`bindings.system` in the task-author API).
    pub fn system(&self) -> &Value {
        self.root
    }
}

/// One recorded mutation inside a tracked scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: OpKind,
    pub path: Path,
    pub value: Option<Value>,
}

impl ChangeRecord {
    fn create(path: Path, value: Value) -> Self {
        ChangeRecord { kind: OpKind::Create, path, value: Some(value) }
    }
    fn update(path: Path, value: Value) -> Self {
        ChangeRecord { kind: OpKind::Update, path, value: Some(value) }
    }
    fn delete(path: Path) -> Self {
        ChangeRecord { kind: OpKind::Delete, path, value: None }
    }
}

/// Runs `f` against a [`View`] scoped at `scope_path` inside `root`,
/// recording every mutation. On success, the buffer is committed back into
/// `root` and the change records are returned alongside the closure's
/// result. On failure, `root` is left untouched (the copy-on-write buffer
/// is simply dropped) and a single synthetic `update(root, original)`
/// change record is returned, per the transactional-effect contract.
pub fn tracked_scope<F, T>(
    root: &mut State,
    scope_path: &Path,
    target: Option<Value>,
    f: F,
) -> (Result<T, CoreError>, Vec<ChangeRecord>)
where
    F: FnOnce(&mut View) -> Result<T, CoreError>,
{
    let original = root.clone();
    let mut buffer = root.clone();
    let mut view = View::with_target(&mut buffer, scope_path.clone(), target);
    let result = f(&mut view);

    match result {
        Ok(value) => {
            let mut records = Vec::new();
            record_changes(&original, &buffer, &Path::root(), &mut records);
            *root = buffer;
            (Ok(value), records)
        }
        Err(err) => (Err(err), vec![ChangeRecord::update(Path::root(), original)]),
    }
}

/// Diffs `old` against `new`, recording one change per actually-mutated
/// location. Array element changes are atomic replace/add/remove by index;
/// a pure length change that adds no differing indices records nothing at
/// the array's own path (no "length" event is ever emitted).
fn record_changes(old: &Value, new: &Value, path: &Path, out: &mut Vec<ChangeRecord>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(o), Value::Object(n)) => {
            let mut keys: std::collections::BTreeSet<&String> = o.keys().collect();
            keys.extend(n.keys());
            for key in keys {
                match (o.get(key), n.get(key)) {
                    (Some(ov), Some(nv)) if ov != nv => {
                        record_changes(ov, nv, &path.join(key.clone()), out)
                    }
                    (Some(_), None) => out.push(ChangeRecord::delete(path.join(key.clone()))),
                    (None, Some(nv)) => {
                        out.push(ChangeRecord::create(path.join(key.clone()), nv.clone()))
                    }
                    _ => {}
                }
            }
        }
        (Value::Array(oa), Value::Array(na)) => {
            let len = oa.len().max(na.len());
            for i in 0..len {
                let seg = i.to_string();
                match (oa.get(i), na.get(i)) {
                    (Some(ov), Some(nv)) if ov != nv => {
                        out.push(ChangeRecord::update(path.join(seg), nv.clone()))
                    }
                    (Some(_), None) => out.push(ChangeRecord::delete(path.join(seg))),
                    (None, Some(nv)) => out.push(ChangeRecord::create(path.join(seg), nv.clone())),
                    _ => {}
                }
            }
        }
        _ => out.push(ChangeRecord::update(path.clone(), new.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_propagates_to_root() {
        let mut state = json!({"a": 1});
        let mut view = View::new(&mut state, Path::parse("/a").unwrap());
        view.write(json!(2));
        assert_eq!(state, json!({"a": 2}));
    }

    #[test]
    fn tracked_scope_commits_on_success() {
        let mut state = json!({"a": 1});
        let (result, changes) = tracked_scope(&mut state, &Path::parse("/a").unwrap(), None, |v| {
            v.write(json!(2));
            Ok::<_, CoreError>(())
        });
        assert!(result.is_ok());
        assert_eq!(state, json!({"a": 2}));
        assert_eq!(changes, vec![ChangeRecord::update(Path::parse("/a").unwrap(), json!(2))]);
    }

    #[test]
    fn tracked_scope_reverts_byte_for_byte_on_failure() {
        let mut state = json!({"a": 1, "b": {"c": 2}});
        let original = state.clone();
        let (result, changes) = tracked_scope(&mut state, &Path::parse("/a").unwrap(), None, |v| {
            v.write(json!(99));
            Err::<(), CoreError>(CoreError::ActionFailed("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(state, original);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, OpKind::Update);
        assert_eq!(changes[0].path, Path::root());
    }

    #[test]
    fn nested_write_records_full_path() {
        let mut state = json!({"a": {"b": 1}});
        let (_, changes) = tracked_scope(&mut state, &Path::parse("/a").unwrap(), None, |v| {
            let mut child = v.child("b");
            child.write(json!(7));
            Ok::<_, CoreError>(())
        });
        assert_eq!(changes, vec![ChangeRecord::update(Path::parse("/a/b").unwrap(), json!(7))]);
    }

    #[test]
    fn array_append_emits_create_not_length_event() {
        let mut state = json!({"a": [1, 2]});
        let (_, changes) = tracked_scope(&mut state, &Path::parse("/a").unwrap(), None, |v| {
            v.write(json!([1, 2, 3]));
            Ok::<_, CoreError>(())
        });
        assert_eq!(changes, vec![ChangeRecord::create(Path::parse("/a/2").unwrap(), json!(3))]);
    }

    #[test]
    fn array_element_replace_emits_update() {
        let mut state = json!({"a": [1, 2, 3]});
        let (_, changes) = tracked_scope(&mut state, &Path::parse("/a").unwrap(), None, |v| {
            v.write(json!([1, 9, 3]));
            Ok::<_, CoreError>(())
        });
        assert_eq!(changes, vec![ChangeRecord::update(Path::parse("/a/1").unwrap(), json!(9))]);
    }
}
