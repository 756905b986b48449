//! Computes the set of [`Operation`]s needed to reconcile a [`State`] with a
//! [`Target`], including the ancestor tree the planner consumes and the
//! leaf-only view exposed to callers.

use crate::path::Path;
use crate::value::{State, Target};
use serde_json::Value;
use std::collections::VecDeque;

/// The kind of change an [`Operation`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

/// A single reconciliation step: create, update, or delete the value at a
/// path.
///
/// `leaf` is true when this operation addresses a scalar/sequence, or a
/// non-existent-to-exists boundary; false when it addresses an interior
/// object that will be "fixed" by fixing its children. The planner consumes
/// the full tree (leaves and ancestors); [`diff`] exposes leaves only.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OpKind,
    pub path: Path,
    pub value: Option<Value>,
    pub leaf: bool,
}

impl Operation {
    fn create(path: Path, value: Value) -> Self {
        Operation { kind: OpKind::Create, path, value: Some(value), leaf: true }
    }

    fn update(path: Path, value: Value, leaf: bool) -> Self {
        Operation { kind: OpKind::Update, path, value: Some(value), leaf }
    }

    fn delete(path: Path) -> Self {
        Operation { kind: OpKind::Delete, path, value: None, leaf: true }
    }
}

/// The full result of diffing `s` against `t`: the patched state plus every
/// operation (ancestors included) discovered while walking the target tree.
/// The planner re-derives this on every action application to measure
/// progress; the public [`diff`] function filters `ops` to leaves only.
pub struct Distance {
    pub target: State,
    pub ops: Vec<Operation>,
}

impl Distance {
    pub fn from(s: &State, t: &Target) -> Distance {
        let patched = crate::value::apply(s, t);
        let ops = walk(s, &patched, t);
        Distance { target: patched, ops }
    }

    /// The leaf-only subset, in stable traversal order.
    pub fn leaves(&self) -> Vec<Operation> {
        self.ops.iter().filter(|op| op.leaf).cloned().collect()
    }
}

/// Public diff entry point: leaf operations only, in the stable order `diff`
/// is specified to produce.
pub fn diff(s: &State, t: &Target) -> Vec<Operation> {
    Distance::from(s, t).leaves()
}

fn is_object(v: &Value) -> bool {
    matches!(v, Value::Object(_))
}

fn walk(s: &State, patched: &State, t: &Target) -> Vec<Operation> {
    let mut ops = Vec::new();
    let mut queue: VecDeque<(Target, Path)> = VecDeque::new();
    queue.push_back((t.clone(), Path::root()));

    while let Some((sub_target, path)) = queue.pop_front() {
        let sv = crate::path::Pointer::resolve(s, &path);
        let tv = crate::path::Pointer::resolve(patched, &path);

        match &sub_target {
            Target::Deleted => {
                if let Some(existing) = sv {
                    ops.push(Operation::delete(path.clone()));
                    if let Value::Object(map) = existing {
                        for key in map.keys() {
                            queue.push_back((Target::Deleted, path.join(key.clone())));
                        }
                    }
                }
            }
            Target::Value(_) => {
                match (sv, tv) {
                    (None, Some(tv)) => ops.push(Operation::create(path.clone(), tv.clone())),
                    (Some(sv), Some(tv)) if sv != tv => {
                        let leaf = !(is_object(sv) && is_object(tv));
                        ops.push(Operation::update(path.clone(), tv.clone(), leaf));
                    }
                    _ => {}
                }
            }
            Target::Partial(children) => {
                match (sv, tv) {
                    (None, Some(tv)) => {
                        ops.push(Operation::create(path.clone(), tv.clone()));
                    }
                    (Some(sv), Some(tv)) => {
                        if sv != tv {
                            let leaf = !(is_object(sv) && is_object(tv));
                            ops.push(Operation::update(path.clone(), tv.clone(), leaf));
                        }
                        for (key, child) in children {
                            queue.push_back((child.clone(), path.join(key.clone())));
                        }
                    }
                    (None, None) => {}
                    _ => {}
                }
            }
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t_exact(v: Value) -> Target {
        Target::exact(v)
    }

    #[test]
    fn diff_of_identical_states_is_empty() {
        let s = json!({"a": 1});
        let t = Target::partial().with("a", t_exact(json!(1)));
        assert!(diff(&s, &t).is_empty());
    }

    #[test]
    fn apply_then_diff_is_idempotent() {
        let s = json!({"a": 1, "b": "one"});
        let t = Target::partial().with("a", t_exact(json!(9)));
        let patched = crate::value::apply(&s, &t);
        let t2 = Target::partial().with("a", t_exact(json!(9)));
        assert!(diff(&patched, &t2).is_empty());
    }

    #[test]
    fn s1_counter_leaf_diff() {
        let t = t_exact(json!(3));
        let ops = diff(&json!(0), &t);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Update);
        assert_eq!(ops[0].path, Path::root());
        assert_eq!(ops[0].value, Some(json!(3)));
    }

    #[test]
    fn s4_delete_with_cascade_full_ancestor_tree() {
        let s = json!({"a": {"b": {"c": {"d": "e"}}}});
        let t = Target::partial().with("a", Target::partial().with("b", Target::Deleted));
        let dist = Distance::from(&s, &t);
        let rendered: Vec<(OpKind, String)> =
            dist.ops.iter().map(|o| (o.kind, o.path.to_string())).collect();
        assert_eq!(
            rendered,
            vec![
                (OpKind::Update, "".to_string()),
                (OpKind::Update, "/a".to_string()),
                (OpKind::Delete, "/a/b".to_string()),
                (OpKind::Delete, "/a/b/c".to_string()),
                (OpKind::Delete, "/a/b/c/d".to_string()),
            ]
        );
        assert!(!dist.ops[0].leaf);
        assert!(!dist.ops[1].leaf);
    }

    #[test]
    fn s5_partial_specification_leaf_diff() {
        let s = json!({"a": 1, "b": "one", "c": {"k": "v"}});
        let t = Target::partial()
            .with("a", t_exact(json!(2)))
            .with("c", Target::partial().with("k", Target::Deleted));
        let ops = diff(&s, &t);
        let rendered: Vec<(OpKind, String)> =
            ops.iter().map(|o| (o.kind, o.path.to_string())).collect();
        assert_eq!(
            rendered,
            vec![
                (OpKind::Update, "/a".to_string()),
                (OpKind::Delete, "/c/k".to_string()),
            ]
        );
    }

    #[test]
    fn create_does_not_recurse_into_children() {
        let s = json!({});
        let t = Target::partial().with(
            "a",
            Target::partial().with("b", t_exact(json!(1))),
        );
        let ops = diff(&s, &t);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OpKind::Create);
        assert_eq!(ops[0].path, Path::parse("/a").unwrap());
        assert_eq!(ops[0].value, Some(json!({"b": 1})));
    }
}
