//! The world-state representation and the declarative [`Target`] shape used
//! to describe desired state, including the `DELETED` sentinel.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The world state: an arbitrary JSON-like value. Identity is by value;
/// equality is structural (inherited from [`serde_json::Value`]).
pub type State = Value;

/// A partial specification of a [`State`], augmented with a distinguished
/// `Deleted` sentinel.
///
/// For any object-valued location, a `Target` may: omit a key entirely (no
/// constraint — simply absent from the `Partial` map), require an exact
/// scalar/sequence value (`Target::Value`), recurse into a nested partial
/// object (`Target::Partial`), or require the key's absence (`Target::Deleted`).
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// An exact scalar, sequence, or fully-specified object value.
    Value(Value),
    /// The location must not exist.
    Deleted,
    /// A recursive partial specification of an object's children.
    Partial(BTreeMap<String, Target>),
}

impl Target {
    /// Builds a `Target` from an already-concrete JSON value (no `Deleted`
    /// markers, no partiality) — every key is an exact requirement.
    pub fn exact(value: Value) -> Self {
        Target::Value(value)
    }

    /// Builds an empty partial target (no constraints).
    pub fn partial() -> Self {
        Target::Partial(BTreeMap::new())
    }

    /// Builder: adds one child constraint to a `Partial` target. Panics if
    /// called on a non-`Partial` target — use `Target::partial()` first.
    pub fn with(mut self, key: impl Into<String>, child: Target) -> Self {
        match &mut self {
            Target::Partial(map) => {
                map.insert(key.into(), child);
            }
            _ => panic!("Target::with called on a non-partial target"),
        }
        self
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Target::Deleted)
    }

    /// Applies this target onto `current`, producing the patched state: `t`
    /// recursively merges into `s`, honoring `Deleted`. `DELETED` never
    /// appears in the result.
    pub fn apply(&self, current: &Value) -> Value {
        match self {
            Target::Value(v) => v.clone(),
            Target::Deleted => Value::Null,
            Target::Partial(children) => {
                let mut base = match current {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                for (key, child) in children {
                    match child {
                        Target::Deleted => {
                            base.remove(key);
                        }
                        _ => {
                            let child_current = base.get(key).cloned().unwrap_or(Value::Null);
                            base.insert(key.clone(), child.apply(&child_current));
                        }
                    }
                }
                Value::Object(base)
            }
        }
    }
}

/// Computes the fully patched state: `apply(s, t)` merges `t` into `s`.
pub fn apply(state: &State, target: &Target) -> State {
    target.apply(state)
}
