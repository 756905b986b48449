//! Declarative task descriptors: the user-authored rules the planner
//! searches over, and the [`Instruction`]s produced by grounding them.

use crate::error::CoreError;
use crate::lens::{Bindings, Lens};
use crate::path::{Path, Pointer};
use crate::value::State;
use crate::view::View;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The operation kind a task declares itself applicable to. `Any` matches
/// every [`crate::diff::OpKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
    Any,
}

impl Op {
    pub fn matches(&self, kind: crate::diff::OpKind) -> bool {
        use crate::diff::OpKind::*;
        match (self, kind) {
            (Op::Any, _) => true,
            (Op::Create, Create) => true,
            (Op::Update, Update) => true,
            (Op::Delete, Delete) => true,
            _ => false,
        }
    }

    /// The condition implied purely by `op`, independent of any
    /// user-supplied condition.
    pub fn implicit_condition(&self, state: &State, path: &Path) -> bool {
        let exists = Pointer::resolve(state, path).is_some();
        match self {
            Op::Create => !exists,
            Op::Delete => exists,
            Op::Update => exists,
            Op::Any => true,
        }
    }
}

/// A task's human-readable label, either fixed or computed from its
/// grounding bindings.
#[derive(Clone)]
pub enum Description {
    Fixed(String),
    Dynamic(Arc<dyn Fn(&Bindings) -> String + Send + Sync>),
}

impl std::fmt::Debug for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Description::Fixed(s) => f.debug_tuple("Fixed").field(s).finish(),
            Description::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

impl Description {
    pub fn resolve(&self, bindings: &Bindings) -> String {
        match self {
            Description::Fixed(s) => s.clone(),
            Description::Dynamic(f) => f(bindings),
        }
    }
}

impl From<&str> for Description {
    fn from(s: &str) -> Self {
        Description::Fixed(s.to_string())
    }
}

impl From<String> for Description {
    fn from(s: String) -> Self {
        Description::Fixed(s)
    }
}

/// A pure, synchronous state projection used during planning. Must be
/// side-effect-free beyond mutating the [`View`] it is given.
pub trait Effect: Fn(&mut View, &Bindings) -> Result<(), CoreError> + Send + Sync {}
impl<F> Effect for F where F: Fn(&mut View, &Bindings) -> Result<(), CoreError> + Send + Sync {}

/// The asynchronous, I/O-performing counterpart to [`Effect`], run at
/// execution time rather than during planning.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, view: &mut View<'_>, bindings: &Bindings) -> Result<(), CoreError>;
}

/// A task that decomposes a diff operation into further instructions rather
/// than satisfying it directly.
pub trait Method: Fn(&State, &Bindings) -> Vec<Instruction> + Send + Sync {}
impl<F> Method for F where F: Fn(&State, &Bindings) -> Vec<Instruction> + Send + Sync {}

/// A user-supplied precondition, ANDed with the op's implicit condition.
pub trait Condition: Fn(&State, &Bindings) -> bool + Send + Sync {}
impl<F> Condition for F where F: Fn(&State, &Bindings) -> bool + Send + Sync {}

/// How a method's returned instructions are composed into a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    Sequential,
    Detect,
}

impl Default for ExpansionMode {
    fn default() -> Self {
        ExpansionMode::Detect
    }
}

enum Kind {
    Action {
        effect: Arc<dyn Effect>,
        action: Option<Arc<dyn Action>>,
    },
    Method {
        method: Arc<dyn Method>,
        expansion: ExpansionMode,
    },
}

impl std::fmt::Debug for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Action { action, .. } => f
                .debug_struct("Action")
                .field("effect", &"<effect>")
                .field("action", &action.as_ref().map(|_| "<action>"))
                .finish(),
            Kind::Method { expansion, .. } => f
                .debug_struct("Method")
                .field("method", &"<method>")
                .field("expansion", expansion)
                .finish(),
        }
    }
}

/// An immutable, shareable task descriptor: a [`Lens`] + [`Op`] pattern, an
/// optional precondition, and either an action body or a method body.
pub struct Task {
    lens: Lens,
    op: Op,
    condition: Option<Arc<dyn Condition>>,
    description: Description,
    id_override: Option<String>,
    kind: Kind,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("lens", &self.lens)
            .field("op", &self.op)
            .field("condition", &self.condition.as_ref().map(|_| "<condition>"))
            .field("description", &self.description)
            .field("id_override", &self.id_override)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Task {
    /// Builds an action task: `effect` runs during planning, `action`
    /// (if given via [`Task::with_action`]) performs I/O at execution.
    pub fn action(
        lens: Lens,
        op: Op,
        description: impl Into<Description>,
        effect: impl Effect + 'static,
    ) -> Self {
        Task {
            lens,
            op,
            condition: None,
            description: description.into(),
            id_override: None,
            kind: Kind::Action { effect: Arc::new(effect), action: None },
        }
    }

    /// Builds a method task: decomposes into further instructions rather
    /// than acting directly.
    pub fn method(
        lens: Lens,
        op: Op,
        description: impl Into<Description>,
        method: impl Method + 'static,
    ) -> Self {
        Task {
            lens,
            op,
            condition: None,
            description: description.into(),
            id_override: None,
            kind: Kind::Method { method: Arc::new(method), expansion: ExpansionMode::default() },
        }
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        if let Kind::Action { action: slot, .. } = &mut self.kind {
            *slot = Some(Arc::new(action));
        }
        self
    }

    pub fn with_expansion(mut self, mode: ExpansionMode) -> Self {
        if let Kind::Method { expansion, .. } = &mut self.kind {
            *expansion = mode;
        }
        self
    }

    /// Overrides the default (field-hash-derived) task id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id_override = Some(id.into());
        self
    }

    pub fn lens(&self) -> &Lens {
        &self.lens
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, Kind::Method { .. })
    }

    pub fn expansion_mode(&self) -> Option<ExpansionMode> {
        match &self.kind {
            Kind::Method { expansion, .. } => Some(*expansion),
            Kind::Action { .. } => None,
        }
    }

    pub fn description(&self, bindings: &Bindings) -> String {
        self.description.resolve(bindings)
    }

    /// Stable deterministic id hashing only `(op, lens, description,
    /// id_override)` — a documented divergence from hashing function source
    /// text, since Rust closures have no stable textual representation.
    pub fn id(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.op.hash(&mut hasher);
        self.lens.raw().hash(&mut hasher);
        match &self.description {
            Description::Fixed(s) => s.hash(&mut hasher),
            Description::Dynamic(_) => "<dynamic>".hash(&mut hasher),
        }
        self.id_override.hash(&mut hasher);
        hasher.finish()
    }

    /// Full precondition: the op's implicit condition ANDed with the
    /// user-supplied one, if any.
    pub fn condition_holds(&self, state: &State, path: &Path, bindings: &Bindings) -> bool {
        if !self.op.implicit_condition(state, path) {
            return false;
        }
        match &self.condition {
            Some(cond) => cond(state, bindings),
            None => true,
        }
    }

    /// Runs the planning-time effect of an action task against `view`.
    pub fn apply_effect(&self, view: &mut View, bindings: &Bindings) -> Result<(), CoreError> {
        match &self.kind {
            Kind::Action { effect, .. } => effect(view, bindings),
            Kind::Method { .. } => Err(CoreError::Internal(
                "apply_effect called on a method task".to_string(),
            )),
        }
    }

    /// Runs the execution-time action body, if one was supplied; falls back
    /// to the planning effect when the task has no I/O-bearing action.
    pub async fn run_action(
        &self,
        view: &mut View<'_>,
        bindings: &Bindings,
    ) -> Result<(), CoreError> {
        match &self.kind {
            Kind::Action { effect, action: Some(action) } => {
                let _ = effect;
                action.run(view, bindings).await
            }
            Kind::Action { effect, action: None } => effect(view, bindings),
            Kind::Method { .. } => Err(CoreError::Internal(
                "run_action called on a method task".to_string(),
            )),
        }
    }

    /// Calls a method task's body. An empty result means "not applicable
    /// here" and is not an error — this ambiguity is preserved exactly.
    pub fn expand(&self, state: &State, bindings: &Bindings) -> Vec<Instruction> {
        match &self.kind {
            Kind::Method { method, .. } => method(state, bindings),
            Kind::Action { .. } => Vec::new(),
        }
    }

    /// Grounds this task with `bindings` and an optional target value into a
    /// concrete [`Instruction`].
    pub fn ground(
        self: &Arc<Task>,
        bindings: Bindings,
        target: Option<Value>,
    ) -> Result<Instruction, CoreError> {
        let path = self.lens.ground(&bindings)?;
        Ok(Instruction { task: self.clone(), path, bindings, target })
    }
}

/// A task grounded to a specific path and argument binding.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub task: Arc<Task>,
    pub path: Path,
    pub bindings: Bindings,
    pub target: Option<Value>,
}

impl Instruction {
    pub fn description(&self) -> String {
        self.task.description(&self.bindings)
    }

    pub fn is_method(&self) -> bool {
        self.task.is_method()
    }
}

impl PartialEq for Instruction {
    /// Per the data model: two instructions are equal iff their task id,
    /// grounded path, and target value are equal.
    fn eq(&self, other: &Self) -> bool {
        self.task.id() == other.task.id() && self.path == other.path && self.target == other.target
    }
}
impl Eq for Instruction {}
