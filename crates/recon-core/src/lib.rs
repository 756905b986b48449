//! `recon-core`: the pure, synchronous reconciliation kernel.
//!
//! Addressing ([`path`]), desired-state specification and diffing
//! ([`value`], [`diff`]), path templates ([`lens`]), scoped mutation
//! ([`view`]), the declarative task model ([`task`]), and the HTN planner
//! itself ([`planner`], [`plan`]) that turns a diff into an executable plan.
//! Everything here is deterministic and I/O-free; `recon-runtime` builds the
//! agent loop on top of it.

pub mod diff;
pub mod error;
pub mod lens;
pub mod path;
pub mod plan;
pub mod planner;
pub mod task;
pub mod value;
pub mod view;

pub use diff::{diff, Distance, OpKind, Operation};
pub use error::{CoreError, CoreResult};
pub use lens::{Bindings, Lens};
pub use path::{Path, Pointer};
pub use plan::{FailureCause, PlanNode, PlanResult, Stats};
pub use planner::Planner;
pub use task::{Action, Condition, Description, Effect, ExpansionMode, Instruction, Method, Op, Task};
pub use value::{State, Target};
pub use view::{tracked_scope, ChangeRecord, View};
