//! Crate-level error types for `recon-core`.
//!
//! Provides a unified [`CoreError`] composing the typed failure modes of
//! every sub-module (path resolution, planning, task execution) together
//! with [`error_stack::Report`] for context-carrying propagation up through
//! the planner's recursive search.
//!
//! # Usage
//!
//! ```rust,ignore
//! use recon_core::error::{CoreError, CoreResult};
//! use error_stack::ResultExt;
//!
//! fn ground(path: &str) -> CoreResult<()> {
//!     recon_core::path::Path::parse(path)
//!         .map_err(CoreError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach_printable_lazy(|| format!("grounding lens against {path}"))?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Crate-level error type for `recon-core`.
///
/// Distinguishes *programming errors* (malformed paths — these propagate as
/// `Err` all the way to the caller) from *planning outcomes*
/// (`PlanNotFound`, `PlanTimeout`), which the planner always returns as a
/// value rather than raising (see `PlanResult` in `crate::plan`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A Path string failed RFC 6901-style parsing.
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// Resolving a Path against a state reached a location that does not
    /// exist, from a context that requires it to.
    #[error("pointer not found: {0}")]
    PointerNotFound(String),

    /// An action's precondition no longer held at execution time.
    #[error("condition failed for instruction {0}")]
    ConditionFailed(String),

    /// A user-supplied action body raised an error.
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// Cooperative cancellation was observed inside a tracked scope.
    #[error("action cancelled")]
    ActionCancelled,

    /// The planner exhausted its search without finding a valid plan.
    #[error("no plan found: {0}")]
    PlanNotFound(String),

    /// The planner's deadline elapsed before a plan was found.
    #[error("planning timed out")]
    PlanTimeout,

    /// An action applied cleanly but did not shrink the remaining diff; the
    /// branch that produced it is abandoned, not reported to the caller —
    /// this variant exists so the abandonment is traceable.
    #[error("no progress: applying instruction did not shrink the diff")]
    NoProgress,

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal invariant violation: a bug in recon-core itself.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type CoreResult<T> = std::result::Result<T, error_stack::Report<CoreError>>;

/// Plain `Result<T, CoreError>`, used on hot paths (lens matching, pointer
/// resolution) where call sites don't need attached context.
pub type Result<T> = std::result::Result<T, CoreError>;
