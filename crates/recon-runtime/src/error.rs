//! Runtime-level errors: agent lifecycle, execution and configuration
//! failures, composed on top of [`recon_core::CoreError`].

use recon_core::CoreError;
use thiserror::Error;

/// Errors surfaced by the agent runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// A planning or diffing error from the kernel.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An `action()` body returned an error.
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// Cooperative cancellation observed inside a running action.
    #[error("action cancelled")]
    ActionCancelled,

    /// The planner could not find a plan within the configured retry budget.
    #[error("plan not found after {attempts} attempt(s)")]
    PlanNotFound { attempts: usize },

    /// The planner's deadline elapsed before a plan was produced.
    #[error("plan timed out")]
    PlanTimeout,

    /// An agent action or sensor exceeded its configured timeout.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// An operation was attempted from an invalid agent phase.
    #[error("invalid agent transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A sensor's channel closed unexpectedly.
    #[error("sensor closed: {0}")]
    SensorClosed(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A catch-all for conditions that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether a failure of this kind is worth retrying (vs. a configuration
    /// or programming error that retrying cannot fix).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::ActionFailed(_)
                | RuntimeError::Timeout { .. }
                | RuntimeError::PlanTimeout
                | RuntimeError::SensorClosed(_)
        )
    }
}

/// Plain result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// `error_stack`-backed alias for call sites that need attached context.
pub type RuntimeReport<T> = Result<T, error_stack::Report<RuntimeError>>;
