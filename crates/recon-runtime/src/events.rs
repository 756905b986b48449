//! The agent's event taxonomy (§6): one variant per row of the emission
//! contract table, each carrying exactly the stated payload.

use recon_core::plan::{FailureCause, PlanNode, Stats};
use recon_core::task::Instruction;
use recon_core::value::{State, Target};
use std::time::Duration;

/// An event emitted by an [`crate::agent::Agent`] at a state transition.
/// Subscribers receive these in per-agent emission order (§5).
#[derive(Debug, Clone)]
pub enum Event {
    /// `seek` accepted.
    Start { target: Target },
    /// Emitted before planning begins.
    FindPlan { state: State, target: Target },
    /// Planning succeeded.
    PlanFound { start: PlanNode, stats: Stats },
    /// Planning failed.
    PlanNotFound { cause: FailureCause, stats: Stats },
    /// The planner's deadline elapsed.
    PlanTimeout { timeout: Duration },
    /// The next action in the current plan was selected.
    ActionNext { action: Instruction },
    /// An action's runtime condition no longer holds.
    ActionConditionFailed { action: Instruction },
    /// Before invoking an action's `action()` body.
    ActionStart { action: Instruction },
    /// An action committed successfully.
    ActionSuccess { action: Instruction },
    /// An action threw or was cancelled.
    ActionFailure { action: Instruction, cause: String },
    /// The end of the current plan was reached.
    PlanExecuted,
    /// Before sleeping ahead of a retry.
    Backoff { tries: usize, delay_ms: u64 },
    /// The target has been met.
    Success,
    /// Retries were exhausted without meeting the target.
    Failure { cause: String },
}

impl Event {
    /// The event's taxonomy name, as used for [`crate::observable::Observable::on`]
    /// filtering and in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::FindPlan { .. } => "find-plan",
            Event::PlanFound { .. } => "plan-found",
            Event::PlanNotFound { .. } => "plan-not-found",
            Event::PlanTimeout { .. } => "plan-timeout",
            Event::ActionNext { .. } => "action-next",
            Event::ActionConditionFailed { .. } => "action-condition-failed",
            Event::ActionStart { .. } => "action-start",
            Event::ActionSuccess { .. } => "action-success",
            Event::ActionFailure { .. } => "action-failure",
            Event::PlanExecuted => "plan-executed",
            Event::Backoff { .. } => "backoff",
            Event::Success => "success",
            Event::Failure { .. } => "failure",
        }
    }
}
