//! The planner's output: a DAG of [`PlanNode`]s, the [`PlanResult`] envelope,
//! search [`Stats`], and the plan-serialization format used for tests and
//! debugging.

use crate::task::Instruction;
use std::fmt::Write as _;
use std::time::Duration;

/// A node in the plan DAG.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// A single action, followed by the rest of the plan.
    Action { instruction: Instruction, next: Box<PlanNode> },
    /// A set of independent branches executed in parallel, followed by the
    /// rest of the plan once every branch has settled.
    Fork { branches: Vec<PlanNode>, next: Box<PlanNode> },
    /// End of plan.
    Terminal,
}

impl PlanNode {
    pub fn action(instruction: Instruction, next: PlanNode) -> Self {
        PlanNode::Action { instruction, next: Box::new(next) }
    }

    pub fn fork(branches: Vec<PlanNode>, next: PlanNode) -> Self {
        PlanNode::Fork { branches, next: Box::new(next) }
    }

    /// Renders this plan using the structural debugging format: `- desc`
    /// for an action, `+`/`~` blocks for a fork, two-space indent per depth.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_node(self, 0, &mut out);
        out
    }
}

fn render_node(node: &PlanNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        PlanNode::Terminal => {}
        PlanNode::Action { instruction, next } => {
            let _ = writeln!(out, "{indent}- {}", instruction.description());
            render_node(next, depth, out);
        }
        PlanNode::Fork { branches, next } => {
            let _ = writeln!(out, "{indent}+");
            for branch in branches {
                let _ = writeln!(out, "{indent}  ~");
                render_node(branch, depth + 2, out);
            }
            render_node(next, depth, out);
        }
    }
}

/// Why the planner failed to produce a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    NoPathFound,
    Timeout,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::NoPathFound => write!(f, "no applicable task found"),
            FailureCause::Timeout => write!(f, "planning deadline exceeded"),
        }
    }
}

/// Search bookkeeping, surfaced to callers regardless of outcome.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub tasks_considered: usize,
    pub method_expansions: usize,
    pub backtracks: usize,
    pub max_depth: usize,
    pub elapsed: Duration,
}

/// The planner's outcome: either a plan to execute, or a failure cause, both
/// paired with the search [`Stats`].
pub enum PlanResult {
    Success { start: PlanNode, stats: Stats },
    Failure { cause: FailureCause, stats: Stats },
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PlanResult::Success { .. })
    }

    pub fn stats(&self) -> &Stats {
        match self {
            PlanResult::Success { stats, .. } | PlanResult::Failure { stats, .. } => stats,
        }
    }
}
