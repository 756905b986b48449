//! The HTN planner: depth-first search with memoisation over the tasks
//! library, method expansion (sequential and parallel-detect), conflict
//! detection, cycle detection, and a caller-supplied deadline.

use crate::diff::{Distance, Operation};
use crate::path::{Path, Pointer};
use crate::plan::{FailureCause, PlanNode, PlanResult, Stats};
use crate::task::{ExpansionMode, Instruction, Op, Task};
use crate::value::{State, Target};
use crate::view::tracked_scope;
use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

/// An immutable, ordered task library and the search driven over it.
///
/// Task order is preserved exactly and is semantically meaningful: the
/// planner returns the first successful plan it finds, trying tasks in the
/// order the caller supplied them.
pub struct Planner {
    tasks: Vec<Arc<Task>>,
}

impl Planner {
    pub fn new(tasks: Vec<Arc<Task>>) -> Self {
        Planner { tasks }
    }

    /// Finds a plan taking `state` to `target`, honouring `deadline` if
    /// given. Never returns `Err` for "no plan found" — that outcome is the
    /// `PlanResult::Failure` value.
    pub fn find_plan(&self, state: &State, target: &Target, deadline: Option<Instant>) -> PlanResult {
        let start_time = Instant::now();
        let mut stats = Stats::default();
        let ops = Distance::from(state, target).ops;

        if ops.is_empty() {
            stats.elapsed = start_time.elapsed();
            return PlanResult::Success { start: PlanNode::Terminal, stats };
        }

        let mut stack = HashSet::new();
        let outcome = self.find_plan_inner(state, &ops, target, &mut stats, deadline, &mut stack, 0);
        stats.elapsed = start_time.elapsed();
        match outcome {
            Ok(node) => PlanResult::Success { start: node, stats },
            Err(cause) => PlanResult::Failure { cause, stats },
        }
    }

    fn check_deadline(deadline: Option<Instant>) -> Result<(), FailureCause> {
        match deadline {
            Some(d) if Instant::now() >= d => Err(FailureCause::Timeout),
            _ => Ok(()),
        }
    }

    fn find_plan_inner(
        &self,
        state: &State,
        ops: &[Operation],
        target: &Target,
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<PlanNode, FailureCause> {
        if ops.is_empty() {
            return Ok(PlanNode::Terminal);
        }
        Self::check_deadline(deadline)?;
        stats.max_depth = stats.max_depth.max(depth);

        let fingerprint = fingerprint(state, ops);
        if !stack.insert(fingerprint) {
            return Err(FailureCause::NoPathFound);
        }
        let result = self.search_ops(state, ops, target, stats, deadline, stack, depth);
        stack.remove(&fingerprint);
        result
    }

    fn search_ops(
        &self,
        state: &State,
        ops: &[Operation],
        target: &Target,
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<PlanNode, FailureCause> {
        for op in ops {
            for task in &self.tasks {
                if !task.op().matches(op.kind) {
                    continue;
                }
                let bindings = match task.lens().matches(&op.path) {
                    Some(b) => b,
                    None => continue,
                };
                stats.tasks_considered += 1;
                if !task.condition_holds(state, &op.path, &bindings) {
                    continue;
                }

                if task.is_method() {
                    let children = task.expand(state, &bindings);
                    if children.is_empty() {
                        continue;
                    }
                    stats.method_expansions += 1;
                    let mode = task.expansion_mode().unwrap_or_default();
                    let expanded =
                        self.expand_method(state, &children, mode, stats, deadline, stack, depth + 1);
                    let (node_core, state_after) = match expanded {
                        Ok(r) => r,
                        Err(_) => {
                            stats.backtracks += 1;
                            continue;
                        }
                    };
                    let ops_after = Distance::from(&state_after, target).ops;
                    if !progressed(ops, &ops_after, state, &state_after) {
                        stats.backtracks += 1;
                        continue;
                    }
                    match self.find_plan_inner(&state_after, &ops_after, target, stats, deadline, stack, depth + 1)
                    {
                        Ok(rest) => return Ok(splice(node_core, rest)),
                        Err(_) => {
                            stats.backtracks += 1;
                            continue;
                        }
                    }
                } else {
                    let instruction = match task.clone().ground(bindings, op.value.clone()) {
                        Ok(i) => i,
                        Err(_) => continue,
                    };
                    let mut state_prime = state.clone();
                    let (effect_result, _changes) =
                        tracked_scope(&mut state_prime, &instruction.path, instruction.target.clone(), |view| {
                            task.apply_effect(view, &instruction.bindings)
                        });
                    if effect_result.is_err() {
                        continue;
                    }
                    apply_implicit_delete(&mut state_prime, task.op(), &instruction.path);

                    let ops_prime = Distance::from(&state_prime, target).ops;
                    if !progressed(ops, &ops_prime, state, &state_prime) {
                        continue;
                    }
                    match self.find_plan_inner(&state_prime, &ops_prime, target, stats, deadline, stack, depth + 1)
                    {
                        Ok(sub) => return Ok(PlanNode::action(instruction, sub)),
                        Err(_) => {
                            stats.backtracks += 1;
                            continue;
                        }
                    }
                }
            }
        }
        Err(FailureCause::NoPathFound)
    }

    /// Expands a method's children into a plan segment (without the
    /// continuation for the outer remaining ops), returning the segment and
    /// the state reached after it runs.
    fn expand_method(
        &self,
        state: &State,
        children: &[Instruction],
        mode: ExpansionMode,
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<(PlanNode, State), FailureCause> {
        match mode {
            ExpansionMode::Sequential => self.plan_sequential(state, children, stats, deadline, stack, depth),
            ExpansionMode::Detect => self.plan_detect(state, children, stats, deadline, stack, depth),
        }
    }

    /// Plans every child independently and, if any two conflict (a write/write
    /// or write/read overlap), falls back to sequential composition instead.
    fn plan_detect(
        &self,
        state: &State,
        children: &[Instruction],
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<(PlanNode, State), FailureCause> {
        let mut child_plans = Vec::with_capacity(children.len());
        for child in children {
            child_plans.push(self.plan_child_isolated(state, child, stats, deadline, stack, depth)?);
        }

        if has_conflicts(&child_plans) {
            stats.backtracks += 1;
            return self.plan_sequential(state, children, stats, deadline, stack, depth);
        }

        let mut final_state = state.clone();
        for cp in &child_plans {
            for key in &cp.writes {
                if let Ok(p) = Path::parse(key) {
                    match Pointer::resolve(&cp.state, &p) {
                        Some(v) => Pointer::assign(&mut final_state, &p, v.clone()),
                        None => {
                            let _ = Pointer::remove(&mut final_state, &p);
                        }
                    }
                }
            }
        }
        let branches: Vec<PlanNode> = child_plans.into_iter().map(|cp| cp.node).collect();
        Ok((PlanNode::fork(branches, PlanNode::Terminal), final_state))
    }

    fn plan_sequential(
        &self,
        state: &State,
        children: &[Instruction],
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<(PlanNode, State), FailureCause> {
        let mut cur_state = state.clone();
        let mut nodes = Vec::new();
        for child in children {
            let cp = self.plan_child_isolated(&cur_state, child, stats, deadline, stack, depth)?;
            nodes.push(cp.node);
            cur_state = cp.state;
        }
        let chained = nodes.into_iter().rev().fold(PlanNode::Terminal, |acc, n| splice(n, acc));
        Ok((chained, cur_state))
    }

    /// Plans a single instruction (recursing through nested methods) in
    /// isolation, reporting the paths it wrote and read along the way so the
    /// caller can detect conflicts between sibling branches.
    fn plan_child_isolated(
        &self,
        state: &State,
        instr: &Instruction,
        stats: &mut Stats,
        deadline: Option<Instant>,
        stack: &mut HashSet<u64>,
        depth: usize,
    ) -> Result<ChildPlan, FailureCause> {
        Self::check_deadline(deadline)?;
        stats.max_depth = stats.max_depth.max(depth);

        if instr.is_method() {
            let grandchildren = instr.task.expand(state, &instr.bindings);
            if grandchildren.is_empty() {
                return Err(FailureCause::NoPathFound);
            }
            stats.method_expansions += 1;
            let mut cur_state = state.clone();
            let mut writes = BTreeSet::new();
            let mut reads = BTreeSet::new();
            let mut nodes = Vec::new();
            for gc in &grandchildren {
                let cp = self.plan_child_isolated(&cur_state, gc, stats, deadline, stack, depth + 1)?;
                writes.extend(cp.writes);
                reads.extend(cp.reads);
                nodes.push(cp.node);
                cur_state = cp.state;
            }
            let chained = nodes.into_iter().rev().fold(PlanNode::Terminal, |acc, n| splice(n, acc));
            Ok(ChildPlan { node: chained, state: cur_state, writes, reads })
        } else {
            if !instr.task.condition_holds(state, &instr.path, &instr.bindings) {
                return Err(FailureCause::NoPathFound);
            }
            stats.tasks_considered += 1;
            let mut reads = BTreeSet::new();
            reads.insert(instr.path.to_string());

            let mut state_prime = state.clone();
            let (effect_result, changes) = tracked_scope(&mut state_prime, &instr.path, instr.target.clone(), |view| {
                instr.task.apply_effect(view, &instr.bindings)
            });
            effect_result.map_err(|_| FailureCause::NoPathFound)?;
            apply_implicit_delete(&mut state_prime, instr.task.op(), &instr.path);

            let mut writes = BTreeSet::new();
            writes.insert(instr.path.to_string());
            for c in &changes {
                writes.insert(c.path.to_string());
            }
            Ok(ChildPlan {
                node: PlanNode::action(instr.clone(), PlanNode::Terminal),
                state: state_prime,
                writes,
                reads,
            })
        }
    }
}

struct ChildPlan {
    node: PlanNode,
    state: State,
    writes: BTreeSet<String>,
    reads: BTreeSet<String>,
}

/// A read-set is approximated as the grounded path of each leaf instruction;
/// the planner has no tracked-read instrumentation at plan time, only at
/// execution. Two branches conflict if either writes a path the other
/// writes or reads.
fn has_conflicts(plans: &[ChildPlan]) -> bool {
    for i in 0..plans.len() {
        for j in (i + 1)..plans.len() {
            let a = &plans[i];
            let b = &plans[j];
            if !a.writes.is_disjoint(&b.writes)
                || !a.writes.is_disjoint(&b.reads)
                || !b.writes.is_disjoint(&a.reads)
            {
                return true;
            }
        }
    }
    false
}

/// Splices `rest` in place of every trailing [`PlanNode::Terminal`] in
/// `node`'s chain (including inside fork branches).
fn splice(node: PlanNode, rest: PlanNode) -> PlanNode {
    match node {
        PlanNode::Terminal => rest,
        PlanNode::Action { instruction, next } => {
            PlanNode::Action { instruction, next: Box::new(splice(*next, rest)) }
        }
        PlanNode::Fork { branches, next } => {
            PlanNode::Fork { branches, next: Box::new(splice(*next, rest)) }
        }
    }
}

fn apply_implicit_delete(state: &mut State, op: Op, path: &Path) {
    if op == Op::Delete && Pointer::resolve(state, path).is_some() {
        let _ = Pointer::remove(state, path);
    }
}

/// Strictly-decreasing progress measure: fewer ops wins outright; a tied
/// count only counts as progress if the resulting state actually changed —
/// e.g. two counters each landing one step closer to target without either
/// one's path dropping out of the outstanding set yet. Revisiting an
/// identical (state, ops) pair on the same search branch is separately
/// guarded against by `find_plan_inner`'s fingerprint stack.
fn progressed(before: &[Operation], after: &[Operation], state_before: &State, state_after: &State) -> bool {
    if after.len() != before.len() {
        return after.len() < before.len();
    }
    state_before != state_after
}

fn fingerprint(state: &State, ops: &[Operation]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    serde_json::to_string(state).unwrap_or_default().hash(&mut hasher);
    for op in ops {
        op.path.to_string().hash(&mut hasher);
        (op.kind as u8).hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::{Bindings, Lens};
    use crate::task::{Op, Task};
    use crate::view::View;
    use serde_json::{json, Value};

    /// Adopts whatever target value the planner grounded this instruction
    /// with — the idiomatic "reconcile by direct assignment" action.
    fn set_task() -> Arc<Task> {
        Arc::new(Task::action(Lens::parse("").unwrap(), Op::Update, "set", |v: &mut View, _: &Bindings| {
            if let Some(t) = v.target().cloned() {
                v.write(t);
            }
            Ok(())
        }))
    }

    fn plus_one_at(lens: &str) -> Arc<Task> {
        Arc::new(Task::action(Lens::parse(lens).unwrap(), Op::Update, "+1", |v: &mut View, _: &Bindings| {
            let cur = v.read().and_then(Value::as_i64).unwrap_or(0);
            v.write(json!(cur + 1));
            Ok(())
        }))
    }

    #[test]
    fn s1_counter_reaches_target_in_one_action() {
        let planner = Planner::new(vec![set_task()]);
        let result = planner.find_plan(&json!(0), &Target::exact(json!(3)), None);
        match result {
            PlanResult::Success { start, .. } => assert_eq!(start.render(), "- set\n"),
            PlanResult::Failure { cause, .. } => panic!("expected success, got {cause}"),
        }
    }

    #[test]
    fn s2_counter_with_method_decomposition_yields_n_steps() {
        let plus_one_template = plus_one_at("");
        let ascend = Arc::new(Task::method(
            Lens::parse("").unwrap(),
            Op::Update,
            "ascend",
            move |state: &State, bindings: &Bindings| {
                let cur = state.as_i64().unwrap_or(0);
                (cur..3).map(|_| plus_one_template.clone().ground(bindings.clone(), None).unwrap()).collect()
            },
        ));
        let planner = Planner::new(vec![ascend]);
        let result = planner.find_plan(&json!(0), &Target::exact(json!(3)), None);
        match result {
            PlanResult::Success { start, stats } => {
                assert_eq!(start.render(), "- +1\n- +1\n- +1\n");
                assert_eq!(stats.method_expansions, 1);
            }
            PlanResult::Failure { cause, .. } => panic!("expected success, got {cause}"),
        }
    }

    #[test]
    fn s3_parallel_counters_fork() {
        let plus_one = plus_one_at("/counters/:k");
        let n_plus_one = Arc::new(Task::method(
            Lens::parse("/counters").unwrap(),
            Op::Update,
            "nPlusOne",
            move |state: &State, _bindings: &Bindings| {
                let Some(map) = state.get("counters").and_then(Value::as_object) else {
                    return Vec::new();
                };
                map.iter()
                    .filter(|(_, v)| v.as_i64().unwrap_or(0) < 2)
                    .map(|(k, _)| {
                        let mut b = Bindings::new();
                        b.insert("k".to_string(), json!(k));
                        plus_one.clone().ground(b, None).unwrap()
                    })
                    .collect()
            },
        ));

        let planner = Planner::new(vec![n_plus_one]);
        let state = json!({"counters": {"a": 0, "b": 0}});
        let target = Target::partial().with(
            "counters",
            Target::partial()
                .with("a", Target::exact(json!(2)))
                .with("b", Target::exact(json!(2))),
        );
        let result = planner.find_plan(&state, &target, None);
        match result {
            PlanResult::Success { start, stats } => {
                // two keys, each needing two +1 steps: fork of two singles,
                // then another fork of two singles, then terminal.
                assert_eq!(start.render(), "+\n  ~\n    - +1\n  ~\n    - +1\n+\n  ~\n    - +1\n  ~\n    - +1\n");
                assert_eq!(stats.method_expansions, 2);
            }
            PlanResult::Failure { cause, .. } => panic!("expected success, got {cause}"),
        }
    }

    #[test]
    fn no_applicable_task_yields_failure() {
        let planner = Planner::new(vec![]);
        let result = planner.find_plan(&json!(0), &Target::exact(json!(3)), None);
        assert!(!result.is_success());
    }

    #[test]
    fn non_progressing_action_is_abandoned() {
        let stuck = Arc::new(Task::action(Lens::parse("").unwrap(), Op::Update, "noop", |v: &mut View, _: &Bindings| {
            let cur = v.read().cloned().unwrap_or(json!(0));
            v.write(cur);
            Ok(())
        }));
        let planner = Planner::new(vec![stuck]);
        let result = planner.find_plan(&json!(0), &Target::exact(json!(3)), None);
        assert!(!result.is_success());
    }
}
