//! Walks a [`PlanNode`] DAG against live state, running each action's
//! execution-time body and committing or reverting its tracked scope
//! (§5: "Branches execute concurrently... fork spawns its branches as
//! cooperative tasks"; "a timed-out action is treated identically to a
//! failed action").

use crate::cancel::CancellationToken;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::Event;
use crate::observable::Observable;
use recon_core::error::CoreError;
use recon_core::plan::PlanNode;
use recon_core::task::Instruction;
use recon_core::view::View;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::Instrument;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a running plan needs: the shared world state, the event
/// sink, and the cancellation token `stop()` triggers. Cheap to clone —
/// every field is itself an `Arc`.
#[derive(Clone)]
pub struct ExecutionContext {
    pub state: Arc<RwLock<Value>>,
    pub observable: Arc<Observable>,
    pub cancel: CancellationToken,
    pub action_timeout: Option<Duration>,
}

/// Executes `node` to completion (or first failure), recursing through
/// `Action`/`Fork` continuations. Boxed because the walk is recursive across
/// `.await` points.
pub fn execute_plan(node: PlanNode, ctx: ExecutionContext) -> BoxFuture<'static, RuntimeResult<()>> {
    Box::pin(async move {
        match node {
            PlanNode::Terminal => Ok(()),
            PlanNode::Action { instruction, next } => {
                execute_action(&instruction, &ctx).await?;
                execute_plan(*next, ctx).await
            }
            PlanNode::Fork { branches, next } => {
                execute_fork(branches, &ctx).await?;
                execute_plan(*next, ctx).await
            }
        }
    })
}

/// Spawns one cooperative task per branch (disjoint sub-trees, guaranteed by
/// the planner's conflict detector). The fork fails as soon as every branch
/// has settled, with the first encountered failure as its cause.
async fn execute_fork(branches: Vec<PlanNode>, ctx: &ExecutionContext) -> RuntimeResult<()> {
    let span = tracing::info_span!("agent.fork.branch");
    let handles: Vec<_> = branches
        .into_iter()
        .map(|branch| {
            let ctx = ctx.clone();
            let span = span.clone();
            tokio::spawn(async move { execute_plan(branch, ctx).instrument(span).await })
        })
        .collect();

    let mut first_err = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(join_err) => {
                if first_err.is_none() {
                    first_err = Some(RuntimeError::Internal(join_err.to_string()));
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn execute_action(instruction: &Instruction, ctx: &ExecutionContext) -> RuntimeResult<()> {
    ctx.observable.emit(Event::ActionNext { action: instruction.clone() });

    if ctx.cancel.is_cancelled() {
        return Err(RuntimeError::ActionCancelled);
    }

    let holds = {
        let state = ctx.state.read().await;
        instruction.task.condition_holds(&state, &instruction.path, &instruction.bindings)
    };
    if !holds {
        ctx.observable.emit(Event::ActionConditionFailed { action: instruction.clone() });
        return Err(RuntimeError::Core(CoreError::ConditionFailed(instruction.description())));
    }

    ctx.observable.emit(Event::ActionStart { action: instruction.clone() });

    let span = tracing::info_span!("agent.action", action = %instruction.description());
    let result = run_tracked(instruction, ctx).instrument(span).await;

    match &result {
        Ok(()) => ctx.observable.emit(Event::ActionSuccess { action: instruction.clone() }),
        Err(e) => ctx
            .observable
            .emit(Event::ActionFailure { action: instruction.clone(), cause: e.to_string() }),
    }
    result
}

/// Commits the instruction's effect/action atomically: runs it against a
/// copy-on-write buffer and only writes the buffer back on success, racing
/// cancellation and (optionally) a per-action timeout.
async fn run_tracked(instruction: &Instruction, ctx: &ExecutionContext) -> RuntimeResult<()> {
    let mut guard = ctx.state.write().await;
    let mut buffer = guard.clone();
    let outcome = {
        let mut view =
            View::with_target(&mut buffer, instruction.path.clone(), instruction.target.clone());
        let run = instruction.task.run_action(&mut view, &instruction.bindings);
        race(run, ctx).await
    };

    match outcome {
        Ok(()) => {
            *guard = buffer;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn race<F>(run: F, ctx: &ExecutionContext) -> RuntimeResult<()>
where
    F: Future<Output = Result<(), CoreError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(RuntimeError::ActionCancelled),
        outcome = with_timeout(run, ctx.action_timeout) => outcome,
    }
}

async fn with_timeout<F>(run: F, timeout: Option<Duration>) -> RuntimeResult<()>
where
    F: Future<Output = Result<(), CoreError>>,
{
    match timeout {
        None => run.await.map_err(RuntimeError::from),
        Some(d) => match tokio::time::timeout(d, run).await {
            Ok(result) => result.map_err(RuntimeError::from),
            Err(_) => Err(RuntimeError::Timeout { duration_ms: d.as_millis() as u64 }),
        },
    }
}
