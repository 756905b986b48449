//! The reconciliation agent (§4.6): a background event loop driving
//! `{idle, planning, executing, waiting, stopped}` transitions over a shared
//! state value, re-planning on sensor updates and retrying failed actions
//! with exponential backoff before surfacing `failure`.

use crate::cancel::CancellationToken;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::Event;
use crate::executor::{execute_plan, ExecutionContext};
use crate::observable::Observable;
use crate::retry::RetryPolicy;
use crate::sensor::Sensor;
use recon_core::lens::Bindings;
use recon_core::path::Pointer;
use recon_core::plan::PlanResult;
use recon_core::planner::Planner;
use recon_core::task::Task;
use recon_core::value::{State, Target};
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::Instrument;

/// The agent's externally-visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Planning,
    Executing,
    Waiting,
    Stopped,
}

/// Tuning knobs for an [`Agent`]'s planning/backoff loop and sensor wiring.
pub struct AgentOptions {
    /// Minimum delay before the first re-plan attempt after an action fails.
    pub min_wait_ms: u64,
    /// Bounded number of re-plan attempts before surfacing `failure`.
    pub max_retries: usize,
    /// Base delay for the exponential backoff applied between retries.
    pub backoff_base_ms: u64,
    /// Cap on the backoff delay.
    pub max_backoff_ms: u64,
    /// Sensors feeding live updates into the agent's state while it runs.
    pub sensors: Vec<Arc<dyn Sensor>>,
    /// Whether the agent re-enters `waiting` (rather than `idle`) once its
    /// target is met, continuing to watch sensors for drift.
    pub follow: bool,
    /// Deadline given to each planning attempt.
    pub plan_timeout: Option<Duration>,
    /// Deadline given to each action's execution.
    pub action_timeout: Option<Duration>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            min_wait_ms: 0,
            max_retries: 5,
            backoff_base_ms: 250,
            max_backoff_ms: 30_000,
            sensors: Vec::new(),
            follow: false,
            plan_timeout: None,
            action_timeout: None,
        }
    }
}

enum Command {
    Seek(Target),
    Stop(oneshot::Sender<()>),
    Wait(oneshot::Sender<RuntimeResult<State>>),
}

/// A running reconciliation agent. Clones share the same background task,
/// state, and event stream.
#[derive(Clone)]
pub struct Agent {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<State>>,
    observable: Arc<Observable>,
}

impl Agent {
    pub fn new(initial: State, tasks: Vec<Arc<Task>>, opts: AgentOptions) -> Self {
        let state = Arc::new(RwLock::new(initial));
        let observable = Arc::new(Observable::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(32);

        for sensor in &opts.sensors {
            tokio::spawn(
                forward_sensor(sensor.clone(), state.clone())
                    .instrument(tracing::info_span!("agent.sensor")),
            );
        }

        let loop_state = state.clone();
        let loop_observable = observable.clone();
        tokio::spawn(
            run_loop(loop_state, loop_observable, cancel, tasks, opts, rx)
                .instrument(tracing::info_span!("agent.loop")),
        );

        Agent { commands: tx, state, observable }
    }

    /// Sets the desired target. Idempotent if the target is unchanged from
    /// the one currently being pursued; accepted from any phase.
    pub fn seek(&self, target: Target) {
        let _ = self.commands.try_send(Command::Seek(target));
    }

    /// Cancels the current action, if any, and transitions to `stopped`.
    /// Resolves once cleanup (reverting any in-flight tracked scope) has
    /// completed.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Waits for the current pursuit to resolve into `success` or `failure`,
    /// honoring an optional overall timeout.
    pub async fn wait(&self, timeout: Option<Duration>) -> RuntimeResult<State> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Wait(tx))
            .await
            .map_err(|_| RuntimeError::Internal("agent loop terminated".into()))?;

        let recv = async move { rx.await.map_err(|_| RuntimeError::Internal("agent loop terminated".into()))? };
        match timeout {
            Some(d) => tokio::time::timeout(d, recv)
                .await
                .map_err(|_| RuntimeError::Timeout { duration_ms: d.as_millis() as u64 })?,
            None => recv.await,
        }
    }

    /// An immutable snapshot of the current state.
    pub async fn state(&self) -> State {
        self.state.read().await.clone()
    }

    /// Subscribes to this agent's event stream.
    pub fn on(&self) -> broadcast::Receiver<Event> {
        self.observable.subscribe()
    }
}

enum Outcome {
    Success(State),
    Failure(RuntimeError),
}

async fn run_loop(
    state: Arc<RwLock<State>>,
    observable: Arc<Observable>,
    cancel: CancellationToken,
    tasks: Vec<Arc<Task>>,
    opts: AgentOptions,
    mut commands: mpsc::Receiver<Command>,
) {
    let planner = Arc::new(Planner::new(tasks));
    let opts = Arc::new(opts);
    let mut target: Option<Target> = None;
    let mut waiters: Vec<oneshot::Sender<RuntimeResult<State>>> = Vec::new();
    let mut pursuit: Option<oneshot::Receiver<Outcome>> = None;

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Seek(t)) => {
                        if target.as_ref() != Some(&t) {
                            target = Some(t.clone());
                            observable.emit(Event::Start { target: t.clone() });

                            let (tx, rx) = oneshot::channel();
                            pursuit = Some(rx);
                            let state = state.clone();
                            let observable = observable.clone();
                            let cancel = cancel.clone();
                            let planner = planner.clone();
                            let opts = opts.clone();
                            tokio::spawn(async move {
                                let outcome = pursue(&state, &observable, &cancel, &planner, &t, &opts).await;
                                let _ = tx.send(outcome);
                            });
                        }
                    }
                    Some(Command::Stop(ack)) => {
                        cancel.trigger();
                        let _ = ack.send(());
                        return;
                    }
                    Some(Command::Wait(tx)) => waiters.push(tx),
                    None => return,
                }
            }
            Some(outcome) = recv_pursuit(&mut pursuit) => {
                if matches!(outcome, Outcome::Success(_)) && !opts.follow {
                    target = None;
                }
                notify_waiters(&mut waiters, &outcome);
                pursuit = None;
            }
        }
    }
}

/// Awaits the in-flight pursuit's outcome, if any, or never resolves while
/// none is running — lets `select!` poll it alongside the command channel
/// without blocking command intake during a pursuit.
async fn recv_pursuit(pursuit: &mut Option<oneshot::Receiver<Outcome>>) -> Option<Outcome> {
    match pursuit {
        Some(rx) => rx.await.ok(),
        None => std::future::pending().await,
    }
}

fn notify_waiters(waiters: &mut Vec<oneshot::Sender<RuntimeResult<State>>>, outcome: &Outcome) {
    for tx in waiters.drain(..) {
        let result = match outcome {
            Outcome::Success(s) => Ok(s.clone()),
            Outcome::Failure(e) => Err(clone_runtime_error(e)),
        };
        let _ = tx.send(result);
    }
}

fn clone_runtime_error(e: &RuntimeError) -> RuntimeError {
    RuntimeError::Internal(e.to_string())
}

/// Forwards a sensor's emissions directly onto the shared state as `update`
/// operations at its bound path, independent of whatever the agent loop is
/// doing. A later action's live condition re-check (in `executor::execute_action`)
/// is what makes a stale plan notice the drift and re-plan.
async fn forward_sensor(sensor: Arc<dyn Sensor>, state: Arc<RwLock<State>>) {
    let path = match sensor.lens().ground(&Bindings::new()) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "sensor lens could not be grounded, dropping sensor");
            return;
        }
    };
    let mut stream = sensor.subscribe();
    while let Some(value) = stream.next().await {
        let mut guard = state.write().await;
        Pointer::assign(&mut guard, &path, value);
    }
}

/// Runs the plan → execute → (replan on sensor drift | backoff on failure)
/// loop until the target is met or retries are exhausted.
async fn pursue(
    state: &Arc<RwLock<State>>,
    observable: &Arc<Observable>,
    cancel: &CancellationToken,
    planner: &Planner,
    target: &Target,
    opts: &AgentOptions,
) -> Outcome {
    let target = target.clone();
    let policy = RetryPolicy::ExponentialBackoff {
        base_ms: opts.backoff_base_ms,
        max_ms: opts.max_backoff_ms,
        jitter: true,
    };

    let mut attempt = 0usize;
    loop {
        let snapshot = state.read().await.clone();
        observable.emit(Event::FindPlan { state: snapshot.clone(), target: target.clone() });

        let deadline = opts.plan_timeout.map(|d| Instant::now() + d);
        let result = planner.find_plan(&snapshot, &target, deadline);

        let start = match result {
            PlanResult::Success { start, stats } => {
                observable.emit(Event::PlanFound { start: start.clone(), stats });
                start
            }
            PlanResult::Failure { cause, stats } => {
                if cause == recon_core::plan::FailureCause::Timeout {
                    observable.emit(Event::PlanTimeout { timeout: opts.plan_timeout.unwrap_or_default() });
                } else {
                    observable.emit(Event::PlanNotFound { cause: cause.clone(), stats });
                }
                return Outcome::Failure(RuntimeError::PlanNotFound { attempts: attempt + 1 });
            }
        };

        let ctx = ExecutionContext {
            state: state.clone(),
            observable: observable.clone(),
            cancel: cancel.clone(),
            action_timeout: opts.action_timeout,
        };

        let exec_result = execute_plan(start, ctx).await;
        observable.emit(Event::PlanExecuted);

        match exec_result {
            Ok(()) => {
                let after = state.read().await.clone();
                let still_needed = !recon_core::diff::diff(&after, &target).is_empty();
                if !still_needed {
                    observable.emit(Event::Success);
                    return Outcome::Success(after);
                }
                // Converged less than expected (e.g. a sensor raced the
                // commit); loop straight back into planning, no backoff.
                continue;
            }
            Err(e) => {
                attempt += 1;
                if attempt > opts.max_retries {
                    observable.emit(Event::Failure { cause: e.to_string() });
                    return Outcome::Failure(e);
                }
                let delay = min_wait(opts.min_wait_ms, policy.delay_for(attempt - 1));
                observable.emit(Event::Backoff { tries: attempt, delay_ms: delay.as_millis() as u64 });
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn min_wait(min_wait_ms: u64, computed: Duration) -> Duration {
    computed.max(Duration::from_millis(min_wait_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recon_core::error::CoreError;
    use recon_core::lens::{Bindings, Lens};
    use recon_core::task::{Action, Op};
    use recon_core::view::View;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn set_task() -> Arc<Task> {
        Arc::new(Task::action(Lens::parse("").unwrap(), Op::Update, "set", |v: &mut View, _: &Bindings| {
            if let Some(t) = v.target().cloned() {
                v.write(t);
            }
            Ok(())
        }))
    }

    #[tokio::test]
    async fn seek_reaches_target_and_wait_returns_state() {
        let agent = Agent::new(json!(0), vec![set_task()], AgentOptions::default());
        agent.seek(Target::exact(json!(3)));
        let result = agent.wait(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(result, json!(3));
        assert_eq!(agent.state().await, json!(3));
    }

    #[tokio::test]
    async fn stop_transitions_agent_to_stopped_and_resolves() {
        let agent = Agent::new(json!(0), vec![set_task()], AgentOptions::default());
        agent.stop().await;
    }

    /// Fails its first execution-time invocation, then adopts the grounded
    /// target. The planning-time effect is kept pure (always succeeds) so
    /// re-planning after the failure sees the same plan again.
    struct FlakyOnce {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Action for FlakyOnce {
        async fn run(&self, view: &mut View<'_>, _bindings: &Bindings) -> Result<(), CoreError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(CoreError::ActionFailed("transient".into()));
            }
            if let Some(t) = view.target().cloned() {
                view.write(t);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn action_failure_retries_with_backoff_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let flaky = Arc::new(
            Task::action(Lens::parse("").unwrap(), Op::Update, "flaky-set", |v: &mut View, _: &Bindings| {
                if let Some(t) = v.target().cloned() {
                    v.write(t);
                }
                Ok(())
            })
            .with_action(FlakyOnce { attempts: attempts.clone() }),
        );

        let mut opts = AgentOptions::default();
        opts.backoff_base_ms = 1;
        opts.max_backoff_ms = 5;
        let agent = Agent::new(json!(0), vec![flaky], opts);

        let mut events = agent.on();
        agent.seek(Target::exact(json!(1)));
        let result = agent.wait(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(result, json!(1));

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert!(kinds.contains(&"action-failure"));
        assert!(kinds.contains(&"backoff"));
        assert!(kinds.contains(&"success"));
    }

    struct AlwaysFails;

    #[async_trait]
    impl Action for AlwaysFails {
        async fn run(&self, _view: &mut View<'_>, _bindings: &Bindings) -> Result<(), CoreError> {
            Err(CoreError::ActionFailed("nope".into()))
        }
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_failure() {
        let always_fails = Arc::new(
            Task::action(Lens::parse("").unwrap(), Op::Update, "always-fails", |v: &mut View, _: &Bindings| {
                if let Some(t) = v.target().cloned() {
                    v.write(t);
                }
                Ok(())
            })
            .with_action(AlwaysFails),
        );
        let mut opts = AgentOptions::default();
        opts.max_retries = 1;
        opts.backoff_base_ms = 1;
        opts.max_backoff_ms = 2;
        let agent = Agent::new(json!(0), vec![always_fails], opts);
        agent.seek(Target::exact(json!(1)));
        let result = agent.wait(Some(Duration::from_secs(2))).await;
        assert!(result.is_err());
    }
}
