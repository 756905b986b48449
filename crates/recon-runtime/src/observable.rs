//! The agent's event bus. Wraps [`tokio::sync::broadcast`] directly rather
//! than replacing it — a slow subscriber falling behind loses its oldest
//! buffered events and sees [`tokio::sync::broadcast::error::RecvError::Lagged`]
//! on its next `recv()`; [`LagPolicy`] decides what [`Observable::recv_next`]
//! does about that for the caller.

use crate::events::Event;
use tokio::sync::broadcast;

/// Default channel capacity: enough to absorb a short burst of transition
/// events without forcing every subscriber to keep pace with the agent.
pub const DEFAULT_CAPACITY: usize = 256;

/// What a lagged subscriber should do on its next receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LagPolicy {
    /// Surface the lag to the caller as `None` (a dropped batch of events).
    #[default]
    Stop,
    /// Silently skip ahead to the next available event.
    SkipAndContinue,
}

/// Per-agent event broadcaster. `on()` in the public Agent API returns a
/// fresh [`broadcast::Receiver`] over the same underlying channel.
pub struct Observable {
    tx: broadcast::Sender<Event>,
}

impl Observable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Observable { tx }
    }

    /// Subscribes to this agent's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emits `event` to all current subscribers. A channel with no
    /// subscribers simply drops the event; emission never blocks the agent
    /// loop (`broadcast::Sender::send` is non-blocking by construction).
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the next event from `rx`, applying `policy` when the receiver
/// has lagged behind the broadcaster.
pub async fn recv_next(rx: &mut broadcast::Receiver<Event>, policy: LagPolicy) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Closed) => return None,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event subscriber lagged");
                match policy {
                    LagPolicy::Stop => return None,
                    LagPolicy::SkipAndContinue => continue,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = Observable::new();
        let mut rx = bus.subscribe();
        bus.emit(Event::Success);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "success");
    }

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_error() {
        let bus = Observable::new();
        bus.emit(Event::Success);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_the_event() {
        let bus = Observable::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(Event::PlanExecuted);
        assert_eq!(a.recv().await.unwrap().kind(), "plan-executed");
        assert_eq!(b.recv().await.unwrap().kind(), "plan-executed");
    }

    #[tokio::test]
    async fn lag_with_stop_policy_returns_none() {
        let bus = Observable::with_capacity(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.emit(Event::PlanExecuted);
        }
        let result = recv_next(&mut rx, LagPolicy::Stop).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn lag_with_skip_and_continue_recovers_next_event() {
        let bus = Observable::with_capacity(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.emit(Event::PlanExecuted);
        }
        let result = recv_next(&mut rx, LagPolicy::SkipAndContinue).await;
        assert!(result.is_some());
    }
}
