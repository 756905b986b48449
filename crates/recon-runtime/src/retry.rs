//! Retry delay strategy used by the agent's backoff loop (§4.6: "any action
//! fails → emit `action-failure`, enter exponential `backoff`... then
//! re-plan").

use std::time::Duration;

#[cfg(feature = "random-jitter")]
use rand::Rng;

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Same delay every attempt.
    Fixed { delay_ms: u64 },
    /// Delay increases linearly: `base_ms * attempt`.
    Linear { base_ms: u64 },
    /// Exponential backoff capped at `max_ms`, with optional jitter.
    ///
    /// When the `random-jitter` feature is enabled, jitter is uniformly
    /// distributed in \[75%, 100%\] of the capped delay, avoiding correlated
    /// retries (thundering herd). Without the feature, a deterministic
    /// ±12.5% alternation is used instead.
    ExponentialBackoff {
        base_ms: u64,
        max_ms: u64,
        jitter: bool,
    },
}

impl RetryPolicy {
    /// Returns the sleep duration before the given retry attempt (0-indexed).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let ms = match self {
            RetryPolicy::Fixed { delay_ms } => *delay_ms,
            RetryPolicy::Linear { base_ms } => base_ms.saturating_mul((attempt + 1) as u64),
            RetryPolicy::ExponentialBackoff {
                base_ms,
                max_ms,
                jitter,
            } => {
                let exp = 1u64
                    .checked_shl(attempt as u32)
                    .and_then(|s| base_ms.checked_mul(s))
                    .unwrap_or(*max_ms);
                let capped = exp.min(*max_ms);
                if *jitter {
                    #[cfg(feature = "random-jitter")]
                    {
                        let min_delay = capped.saturating_mul(3) / 4;
                        rand::thread_rng()
                            .gen_range(min_delay..=capped)
                            .min(*max_ms)
                    }
                    #[cfg(not(feature = "random-jitter"))]
                    {
                        let eighth = capped / 8;
                        if attempt.is_multiple_of(2) {
                            capped.saturating_add(eighth)
                        } else {
                            capped.saturating_sub(eighth)
                        }
                        .min(*max_ms)
                    }
                } else {
                    capped
                }
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::ExponentialBackoff { base_ms: 250, max_ms: 30_000, jitter: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy_delay() {
        let p = RetryPolicy::Fixed { delay_ms: 500 };
        assert_eq!(p.delay_for(0), Duration::from_millis(500));
        assert_eq!(p.delay_for(5), Duration::from_millis(500));
    }

    #[test]
    fn test_linear_policy_delay() {
        let p = RetryPolicy::Linear { base_ms: 200 };
        assert_eq!(p.delay_for(0), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(600));
    }

    #[test]
    fn test_exponential_policy_delay() {
        let p = RetryPolicy::ExponentialBackoff { base_ms: 100, max_ms: 800, jitter: false };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_jitter_does_not_exceed_cap() {
        let p = RetryPolicy::ExponentialBackoff { base_ms: 500, max_ms: 1_000, jitter: true };
        for attempt in 0..10 {
            let delay = p.delay_for(attempt).as_millis();
            assert!(delay <= 1_000, "attempt {attempt}: delay {delay}ms exceeded cap");
        }
    }

    #[cfg(feature = "random-jitter")]
    #[test]
    fn test_random_jitter_within_bounds() {
        let base_ms: u64 = 200;
        let max_ms: u64 = 5_000;
        let p = RetryPolicy::ExponentialBackoff { base_ms, max_ms, jitter: true };

        for attempt in 0..15 {
            for _ in 0..100 {
                let delay = p.delay_for(attempt).as_millis() as u64;
                let exp = 1u64
                    .checked_shl(attempt as u32)
                    .and_then(|s| base_ms.checked_mul(s))
                    .unwrap_or(max_ms);
                let capped = exp.min(max_ms);
                let lower = capped.saturating_mul(3) / 4;
                assert!(delay >= lower, "attempt {attempt}: delay {delay}ms < lower bound {lower}ms");
                assert!(delay <= max_ms, "attempt {attempt}: delay {delay}ms > cap {max_ms}ms");
            }
        }
    }
}
