//! Exponential backoff for generation and judge calls.
//!
//! Only transient [`CallError`]s are retried (see
//! [`CallError::is_transient`]). Every outcome carries the number of
//! attempts made so results can report it.

use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

use crate::config::RetryConfig;
use crate::constants::JUDGE_MAX_ATTEMPTS;
use crate::error::CallError;

/// Backoff parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included. Always at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Randomize each delay within `[delay/2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
            jitter: cfg.jitter,
        }
    }
}

impl RetryPolicy {
    /// No retries: one attempt only.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Policy for judge calls: the same backoff, at most one retry.
    #[must_use]
    pub fn for_judge(&self) -> Self {
        Self {
            max_attempts: self.max_attempts.min(JUDGE_MAX_ATTEMPTS),
            ..self.clone()
        }
    }

    /// Un-jittered delay after `attempt` failed attempts (1-based).
    ///
    /// `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exp);
        let millis = self.base_delay.as_secs_f64() * 1000.0 * factor;
        let cap = self.max_delay.as_secs_f64() * 1000.0;
        if !millis.is_finite() || millis >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(millis / 1000.0)
    }

    /// [`delay_for`](Self::delay_for) with jitter applied when enabled.
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = u64::try_from((delay - half).as_millis()).unwrap_or(u64::MAX);
        half + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

/// Outcome of a retried operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Attempted<T> {
    /// Final result: the first success, or the last error.
    pub result: Result<T, CallError>,
    /// Attempts made, at least 1.
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails non-transiently, or attempts run out.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.jittered_delay_for(attempt);
                tracing::warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient call failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::debug!(call = label, attempt, error = %err, "call failed");
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(4), Duration::from_millis(4000));
        assert_eq!(p.delay_for(5), Duration::from_millis(8000));
        assert_eq!(p.delay_for(40), Duration::from_millis(8000));
    }

    #[test]
    fn jitter_stays_within_half_and_full() {
        let p = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for attempt in 1..6 {
            let full = p.delay_for(attempt);
            let d = p.jittered_delay_for(attempt);
            assert!(d <= full && d >= full / 2, "{d:?} vs {full:?}");
        }
    }

    #[test]
    fn judge_policy_retries_at_most_once() {
        let p = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        };
        assert_eq!(p.for_judge().max_attempts, 2);
        assert_eq!(RetryPolicy::none().for_judge().max_attempts, 1);
    }

    #[test]
    fn config_zero_attempts_becomes_one() {
        let cfg = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&cfg).max_attempts, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let out = retry(&fast(3), "test", move |_| {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CallError::RateLimited("slow down".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(out.result, Ok(42));
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let out: Attempted<()> = retry(&fast(2), "test", |_| async {
            Err(CallError::Timeout { secs: 1 })
        })
        .await;
        assert_eq!(out.result, Err(CallError::Timeout { secs: 1 }));
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let out: Attempted<()> = retry(&fast(5), "test", |_| async {
            Err(CallError::Rejected("content policy".into()))
        })
        .await;
        assert_eq!(out.attempts, 1);
        assert!(matches!(out.result, Err(CallError::Rejected(_))));
    }

    #[tokio::test]
    async fn malformed_reply_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let out = retry(&fast(3), "test", move |_| {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CallError::Malformed("not json".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(out.result, Ok(7));
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn attempt_number_is_passed_to_op() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _: Attempted<()> = retry(&fast(3), "test", move |n| {
            s.lock().unwrap().push(n);
            async { Err(CallError::Transport("reset".into())) }
        })
        .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
