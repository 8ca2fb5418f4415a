// src/scholar/retry.rs
//! Retry policy, per-item throttle and the injectable clock they sleep on.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rand::Rng;

/// Source of delays. Production sleeps on tokio; tests record and return.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

pub type DynSleeper = Arc<dyn Sleeper>;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(d);
        }
    }
}

/// Bounded retry with a linear pre-attempt delay and exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            attempt_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the first external call of `attempt` (1-based).
    pub fn pre_attempt_delay(&self, attempt: u32) -> Duration {
        self.base_delay + self.attempt_step * attempt.saturating_sub(1)
    }

    /// Wait after failed `attempt`: `2^attempt` seconds plus `jitter` (clamped to [0, 1)).
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        let base = 2u64.saturating_pow(attempt.min(16));
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 0.999)
        } else {
            0.0
        };
        Duration::from_secs(base) + Duration::from_secs_f64(jitter)
    }

    /// Run `op` until it succeeds or the ceiling is hit.
    ///
    /// Errors never escape: exhaustion is reported as `None`.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max = self.max_attempts.max(1);
        for attempt in 1..=max {
            tracing::info!(target: "fetch", %label, attempt, max_attempts = max, "starting attempt");
            counter!("scholar_fetch_attempts_total").increment(1);
            sleeper.sleep(self.pre_attempt_delay(attempt)).await;

            match op(attempt).await {
                Ok(v) => return Some(v),
                Err(e) => {
                    tracing::error!(target: "fetch", %label, attempt, error = %format!("{e:#}"), "attempt failed");
                    if attempt == max {
                        tracing::error!(target: "fetch", %label, attempts = max, "giving up after retry ceiling");
                        return None;
                    }
                    let wait = self.backoff(attempt, rand::rng().random_range(0.0..1.0));
                    tracing::info!(target: "fetch", %label, wait_secs = wait.as_secs_f64(), "backing off before retry");
                    sleeper.sleep(wait).await;
                }
            }
        }
        None
    }
}

/// Randomized per-request delay window used between detail fetches.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(2_500),
            max: Duration::from_millis(3_500),
        }
    }
}

impl Throttle {
    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = self.min.as_secs_f64();
        let hi = self.max.as_secs_f64();
        Duration::from_secs_f64(rand::rng().random_range(lo..hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn pre_attempt_delay_grows_linearly() {
        let p = RetryPolicy::default();
        assert_eq!(p.pre_attempt_delay(1), Duration::from_secs(2));
        assert_eq!(p.pre_attempt_delay(2), Duration::from_secs(3));
        assert_eq!(p.pre_attempt_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_exponential_with_bounded_jitter() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1, 0.0), Duration::from_secs(2));
        assert_eq!(p.backoff(2, 0.0), Duration::from_secs(4));
        let j = p.backoff(2, 5.0);
        assert!(j < Duration::from_secs(5));
    }

    #[test]
    fn throttle_stays_inside_window() {
        let t = Throttle::default();
        for _ in 0..200 {
            let d = t.next_delay();
            assert!(d >= t.min && d <= t.max, "{d:?}");
        }
        assert_eq!(
            Throttle::fixed(Duration::from_millis(7)).next_delay(),
            Duration::from_millis(7)
        );
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let sleeper = RecordingSleeper::new();
        let out = RetryPolicy::default()
            .run(&sleeper, "test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        return Err(anyhow::anyhow!("transient {attempt}"));
                    }
                    Ok("done")
                }
            })
            .await;

        assert_eq!(out, Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 3 pre-attempt delays + 2 backoffs
        let slept = sleeper.recorded();
        assert_eq!(slept.len(), 5);
        assert_eq!(slept[0], Duration::from_secs(2));
        assert!(slept[1] >= Duration::from_secs(2) && slept[1] < Duration::from_secs(3));
        assert_eq!(slept[2], Duration::from_secs(3));
        assert!(slept[3] >= Duration::from_secs(4) && slept[3] < Duration::from_secs(5));
        assert_eq!(slept[4], Duration::from_secs(4));
    }

    #[tokio::test]
    async fn always_failing_returns_sentinel_after_ceiling() {
        let calls = AtomicU32::new(0);
        let sleeper = RecordingSleeper::new();
        let out: Option<()> = RetryPolicy::default()
            .run(&sleeper, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::anyhow!("blocked")) }
            })
            .await;

        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // no backoff after the final attempt
        assert_eq!(sleeper.recorded().len(), 5);
    }
}
