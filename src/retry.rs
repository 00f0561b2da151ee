//! Bounded retry with exponential backoff around one chunk's completion call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;

use crate::config::RetryConfig;
use crate::error::{RetryError, UpstreamError};

/// Injectable pause between attempts. Production uses `tokio::time::sleep`.
pub type Sleeper = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

pub fn tokio_sleeper() -> Sleeper {
    Arc::new(|delay: Duration| -> BoxFuture<'static, ()> { Box::pin(tokio::time::sleep(delay)) })
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    sleeper: Sleeper,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, sleeper: Sleeper) -> Self {
        Self {
            max_attempts: if config.enabled {
                config.max_attempts.max(1)
            } else {
                1
            },
            base_delay: config.base_delay,
            max_delay: config.max_delay.max(config.base_delay),
            jitter: config.jitter,
            sleeper,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based),
    /// without jitter: `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter {
            return delay;
        }
        let half_ms = (delay.as_millis() / 2) as u64;
        let extra = if half_ms > 0 {
            rand::thread_rng().gen_range(0..=half_ms)
        } else {
            0
        };
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, chunk: usize, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(chunk, attempt, "✅ Chunk succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    tracing::warn!(chunk, attempt, error = %err, "Non-retryable upstream failure");
                    return Err(RetryError::Fatal(err));
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::error!(
                        chunk,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "❌ All attempts failed for chunk"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        chunk,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "⏳ Attempt failed, backing off"
                    );
                    (self.sleeper)(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Sleeper that returns immediately and records every requested delay.
    pub(crate) fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let sleeper: Sleeper = Arc::new(move |d: Duration| -> BoxFuture<'static, ()> {
            sink.lock().unwrap().push(d);
            Box::pin(async {})
        });
        (sleeper, log)
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let (sleeper, _) = recording_sleeper();
        let policy = RetryPolicy::new(&config(10), sleeper);
        let delays: Vec<u128> = (1..=6).map(|a| policy.backoff(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_disabled_means_single_attempt() {
        let (sleeper, _) = recording_sleeper();
        let cfg = RetryConfig {
            enabled: false,
            ..config(5)
        };
        assert_eq!(RetryPolicy::new(&cfg, sleeper).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let (sleeper, log) = recording_sleeper();
        let policy = RetryPolicy::new(&config(5), sleeper);
        let calls = AtomicU32::new(0);

        let result = policy
            .run(0, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(UpstreamError::RateLimited("429".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let (sleeper, log) = recording_sleeper();
        let policy = RetryPolicy::new(&config(4), sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(2, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::Transport("connection reset".into())) }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 4,
                last: UpstreamError::Transport("connection reset".into())
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // no sleep after the final attempt
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let (sleeper, log) = recording_sleeper();
        let policy = RetryPolicy::new(&config(5), sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(0, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::Auth(401)) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Fatal(UpstreamError::Auth(401))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jitter_stays_within_bounds() {
        let (sleeper, log) = recording_sleeper();
        let cfg = RetryConfig {
            jitter: true,
            ..config(6)
        };
        let policy = RetryPolicy::new(&cfg, sleeper);

        let _: Result<(), _> = policy
            .run(0, |_| async { Err(UpstreamError::Server(503)) })
            .await;

        let delays = log.lock().unwrap().clone();
        assert_eq!(delays.len(), 5);
        for (i, d) in delays.iter().enumerate() {
            let base = policy.backoff(i as u32 + 1);
            assert!(*d >= base);
            assert!(*d <= Duration::from_millis(1000));
        }
    }
}
