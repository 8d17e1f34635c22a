use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::RemoteError;

/// Exponential backoff policy. Policies are data; the control flow lives in
/// [`retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), capped and jittered by up to
    /// 10% to spread thundering herds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = raw.min(self.max_delay);
        let jitter_ms = capped.as_millis() as u64 / 10;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Runs `op`, retrying transient failures within the policy's attempt
/// budget. Non-transient errors surface on first occurrence.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut last_message = String::new();
    let mut last_host = String::new();
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                if let RemoteError::Transient { host, message } = &err {
                    last_host = host.clone();
                    last_message = message.clone();
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off: {err}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_transient() => {
                if let RemoteError::Transient { host, message } = err {
                    last_host = host;
                    last_message = message;
                }
                return Err(RemoteError::AttemptsExhausted {
                    host: last_host,
                    attempts: policy.max_attempts,
                    message: last_message,
                });
            }
            Err(err) => return Err(err),
        }
    }
    Err(RemoteError::AttemptsExhausted {
        host: last_host,
        attempts: policy.max_attempts,
        message: last_message,
    })
}

/// Polls `probe` every `interval` until it yields a value or the deadline
/// passes.
pub async fn wait_for<T, F, Fut>(
    label: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        if tokio::time::Instant::now() + interval > deadline {
            return Err(RemoteError::Timeout {
                label: label.to_owned(),
                secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(fast_policy(), "flaky op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RemoteError::Transient {
                    host: "10.0.0.1".to_owned(),
                    message: "connection reset".to_owned(),
                })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(fast_policy(), "dead host", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Transient {
                host: "10.0.0.1".to_owned(),
                message: "no route".to_owned(),
            })
        })
        .await;
        assert!(matches!(
            result,
            Err(RemoteError::AttemptsExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_mask_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(fast_policy(), "bad command", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::CommandFailed {
                host: "10.0.0.1".to_owned(),
                status: 127,
                stderr: "command not found".to_owned(),
            })
        })
        .await;
        assert!(matches!(result, Err(RemoteError::CommandFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_for_times_out_near_the_deadline() {
        let started = Instant::now();
        let result: Result<(), _> = wait_for(
            "never-ready",
            Duration::from_millis(300),
            Duration::from_millis(100),
            || async { None },
        )
        .await;
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(RemoteError::Timeout { .. })));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[tokio::test]
    async fn wait_for_returns_the_probed_value() {
        let calls = AtomicU32::new(0);
        let value = wait_for(
            "countdown",
            Duration::from_millis(500),
            Duration::from_millis(1),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) >= 2 {
                    Some("ready")
                } else {
                    None
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, "ready");
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        for attempt in 1..=10 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= Duration::from_secs(33), "attempt {attempt}: {delay:?}");
        }
        assert!(policy.delay_for(1) >= Duration::from_secs(1));
    }
}
