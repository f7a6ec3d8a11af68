use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exponential retry schedule used for the baseline status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            multiplier: 2,
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, the attempt budget is spent, or `cancel` fires.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            return Err(err.context(format!("{label} failed after {max_attempts} attempts")));
        }

        let delay = policy.delay_after(attempt);
        warn!(
            %label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after backoff"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(anyhow!("{label} cancelled during backoff")),
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..policy.max_attempts)
            .map(|attempt| policy.delay_after(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
    }

    #[test]
    fn delays_are_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(6), Duration::from_millis(30_000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: anyhow::Result<()> = retry_with_backoff(
            &BackoffPolicy::default(),
            &CancellationToken::new(),
            "baseline",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("unreachable")) }
            },
        )
        .await;

        let err = result.expect_err("all attempts fail");
        assert!(err.to_string().contains("failed after 5 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let value = retry_with_backoff(
            &BackoffPolicy::default(),
            &CancellationToken::new(),
            "baseline",
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(anyhow!("not yet"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await
        .expect("third attempt succeeds");

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: anyhow::Result<()> =
            retry_with_backoff(&BackoffPolicy::default(), &cancel, "baseline", || async {
                Err(anyhow!("down"))
            })
            .await;

        assert!(result
            .expect_err("cancelled")
            .to_string()
            .contains("cancelled"));
    }
}
