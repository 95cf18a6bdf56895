//! Exponential backoff with jitter for startup connections.

use std::time::Duration;

use rand::{thread_rng, Rng};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Backoff {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self { Self { max_retries: 8, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5), jitter: 0.2 } }
}

impl Backoff {
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        let delay = exp.min(self.max_delay);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter) as i64;
        let offset = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

/// Runs `op` until it succeeds or the retry budget is spent, returning the
/// last error in the latter case.
pub async fn retry_async<F, Fut, T, E>(backoff: &Backoff, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= backoff.max_retries => return Err(e),
            Err(e) => {
                let delay = backoff.delay(attempt);
                warn!(what, attempt, error = %e, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
