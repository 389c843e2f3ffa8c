use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration, Instant};
use tracing::{error, warn};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff bounded by total elapsed time.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub initial_delay: Duration,
    /// delay is multiplied by this factor after every failed attempt, up to `max_delay`
    pub multiplier: f64,
    pub max_delay: Duration,
    /// no wait is started that would end past this budget
    pub max_elapsed: Duration,
}

impl RetrySettings {
    /// Retry budget for one refresh cycle: a quarter of the refresh interval.
    pub fn for_refresh_interval(refresh: Duration) -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_elapsed: refresh / 4,
        }
    }

    pub async fn run_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = Instant::now();
        let mut delay = self.initial_delay;

        for attempt in 1u32.. {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let elapsed = start.elapsed();
                    if elapsed + delay > self.max_elapsed {
                        error!("attempt {attempt} failed, retry budget {:?} exhausted after {:?}: {e}", self.max_elapsed, elapsed);
                        return Err(e);
                    }
                    warn!("attempt {attempt} failed: {e}. Retrying in {:?}", delay);
                    sleep(delay).await;
                    delay = delay.mul_f64(self.multiplier).min(self.max_delay);
                }
            }
        }
        unreachable!("Retry loop exhausted unexpectedly")
    }
}
