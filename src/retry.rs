// Exponential backoff retry for connection establishment

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrySettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: u32) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.initial_delay_seconds),
            settings.backoff_multiplier,
        )
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// Every failure before the last attempt is logged and followed by a
    /// sleep that grows by `backoff_multiplier`. The last attempt's result is
    /// returned as-is, so the caller always sees the real final error.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_when(operation_name, |_| true, operation).await
    }

    /// Like [`execute`](Self::execute), but an error for which `retryable`
    /// returns false is returned immediately.
    pub async fn execute_when<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        retryable: P,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut remaining = self.max_attempts;
        let mut delay = self.initial_delay;

        while remaining > 1 {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !retryable(&error) => {
                    warn!("{} failed: {}, not retrying", operation_name, error);
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        "{} failed: {}, Retrying in {} seconds...",
                        operation_name,
                        error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    remaining -= 1;
                    delay = self.next_delay(delay);
                }
            }
        }

        debug!("{} final attempt", operation_name);
        operation().await
    }

    /// Grow `delay` by the backoff multiplier, saturating at `Duration::MAX`
    fn next_delay(&self, delay: Duration) -> Duration {
        delay
            .checked_mul(self.backoff_multiplier)
            .unwrap_or(Duration::MAX)
    }
}
