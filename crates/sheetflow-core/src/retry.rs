//! Bounded retry for source fetches
//!
//! Only [`FetchError::Transient`] failures are retried. A permanent failure
//! stops the loop on the spot.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::source::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. A timed-out attempt counts
    /// as a transient failure.
    pub async fn run<T, F, Fut>(
        &self,
        source_name: &str,
        attempt_timeout: Duration,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = match tokio::time::timeout(attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Transient(format!(
                    "attempt timed out after {:?}",
                    attempt_timeout
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(source = %source_name, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(FetchError::Permanent(reason)) => {
                    return Err(PipelineError::SourceRejected {
                        source_name: source_name.to_string(),
                        reason,
                    });
                },
                Err(FetchError::Transient(reason)) => {
                    warn!(
                        source = %source_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %reason,
                        "Fetch attempt failed"
                    );
                    last_error = reason;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                },
            }
        }

        Err(PipelineError::RetryExhausted {
            source_name: source_name.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}
