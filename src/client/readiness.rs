use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::ResultsGateConfig;

/// How a readiness wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The check produced a value.
    Ready(T),
    /// Attempts or time ran out first; callers proceed anyway.
    TimedOut,
}

/// Bounded poll-and-wait for derived data that may not exist yet.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    interval: Duration,
    max_attempts: u32,
    deadline: Duration,
}

impl ReadinessGate {
    /// Gate bounded by the configured attempts and timeout.
    pub fn new(config: &ResultsGateConfig) -> Self {
        Self {
            interval: config.interval,
            max_attempts: config.max_attempts.max(1),
            deadline: config.timeout,
        }
    }

    /// Call `attempt_fn` until it yields a value, giving up after the attempt count or the deadline.
    pub async fn wait<F, Fut, T>(&self, mut attempt_fn: F) -> GateOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let attempts = async {
            for attempt in 1..=self.max_attempts {
                if let Some(value) = attempt_fn().await {
                    return Some(value);
                }
                debug!(attempt, "readiness check not satisfied yet");
                if attempt < self.max_attempts {
                    sleep(self.interval).await;
                }
            }
            None
        };

        match timeout(self.deadline, attempts).await {
            Ok(Some(value)) => GateOutcome::Ready(value),
            Ok(None) | Err(_) => GateOutcome::TimedOut,
        }
    }
}
