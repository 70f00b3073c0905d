/// Periodic Task Runner with Circuit Breaker
///
/// Runs a background task on a fixed interval. Failures are retried with
/// exponential backoff; after too many consecutive failures the circuit opens
/// and the task rests for a cooldown before the next attempt.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Scheduling and failure policy of a background task
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Delay between successful runs
    pub interval: Duration,
    /// Consecutive failures that open the circuit
    pub max_consecutive_failures: u32,
    /// First retry delay, doubled after each failure
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Rest period once the circuit is open
    pub open_cooldown: Duration,
}

impl CircuitBreakerConfig {
    /// Defaults for a task running every `interval`
    pub fn periodic(interval: Duration) -> Self {
        Self {
            interval,
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(300),
            open_cooldown: interval.max(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    fn record_failure(&mut self, max_delay: Duration) {
        self.consecutive_failures += 1;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Drive `task_fn` forever under `config`. `task_name` only labels the logs.
///
/// Never returns; abort the spawned handle to stop it.
pub async fn run_with_circuit_breaker<F, Fut>(
    task_name: &str,
    config: CircuitBreakerConfig,
    mut task_fn: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(config.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                sleep(config.interval).await;
            }
            Err(e) => {
                state.record_failure(config.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    error!(
                        "Circuit open for task '{}' after {} consecutive failures, pausing for {:?}",
                        task_name, state.consecutive_failures, config.open_cooldown
                    );
                    sleep(config.open_cooldown).await;
                    state.reset(config.initial_retry_delay);
                    info!("Circuit half-open for task '{}', retrying", task_name);
                    continue;
                }

                warn!(
                    "Task '{}' will retry in {:?}",
                    task_name, state.current_retry_delay
                );
                sleep(state.current_retry_delay).await;
            }
        }
    }
}
