// Retry and per-attempt timeout around a single operation call

use crate::config::ServerConfig;
use crate::descriptor::Operation;
use crate::error::OperationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Error text fragments that mark a failure as transient
pub const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "temporarily unavailable",
    "rate limit",
    "too many requests",
    "503",
    "429",
];

pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff before retry `n` (counted from 0) is `backoff_base^n` seconds
    pub backoff_base: f64,
    /// Bound on each attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_attempts: config.attempts(),
            backoff_base: config.backoff_base,
            timeout: config.timeout(),
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let seconds = self.backoff_base.powi(attempt as i32);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

/// Cumulative executor counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub total_calls: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
    pub total_failures: u64,
}

/// Outcome of one execution, with the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Result<Value, OperationError>,
    pub attempts: u32,
}

pub struct Executor {
    policy: RetryPolicy,
    total_calls: AtomicU64,
    total_attempts: AtomicU64,
    total_retries: AtomicU64,
    total_failures: AtomicU64,
}

impl Executor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            total_calls: AtomicU64::new(0),
            total_attempts: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the operation, retrying transient failures with exponential backoff
    pub async fn execute(&self, operation: &Operation, arguments: &Value) -> Execution {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            self.total_attempts.fetch_add(1, Ordering::Relaxed);
            let result = self.attempt(operation, arguments.clone()).await;
            attempt += 1;

            match result {
                Ok(value) => {
                    return Execution {
                        outcome: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if attempt < max_attempts && is_retryable(&e.message) => {
                    let backoff = self.policy.backoff_for_attempt(attempt - 1);
                    warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    debug!(attempts = attempt, error = %e, "Operation failed");
                    self.total_failures.fetch_add(1, Ordering::Relaxed);
                    return Execution {
                        outcome: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn attempt(&self, operation: &Operation, arguments: Value) -> Result<Value, OperationError> {
        let timeout = self.policy.timeout;
        let timed_out = || OperationError::timeout(timeout.as_secs());

        match operation {
            Operation::Awaited(op) => tokio::time::timeout(timeout, op.call(arguments))
                .await
                .map_err(|_| timed_out())?,
            Operation::Direct(f) => {
                let f = f.clone();
                // On timeout the blocking task keeps running; its result is dropped
                let handle = tokio::task::spawn_blocking(move || f(arguments));
                match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => Err(OperationError::new(
                        "Panic",
                        format!("operation panicked: {}", join),
                    )),
                    Err(_) => Err(timed_out()),
                }
            }
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::AsyncOperation;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    /// Fails with `message` until the given number of calls has been made
    struct Flaky {
        calls: Arc<AtomicU32>,
        failures: u32,
        message: &'static str,
    }

    #[async_trait::async_trait]
    impl AsyncOperation for Flaky {
        async fn call(&self, arguments: Value) -> Result<Value, OperationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(OperationError::message(self.message))
            } else {
                Ok(arguments)
            }
        }
    }

    fn flaky(failures: u32, message: &'static str) -> (Operation, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let op = Operation::awaited(Flaky {
            calls: calls.clone(),
            failures,
            message,
        });
        (op, calls)
    }

    struct Sleeper(Duration);

    #[async_trait::async_trait]
    impl AsyncOperation for Sleeper {
        async fn call(&self, _arguments: Value) -> Result<Value, OperationError> {
            tokio::time::sleep(self.0).await;
            Ok(json!("done"))
        }
    }

    #[test]
    fn test_retryable_patterns() {
        assert!(is_retryable("Connection reset by peer"));
        assert!(is_retryable("HTTP 503: Service Unavailable"));
        assert!(is_retryable("Too Many Requests"));
        assert!(is_retryable("timeout: execution exceeded 30s"));
        assert!(!is_retryable("invalid argument"));
        assert!(!is_retryable("HTTP 404: not found"));
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(4));

        let broken = RetryPolicy {
            backoff_base: -1.0,
            ..Default::default()
        };
        assert_eq!(broken.backoff_for_attempt(1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let executor = Executor::new(RetryPolicy::default());
        let (op, calls) = flaky(2, "timeout");

        let started = tokio::time::Instant::now();
        let execution = executor.execute(&op, &json!({"id": 1})).await;

        assert_eq!(execution.outcome, Ok(json!({"id": 1})));
        assert_eq!(execution.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2^0 + 2^1 seconds of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        let stats = executor.stats();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let executor = Executor::new(RetryPolicy::default());
        let (op, calls) = flaky(5, "invalid argument");

        let execution = executor.execute(&op, &json!({})).await;

        assert_eq!(execution.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = execution.outcome.unwrap_err();
        assert_eq!(err.message, "invalid argument");
        assert_eq!(executor.stats().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_return_last_error() {
        let executor = Executor::new(RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        });
        let (op, calls) = flaky(10, "network unreachable");

        let execution = executor.execute(&op, &json!({})).await;
        assert_eq!(execution.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(execution.outcome.unwrap_err().message, "network unreachable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let executor = Executor::new(RetryPolicy {
            max_attempts: 2,
            backoff_base: 1.0,
            timeout: Duration::from_secs(5),
        });
        let op = Operation::awaited(Sleeper(Duration::from_secs(60)));

        let execution = executor.execute(&op, &json!({})).await;
        let err = execution.outcome.unwrap_err();
        assert_eq!(execution.attempts, 2);
        assert_eq!(err.type_name, "Timeout");
        assert_eq!(err.message, "timeout: execution exceeded 5s");
    }

    #[tokio::test]
    async fn test_direct_operation() {
        let executor = Executor::new(RetryPolicy::no_retry());
        let op = Operation::direct(|args| {
            let n = args["n"].as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        });

        let execution = executor.execute(&op, &json!({"n": 21})).await;
        assert_eq!(execution.outcome, Ok(json!(42)));
        assert_eq!(execution.attempts, 1);
    }

    #[tokio::test]
    async fn test_direct_operation_error() {
        let executor = Executor::new(RetryPolicy::no_retry());
        let op = Operation::direct(|_| Err(OperationError::new("ValueError", "bad input")));

        let err = executor.execute(&op, &json!({})).await.outcome.unwrap_err();
        assert_eq!(err.type_name, "ValueError");
    }
}
