//! Bounded retry with recovery hooks.
//!
//! Every domain command issued by a device controller runs through a
//! [`RetryExecutor`]. The executor re-invokes a fallible operation up to
//! [`RetryPolicy::max_attempts`] times with a fixed wait in between, and
//! gives the owner two chances to repair the link before re-attempting:
//!
//! - `potential_fix` runs before every re-attempt (typically: reconnect the
//!   transport that just failed).
//! - `last_resort_fix` runs only before the final attempt (typically: a
//!   host-level device re-enumeration).
//!
//! Only errors the policy's `retry_if` accepts are retried; by default that
//! is the transport tier ([`Error::is_transport`]). Anything else is logged
//! and returned at once, without waiting and without running either hook.
//!
//! Hooks are plain function pointers taking the same `&mut S` target the
//! operation runs against, so a controller can pass `Self::reconnect_fix`
//! without capturing anything.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rigbench_core::retry::{BoxFuture, Invocation, RetryExecutor, RetryPolicy};
//! use rigbench_core::{DeviceLog, Result};
//!
//! struct Counter { hits: u32 }
//!
//! fn reset(counter: &mut Counter) -> BoxFuture<'_, ()> {
//!     Box::pin(async move { counter.hits = 0 })
//! }
//!
//! # async fn example() -> Result<()> {
//! let executor = RetryExecutor::new(DeviceLog::plain("demo"));
//! let policy = RetryPolicy::new(3, Duration::from_millis(10)).with_potential_fix(reset);
//! let mut counter = Counter { hits: 0 };
//! let hits = executor
//!     .execute(&policy, &Invocation::new("bump", "()"), &mut counter, |c| {
//!         Box::pin(async move {
//!             c.hits += 1;
//!             Ok(c.hits)
//!         })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::log::DeviceLog;

/// Default number of attempts per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default wait between attempts.
pub const DEFAULT_WAIT_BEFORE_RETRY: Duration = Duration::from_secs(15);

/// A boxed, sendable future borrowing its target for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A recovery hook run against the retry target.
pub type Fix<S> = for<'a> fn(&'a mut S) -> BoxFuture<'a, ()>;

/// Decides whether a failed attempt is worth repeating.
pub type RetryIf = fn(&Error) -> bool;

/// How often, how patiently, and with which repairs to retry one call site.
pub struct RetryPolicy<S: ?Sized> {
    /// Total number of invocations before giving up (at least 1).
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub wait_before_retry: Duration,
    /// Runs before every re-attempt.
    pub potential_fix: Option<Fix<S>>,
    /// Runs only before the final attempt.
    pub last_resort_fix: Option<Fix<S>>,
    /// Errors this returns `false` for end the call immediately.
    pub retry_if: RetryIf,
}

impl<S: ?Sized> RetryPolicy<S> {
    /// A policy without recovery hooks.
    pub fn new(max_attempts: u32, wait_before_retry: Duration) -> Self {
        Self {
            max_attempts,
            wait_before_retry,
            potential_fix: None,
            last_resort_fix: None,
            retry_if: Error::is_transport,
        }
    }

    pub fn with_potential_fix(mut self, fix: Fix<S>) -> Self {
        self.potential_fix = Some(fix);
        self
    }

    pub fn with_last_resort_fix(mut self, fix: Fix<S>) -> Self {
        self.last_resort_fix = Some(fix);
        self
    }

    /// Replace the default transport-tier check.
    pub fn with_retry_if(mut self, retry_if: RetryIf) -> Self {
        self.retry_if = retry_if;
        self
    }
}

impl<S: ?Sized> Clone for RetryPolicy<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for RetryPolicy<S> {}

impl<S: ?Sized> Default for RetryPolicy<S> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WAIT_BEFORE_RETRY)
    }
}

impl<S: ?Sized> fmt::Debug for RetryPolicy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("wait_before_retry", &self.wait_before_retry)
            .field("potential_fix", &self.potential_fix.is_some())
            .field("last_resort_fix", &self.last_resort_fix.is_some())
            .finish()
    }
}

/// The operation name and rendered arguments of one guarded call.
///
/// Both end up in every log line and in
/// [`Error::RetriesExhausted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub operation: String,
    pub args: String,
}

impl Invocation {
    pub fn new(operation: &str, args: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            args: args.into(),
        }
    }
}

/// Runs operations under a [`RetryPolicy`], logging through one or more
/// [`DeviceLog`]s.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    logs: Vec<DeviceLog>,
}

impl RetryExecutor {
    pub fn new(log: DeviceLog) -> Self {
        Self { logs: vec![log] }
    }

    /// An executor writing every line to each of `logs`.
    pub fn fan_out(logs: Vec<DeviceLog>) -> Self {
        Self { logs }
    }

    fn log(&self, text: &str) {
        for log in &self.logs {
            log.log(text);
        }
    }

    /// Invoke `op` against `target` until it succeeds or the policy is
    /// exhausted.
    ///
    /// An error rejected by `retry_if` is returned unwrapped, straight after the
    /// attempt that raised it. After any other failed attempt `n` (with `n < max_attempts`)
    /// the executor
    /// waits `wait_before_retry`, runs `last_resort_fix` if
    /// `n >= max_attempts - 1`, runs `potential_fix`, and invokes `op`
    /// again. A failure on the last attempt returns
    /// [`Error::RetriesExhausted`] wrapping the last error.
    pub async fn execute<S, R, Op>(
        &self,
        policy: &RetryPolicy<S>,
        call: &Invocation,
        target: &mut S,
        mut op: Op,
    ) -> Result<R>
    where
        S: ?Sized + Send,
        R: Send,
        Op: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<R>> + Send,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match op(&mut *target).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = %call.operation,
                            args = %call.args,
                            attempt,
                            "Reattempt successful"
                        );
                        self.log(&format!(
                            "SUCCESS: Reattempt successful, execution of '{}' with params {} successful on attempt number {}",
                            call.operation, call.args, attempt
                        ));
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            tracing::warn!(
                operation = %call.operation,
                args = %call.args,
                attempt,
                max_attempts,
                error = %error,
                "Attempt failed"
            );
            self.log(&format!(
                "Error executing '{}' with params {}: {}",
                call.operation, call.args, error
            ));

            if !(policy.retry_if)(&error) {
                self.log(&format!(
                    "Not reattempting '{}' with params {}: error is not retryable",
                    call.operation, call.args
                ));
                return Err(error);
            }

            if attempt >= max_attempts {
                self.log(&format!(
                    "Failed to execute '{}' with params {} after {} attempts, exceeded maximum number of attempts",
                    call.operation, call.args, attempt
                ));
                return Err(Error::RetriesExhausted {
                    operation: call.operation.clone(),
                    args: call.args.clone(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            self.log(&format!(
                "Waiting {:?} before reattempting execution of '{}' with params {}, attempt number {}",
                policy.wait_before_retry, call.operation, call.args, attempt
            ));
            tokio::time::sleep(policy.wait_before_retry).await;
            self.log(&format!(
                "Reattempting execution of '{}' with params {}, attempt number {}",
                call.operation, call.args, attempt
            ));

            if attempt >= max_attempts - 1 {
                if let Some(fix) = policy.last_resort_fix {
                    tracing::warn!(operation = %call.operation, attempt, "Running last-resort fix");
                    fix(&mut *target).await;
                }
            }

            if let Some(fix) = policy.potential_fix {
                tracing::debug!(operation = %call.operation, attempt, "Running potential fix");
                fix(&mut *target).await;
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted target: fails the first `failures` invocations and records
    /// which hook ran before which attempt.
    #[derive(Default)]
    struct Flaky {
        failures: u32,
        calls: u32,
        events: Vec<String>,
    }

    fn reconnect(target: &mut Flaky) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let label = format!("potential_fix before attempt {}", target.calls + 1);
            target.events.push(label);
        })
    }

    fn reenumerate(target: &mut Flaky) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let label = format!("last_resort_fix before attempt {}", target.calls + 1);
            target.events.push(label);
        })
    }

    fn attempt(target: &mut Flaky) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move {
            target.calls += 1;
            target.events.push(format!("attempt {}", target.calls));
            if target.calls <= target.failures {
                Err(Error::Timeout)
            } else {
                Ok(target.calls)
            }
        })
    }

    fn policy(max_attempts: u32) -> RetryPolicy<Flaky> {
        RetryPolicy::new(max_attempts, Duration::from_secs(15))
            .with_potential_fix(reconnect)
            .with_last_resort_fix(reenumerate)
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::new(DeviceLog::plain("retry-test"))
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_runs_no_hooks() {
        let mut target = Flaky::default();
        let value = executor()
            .execute(&policy(5), &Invocation::new("op", "()"), &mut target, attempt)
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(target.events, vec!["attempt 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_invokes_op_max_attempts_times() {
        let mut target = Flaky {
            failures: u32::MAX,
            ..Default::default()
        };
        let result = executor()
            .execute(&policy(5), &Invocation::new("op", "(\"000c\",)"), &mut target, attempt)
            .await;

        assert_eq!(target.calls, 5);
        match result {
            Err(Error::RetriesExhausted {
                operation,
                args,
                attempts,
                source,
            }) => {
                assert_eq!(operation, "op");
                assert_eq!(args, "(\"000c\",)");
                assert_eq!(attempts, 5);
                assert!(matches!(*source, Error::Timeout));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hook_timing_on_persistent_failure() {
        let mut target = Flaky {
            failures: u32::MAX,
            ..Default::default()
        };
        let _ = executor()
            .execute(&policy(5), &Invocation::new("op", "()"), &mut target, attempt)
            .await;

        assert_eq!(
            target.events,
            vec![
                "attempt 1",
                "potential_fix before attempt 2",
                "attempt 2",
                "potential_fix before attempt 3",
                "attempt 3",
                "potential_fix before attempt 4",
                "attempt 4",
                "last_resort_fix before attempt 5",
                "potential_fix before attempt 5",
                "attempt 5",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let mut target = Flaky {
            failures: 2,
            ..Default::default()
        };
        let value = executor()
            .execute(&policy(5), &Invocation::new("op", "()"), &mut target, attempt)
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert!(!target.events.iter().any(|e| e.starts_with("last_resort")));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let mut target = Flaky {
            failures: 2,
            ..Default::default()
        };
        let start = tokio::time::Instant::now();
        executor()
            .execute(&policy(5), &Invocation::new("op", "()"), &mut target, attempt)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_runs_hooks() {
        let mut target = Flaky {
            failures: u32::MAX,
            ..Default::default()
        };
        let result = executor()
            .execute(&policy(1), &Invocation::new("op", "()"), &mut target, attempt)
            .await;
        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 1, .. })));
        assert_eq!(target.events, vec!["attempt 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_attempt_policy_runs_last_resort_before_final_attempt() {
        let mut target = Flaky {
            failures: u32::MAX,
            ..Default::default()
        };
        let _ = executor()
            .execute(&policy(2), &Invocation::new("op", "()"), &mut target, attempt)
            .await;
        assert_eq!(
            target.events,
            vec![
                "attempt 1",
                "last_resort_fix before attempt 2",
                "potential_fix before attempt 2",
                "attempt 2",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn closures_can_capture_owned_arguments() {
        let mut target = Flaky::default();
        let command = String::from("000502");
        let echoed = executor()
            .execute(
                &RetryPolicy::new(3, Duration::from_secs(1)),
                &Invocation::new("echo", format!("({command:?},)")),
                &mut target,
                |t| {
                    let command = command.clone();
                    Box::pin(async move {
                        t.calls += 1;
                        Ok(command)
                    })
                },
            )
            .await
            .unwrap();
        assert_eq!(echoed, "000502");
    }

    fn reject(target: &mut Flaky) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move {
            target.calls += 1;
            target.events.push(format!("attempt {}", target.calls));
            Err(Error::InvalidParameter("not hex".into()))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn domain_error_is_returned_without_retry() {
        let mut target = Flaky::default();
        let start = tokio::time::Instant::now();
        let result = executor()
            .execute(&policy(5), &Invocation::new("op", "()"), &mut target, reject)
            .await;

        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(target.events, vec!["attempt 1"]);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    fn also_domain(error: &Error) -> bool {
        error.is_transport() || matches!(error, Error::InvalidParameter(_))
    }

    #[tokio::test(start_paused = true)]
    async fn retry_if_can_widen_the_retried_errors() {
        let mut target = Flaky::default();
        let result = executor()
            .execute(
                &policy(3).with_retry_if(also_domain),
                &Invocation::new("op", "()"),
                &mut target,
                reject,
            )
            .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(target.calls, 3);
    }

    #[test]
    fn default_policy_matches_bench_defaults() {
        let policy: RetryPolicy<Flaky> = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.wait_before_retry, Duration::from_secs(15));
        assert!(policy.potential_fix.is_none());
        assert!(policy.last_resort_fix.is_none());
        assert!((policy.retry_if)(&Error::Timeout));
        assert!(!(policy.retry_if)(&Error::Sentinel("FFFF".into())));
    }
}
