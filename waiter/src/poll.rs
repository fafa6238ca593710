use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_BUILD_INTERVAL, DEFAULT_BUILD_TIMEOUT};
use crate::error::{self, BoxError, Error, Result};
use log::{debug, info, warn};
use snafu::ensure;
use std::convert::Infallible;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long to keep polling and how long to wait between two checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    timeout: Duration,
    interval: Duration,
}

impl PollPolicy {
    /// A zero `timeout` is allowed and means "check once, don't wait". A zero `interval` is not.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        ensure!(
            !interval.is_zero(),
            error::InvalidPolicySnafu {
                message: "the interval between checks must be greater than zero"
            }
        );
        Ok(Self { timeout, interval })
    }

    /// Check exactly once.
    pub fn once() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: DEFAULT_BUILD_INTERVAL,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BUILD_TIMEOUT,
            interval: DEFAULT_BUILD_INTERVAL,
        }
    }
}

/// The ways a single check can fall short of the awaited condition.
#[derive(Debug)]
pub enum CondCheckError<T, E> {
    /// The condition does not hold yet. Carries what was observed so that a timeout can report it.
    NotYet(T),
    /// The check itself failed in a way that is known to be retryable, e.g. a half-written body
    /// while the resource is mid-transition. Logged and otherwise treated like `NotYet`.
    Transient(BoxError),
    /// The condition can never hold, e.g. the resource entered an error state. Polling stops.
    Failed(E),
}

impl<T, E> CondCheckError<T, E> {
    pub fn transient<S>(source: S) -> Self
    where
        S: Into<BoxError>,
    {
        CondCheckError::Transient(source.into())
    }
}

/// The result of one [`Poller::poll`] call.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    Success {
        value: T,
        elapsed: Duration,
        attempts: u32,
    },
    TimedOut {
        elapsed: Duration,
        attempts: u32,
        last: Option<T>,
    },
    Failed {
        reason: E,
        elapsed: Duration,
        attempts: u32,
    },
    Cancelled {
        elapsed: Duration,
        attempts: u32,
        last: Option<T>,
    },
}

impl<T, E> PollOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success { .. })
    }

    /// The number of times the check was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Success { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Success { elapsed, .. }
            | PollOutcome::TimedOut { elapsed, .. }
            | PollOutcome::Failed { elapsed, .. }
            | PollOutcome::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    /// Convert into a `Result`, describing the awaited condition as `what` in the error message.
    pub fn into_result(self, what: &str) -> Result<T>
    where
        T: Debug,
        E: Into<BoxError>,
    {
        match self {
            PollOutcome::Success { value, .. } => Ok(value),
            PollOutcome::TimedOut {
                elapsed,
                attempts,
                last,
            } => Err(Error::TimedOut {
                what: what.to_string(),
                elapsed,
                attempts,
                last: last.map(|last| format!("{:?}", last)),
            }),
            PollOutcome::Failed {
                reason,
                elapsed,
                attempts,
            } => Err(Error::TerminalState {
                what: what.to_string(),
                elapsed,
                attempts,
                source: reason.into(),
            }),
            PollOutcome::Cancelled { elapsed, .. } => Err(Error::Cancelled {
                what: what.to_string(),
                elapsed,
            }),
        }
    }
}

/// Repeatedly invokes a check at a fixed cadence until it succeeds, fails terminally, or the
/// policy's timeout leaves no room for another attempt.
///
/// Checks never overlap and elapsed time is only compared between attempts. After a check
/// that does not succeed, polling stops when `elapsed + interval >= timeout`, i.e. when the
/// next check could not start before the deadline. With instantaneous checks that makes
/// exactly `ceil(timeout / interval)` attempts, and always at least one.
#[derive(Debug, Clone)]
pub struct Poller<C = SystemClock> {
    what: String,
    policy: PollPolicy,
    clock: C,
    cancel: Option<CancellationToken>,
}

impl Poller<SystemClock> {
    pub fn new<S>(what: S, policy: PollPolicy) -> Self
    where
        S: Into<String>,
    {
        Self::with_clock(what, policy, SystemClock)
    }
}

impl<C> Poller<C>
where
    C: Clock,
{
    pub fn with_clock<S>(what: S, policy: PollPolicy, clock: C) -> Self
    where
        S: Into<String>,
    {
        Self {
            what: what.into(),
            policy,
            clock,
            cancel: None,
        }
    }

    /// Stop polling once `token` is cancelled. The token is only observed between attempts.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn what(&self) -> &str {
        &self.what
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub async fn poll<T, E, F, Fut>(&self, mut check: F) -> PollOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CondCheckError<T, E>>>,
    {
        let start = self.clock.now();
        let mut attempts = 0;
        let mut last = None;
        loop {
            if self.is_cancelled() {
                return PollOutcome::Cancelled {
                    elapsed: self.clock.now().saturating_duration_since(start),
                    attempts,
                    last,
                };
            }

            attempts += 1;
            match check().await {
                Ok(value) => {
                    let elapsed = self.clock.now().saturating_duration_since(start);
                    info!(
                        "Done waiting for {} after {:?} ({} attempts)",
                        self.what, elapsed, attempts
                    );
                    return PollOutcome::Success {
                        value,
                        elapsed,
                        attempts,
                    };
                }
                Err(CondCheckError::Failed(reason)) => {
                    let elapsed = self.clock.now().saturating_duration_since(start);
                    debug!(
                        "Stopped waiting for {} after {} attempts, the check failed terminally",
                        self.what, attempts
                    );
                    return PollOutcome::Failed {
                        reason,
                        elapsed,
                        attempts,
                    };
                }
                Err(CondCheckError::NotYet(observed)) => {
                    debug!("Still waiting for {} (attempt {})", self.what, attempts);
                    last = Some(observed);
                }
                Err(CondCheckError::Transient(e)) => {
                    warn!(
                        "Check for {} failed (attempt {}), retrying: {}",
                        self.what, attempts, e
                    );
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed.saturating_add(self.policy.interval) >= self.policy.timeout {
                return PollOutcome::TimedOut {
                    elapsed,
                    attempts,
                    last,
                };
            }

            if self.sleep_or_cancel(self.policy.interval).await {
                return PollOutcome::Cancelled {
                    elapsed: self.clock.now().saturating_duration_since(start),
                    attempts,
                    last,
                };
            }
        }
    }

    /// Like [`Poller::poll`] but converts the outcome into a `Result` named after this poller.
    pub async fn wait<T, E, F, Fut>(&self, check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CondCheckError<T, E>>>,
        T: Debug,
        E: Into<BoxError>,
    {
        self.poll(check).await.into_result(&self.what)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    /// Returns `true` if the sleep was interrupted by cancellation.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => true,
                    _ = self.clock.sleep(duration) => false,
                }
            }
            None => {
                self.clock.sleep(duration).await;
                false
            }
        }
    }
}

/// Poll `check` on the system clock.
pub async fn poll<T, E, F, Fut>(what: &str, policy: PollPolicy, check: F) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CondCheckError<T, E>>>,
{
    Poller::new(what, policy).poll(check).await
}

/// Call `predicate` until it returns `true` or the policy runs out. Returns whether it did.
pub async fn call_until_true<F, Fut>(what: &str, policy: PollPolicy, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    Poller::new(what, policy)
        .poll(|| {
            let fut = predicate();
            async move {
                if fut.await {
                    Ok(())
                } else {
                    Err(CondCheckError::<(), Infallible>::NotYet(()))
                }
            }
        })
        .await
        .is_success()
}
