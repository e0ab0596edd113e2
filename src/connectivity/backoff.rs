use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::iter::Peekable;
use std::time::Duration;

/// Delay schedule for connectivity waits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Failed probes allowed before giving up; `None` waits forever
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// Exponential retry policy without jitter
    ///
    /// - factor: 2
    /// - `min_delay`: `initial_delay`, capped at `max_delay`
    /// - `max_delay`: `max_delay`
    /// - `max_times`: `max_attempts`, unbounded when `None`
    pub fn builder(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay.min(self.max_delay))
            .with_max_delay(self.max_delay)
            .with_factor(2.0);
        match self.max_attempts {
            Some(max) => builder.with_max_times(max as usize),
            None => builder.with_max_times(usize::MAX),
        }
    }
}

/// Transient connectivity state: the remaining delays plus failed probe count
///
/// Delays are non-decreasing and capped at `max_delay`; `reset` starts the
/// schedule over and is called on every successful probe.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    delays: Peekable<ExponentialBackoff>,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let delays = policy.builder().build().peekable();
        Self {
            policy,
            delays,
            attempts: 0,
        }
    }

    /// Records a failed probe and returns the delay to sleep before the next one
    ///
    /// Returns `None` once the attempt limit is reached.
    pub fn advance(&mut self) -> Option<Duration> {
        let delay = self.delays.next()?;
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.delays = self.policy.builder().build().peekable();
        self.attempts = 0;
    }

    pub fn is_exhausted(&mut self) -> bool {
        self.delays.peek().is_none()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
