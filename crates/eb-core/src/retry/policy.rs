use crate::formula::{BackoffVars, FormulaError, FormulaEvaluator};
use std::fmt;
use std::time::{Duration, Instant};

/// Global limits on retrying. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryLimits {
    /// Maximum number of retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Wall-clock ceiling for scheduling further attempts.
    pub max_duration: Option<Duration>,
}

impl RetryLimits {
    /// Build limits from the signed values used in configuration, where any
    /// negative value means unbounded.
    pub fn from_signed(retries: i64, duration_secs: i64) -> Self {
        Self {
            max_retries: u32::try_from(retries).ok(),
            max_duration: u64::try_from(duration_secs).ok().map(Duration::from_secs),
        }
    }
}

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    Retries,
    Duration,
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhaustion::Retries => write!(f, "retries exhausted"),
            Exhaustion::Duration => write!(f, "maximum runtime exhausted"),
        }
    }
}

/// Mutable counters bounding one run. Created when the loop starts and
/// never reset.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    start: Instant,
    attempts: u32,
    limits: RetryLimits,
}

impl RetryBudget {
    pub fn new(start: Instant, limits: RetryLimits) -> Self {
        Self {
            start,
            attempts: 0,
            limits,
        }
    }

    /// Number of retry decisions recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// Record a retry decision; returns the one-based retry index.
    pub fn record_retry(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Check the guards that stop scheduling another attempt. The retry
    /// budget is checked before the duration budget.
    pub fn exhausted(&self, now: Instant) -> Option<Exhaustion> {
        if let Some(max) = self.limits.max_retries {
            if self.attempts > max {
                return Some(Exhaustion::Retries);
            }
        }
        if let Some(max) = self.limits.max_duration {
            if self.elapsed(now) >= max {
                return Some(Exhaustion::Duration);
            }
        }
        None
    }

    /// Clamp a candidate delay so the run does not sleep past the duration
    /// budget.
    pub fn clamp_delay(&self, now: Instant, delay: Duration) -> Duration {
        match self.limits.max_duration {
            Some(max) => {
                let elapsed = self.elapsed(now);
                if elapsed + delay >= max {
                    max.saturating_sub(elapsed)
                } else {
                    delay
                }
            }
            None => delay,
        }
    }
}

/// Convert a formula result in seconds to a delay, truncated to whole
/// milliseconds. Negative and NaN results mean no delay.
pub fn seconds_to_delay(seconds: f64) -> Duration {
    // `as` saturates: NaN and negatives become 0, +inf becomes u64::MAX.
    Duration::from_millis((seconds * 1000.0) as u64)
}

/// Computes inter-attempt delays from the backoff formula.
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    expression: String,
}

impl BackoffScheduler {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    /// Delay before the next attempt. The formula is parsed and evaluated
    /// fresh each call with a new random term.
    pub fn next_delay<E: FormulaEvaluator>(
        &self,
        budget: &RetryBudget,
        now: Instant,
        evaluator: &E,
    ) -> Result<Duration, FormulaError> {
        self.next_delay_with(budget, now, evaluator, BackoffVars::for_retry(budget.attempts()))
    }

    fn next_delay_with<E: FormulaEvaluator>(
        &self,
        budget: &RetryBudget,
        now: Instant,
        evaluator: &E,
        vars: BackoffVars,
    ) -> Result<Duration, FormulaError> {
        let seconds = evaluator.evaluate(&self.expression, &vars)?;
        let candidate = seconds_to_delay(seconds);
        let delay = budget.clamp_delay(now, candidate);
        tracing::debug!(
            expression = %self.expression,
            x = vars.x,
            seconds,
            ?candidate,
            ?delay,
            "computed backoff delay"
        );
        Ok(delay)
    }
}
