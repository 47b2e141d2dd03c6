//! Retry engine.
//!
//! This module turns each finished attempt into a verdict (classify), keeps
//! the retry and duration budgets and computes backoff delays (policy), and
//! drives the launch/classify/sleep loop (run).

mod classify;
mod error;
mod policy;
mod rules;
mod run;

pub use classify::{classify, Classification, Outcome, RuleHit, FORCED_FAILURE};
pub use error::{RunError, EXIT_FORMULA_EVAL, EXIT_FORMULA_PARSE, EXIT_LAUNCH, EXIT_SIDE_EFFECT};
pub use policy::{seconds_to_delay, BackoffScheduler, Exhaustion, RetryBudget, RetryLimits};
pub use rules::{Hit, Patterns, RuleSet, Stream};
pub use run::{RetryObserver, RetryPlan, RetryRunner, RunOutcome, SystemTimer, Timer, TracingObserver};
