//! Retry loop: launch, classify, and either finish or back off and relaunch.

use super::classify::{classify, Classification, Outcome};
use super::error::RunError;
use super::policy::{BackoffScheduler, Exhaustion, RetryBudget, RetryLimits};
use super::rules::RuleSet;
use crate::formula::{ExprEvaluator, FormulaEvaluator};
use crate::launcher::{split_command_line, Attempt, Launcher, ProcessLauncher};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Fully resolved parameters for one run.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    pub rules: RuleSet,
    pub limits: RetryLimits,
    /// Backoff formula in seconds over `x`, `i` and `r`.
    pub expression: String,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            rules: RuleSet::default(),
            limits: RetryLimits::default(),
            expression: "0".to_string(),
        }
    }
}

/// How a run ended when it ended on a classified attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed { exit_code: i32 },
    /// The last attempt asked for a retry but a budget ran out.
    Exhausted { exit_code: i32, reason: Exhaustion },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded => 0,
            RunOutcome::Failed { exit_code } | RunOutcome::Exhausted { exit_code, .. } => {
                *exit_code
            }
        }
    }
}

/// Source of time for the loop: budget clock and inter-attempt sleep.
pub trait Timer {
    fn now(&self) -> Instant;
    fn sleep(&mut self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Receives progress events from the retry loop.
pub trait RetryObserver {
    fn on_start(&mut self, _command: &[String], _plan: &RetryPlan) {}
    fn on_attempt(&mut self, _launch: u32, _attempt: &Attempt, _classification: &Classification) {}
    fn on_retry_scheduled(&mut self, _retry: u32, _delay: Duration) {}
    fn on_side_effect(&mut self, _command: &[String], _attempt: &Attempt) {}
    fn on_finished(&mut self, _outcome: &RunOutcome) {}
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_start(&mut self, command: &[String], plan: &RetryPlan) {
        let rules = &plan.rules;
        tracing::info!(
            command = ?command,
            expression = %plan.expression,
            max_retries = ?plan.limits.max_retries,
            max_duration = ?plan.limits.max_duration,
            "starting"
        );
        tracing::info!(
            retry_on_all = rules.retry_on_all,
            retry_on_exit_codes = ?rules.retry_exit_codes,
            retry_on_matches = ?rules.retry_matches,
            success_on_exit_codes = ?rules.success_exit_codes,
            success_on_matches = ?rules.success_matches,
            fail_on_matches = ?rules.fail_matches,
            fail_unless_matches = ?rules.fail_unless_matches,
            perform_on_failure = ?rules.perform_on_failure,
            "rules"
        );
    }

    fn on_attempt(&mut self, launch: u32, attempt: &Attempt, classification: &Classification) {
        tracing::debug!(
            launch,
            exit_code = attempt.exit_code,
            effective_exit_code = classification.exit_code,
            outcome = ?classification.outcome,
            "attempt finished"
        );
        for hit in &classification.hits {
            tracing::debug!(?hit, "rule fired");
        }
        if !classification.outcome.is_terminal() {
            tracing::info!(
                stderr = %attempt.stderr_text(),
                stdout = %attempt.stdout_text(),
                "retrying after output"
            );
        }
    }

    fn on_retry_scheduled(&mut self, retry: u32, delay: Duration) {
        tracing::info!(retry, ?delay, "sleeping before retry");
    }

    fn on_side_effect(&mut self, command: &[String], attempt: &Attempt) {
        tracing::info!(
            command = ?command,
            exit_code = attempt.exit_code,
            stderr = %attempt.stderr_text(),
            stdout = %attempt.stdout_text(),
            "perform-on-failure finished"
        );
    }

    fn on_finished(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Exhausted { exit_code, reason } => {
                tracing::warn!(exit_code, "failed to complete command: {}", reason);
            }
            other => tracing::debug!(exit_code = other.exit_code(), "finished"),
        }
    }
}

/// Drives one wrapped command through the retry policy.
pub struct RetryRunner<L = ProcessLauncher, E = ExprEvaluator, T = SystemTimer> {
    command: Vec<String>,
    plan: RetryPlan,
    launcher: L,
    evaluator: E,
    timer: T,
    observer: Box<dyn RetryObserver>,
}

impl RetryRunner {
    pub fn new(command: Vec<String>, plan: RetryPlan) -> Self {
        Self {
            command,
            plan,
            launcher: ProcessLauncher,
            evaluator: ExprEvaluator,
            timer: SystemTimer,
            observer: Box::new(TracingObserver),
        }
    }
}

impl<L, E, T> RetryRunner<L, E, T> {
    pub fn with_launcher<L2: Launcher>(self, launcher: L2) -> RetryRunner<L2, E, T> {
        RetryRunner {
            command: self.command,
            plan: self.plan,
            launcher,
            evaluator: self.evaluator,
            timer: self.timer,
            observer: self.observer,
        }
    }

    pub fn with_evaluator<E2: FormulaEvaluator>(self, evaluator: E2) -> RetryRunner<L, E2, T> {
        RetryRunner {
            command: self.command,
            plan: self.plan,
            launcher: self.launcher,
            evaluator,
            timer: self.timer,
            observer: self.observer,
        }
    }

    pub fn with_timer<T2: Timer>(self, timer: T2) -> RetryRunner<L, E, T2> {
        RetryRunner {
            command: self.command,
            plan: self.plan,
            launcher: self.launcher,
            evaluator: self.evaluator,
            timer,
            observer: self.observer,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}

impl<L: Launcher, E: FormulaEvaluator, T: Timer> RetryRunner<L, E, T> {
    /// Run until a terminal outcome or a fatal error. Captured output of the
    /// final attempt is written to `err` (stderr) and then `out` (stdout).
    pub fn run<O: Write, R: Write>(&mut self, out: &mut O, err: &mut R) -> Result<RunOutcome, RunError> {
        let mut budget = RetryBudget::new(self.timer.now(), self.plan.limits);
        let scheduler = BackoffScheduler::new(self.plan.expression.clone());
        self.observer.on_start(&self.command, &self.plan);

        let mut launches = 0u32;
        loop {
            let attempt = self.launcher.launch(&self.command).map_err(RunError::Launch)?;
            launches += 1;
            let classification = classify(&attempt, &self.plan.rules);
            self.observer.on_attempt(launches, &attempt, &classification);

            let finished = match classification.outcome {
                Outcome::Succeed(_) => Some(RunOutcome::Succeeded),
                Outcome::Fail(exit_code) => Some(RunOutcome::Failed { exit_code }),
                Outcome::Retry => {
                    budget.record_retry();
                    budget
                        .exhausted(self.timer.now())
                        .map(|reason| RunOutcome::Exhausted {
                            exit_code: classification.exit_code,
                            reason,
                        })
                }
            };
            if let Some(outcome) = finished {
                echo(out, err, &attempt)?;
                self.observer.on_finished(&outcome);
                return Ok(outcome);
            }

            let retry = budget.attempts();
            let delay = scheduler.next_delay(&budget, self.timer.now(), &self.evaluator)?;
            self.observer.on_retry_scheduled(retry, delay);
            self.print_notice(out, err, &attempt, retry, delay)?;
            self.timer.sleep(delay);

            if let Some(command) = self.plan.rules.perform_on_failure.clone() {
                self.perform_on_failure(&command)?;
            }
        }
    }

    fn print_notice<O: Write, R: Write>(
        &self,
        out: &mut O,
        err: &mut R,
        attempt: &Attempt,
        retry: u32,
        delay: Duration,
    ) -> io::Result<()> {
        let rules = &self.plan.rules;
        if !(rules.print_retry_notice || rules.print_verbose_retry_notice) {
            return Ok(());
        }
        if rules.print_verbose_retry_notice {
            echo(out, err, attempt)?;
        }
        writeln!(out, "Next Retry Attempt {} in {}s ...", retry, delay.as_secs_f64())?;
        out.flush()
    }

    /// Run the side-effect command. Any failure aborts the whole run.
    fn perform_on_failure(&mut self, command: &str) -> Result<(), RunError> {
        let argv = split_command_line(command)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| RunError::SideEffectParse {
                command: command.to_string(),
            })?;
        let attempt = self
            .launcher
            .launch(&argv)
            .map_err(|source| RunError::SideEffectLaunch {
                command: command.to_string(),
                source,
            })?;
        self.observer.on_side_effect(&argv, &attempt);
        if attempt.exit_code != 0 {
            return Err(RunError::SideEffectFailed {
                command: command.to_string(),
                code: attempt.exit_code,
            });
        }
        Ok(())
    }
}

/// Write captured output: stderr first, then stdout.
fn echo<O: Write, R: Write>(out: &mut O, err: &mut R, attempt: &Attempt) -> io::Result<()> {
    err.write_all(&attempt.stderr)?;
    err.flush()?;
    out.write_all(&attempt.stdout)?;
    out.flush()
}
