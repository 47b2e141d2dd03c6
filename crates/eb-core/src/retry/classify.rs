//! Classify a finished attempt into succeed / fail / retry.
//!
//! Classification runs a fixed pipeline of stages over the effective exit
//! code: fail-on, fail-unless, success-on. The resulting code then decides
//! between a terminal outcome and the retry-on rules. Every stage is a pure
//! function of the attempt, the rules and the code produced so far.

use super::rules::{Hit, RuleSet};
use crate::launcher::Attempt;

/// Exit code forced by the fail-on and fail-unless stages.
pub const FORCED_FAILURE: i32 = -1;

/// Normalized verdict for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed(i32),
    Fail(i32),
    Retry,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Retry)
    }
}

/// A rule that fired while classifying. Diagnostics only; never feeds back
/// into the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleHit {
    FailOn(Hit),
    FailUnlessMatched(Hit),
    FailUnlessMissing,
    SuccessCode(i32),
    SuccessMatch(Hit),
    RetryAll(i32),
    RetryCode(i32),
    RetryMatch(Hit),
}

/// Result of classifying one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Exit code to report if the run ends on this attempt.
    pub exit_code: i32,
    pub hits: Vec<RuleHit>,
}

type Stage = fn(&RuleSet, &Attempt, i32, &mut Vec<RuleHit>) -> i32;

/// Code-rewriting stages, in precedence order.
const STAGES: [Stage; 3] = [fail_on, fail_unless, success_on];

/// Classify an attempt against the rule set.
pub fn classify(attempt: &Attempt, rules: &RuleSet) -> Classification {
    let mut hits = Vec::new();
    let code = STAGES
        .iter()
        .fold(attempt.exit_code, |code, stage| stage(rules, attempt, code, &mut hits));

    let outcome = if code == 0 {
        Outcome::Succeed(0)
    } else if let Some(hit) = retry_on(rules, attempt, code) {
        hits.push(hit);
        Outcome::Retry
    } else {
        Outcome::Fail(code)
    };

    Classification {
        outcome,
        exit_code: code,
        hits,
    }
}

fn fail_on(rules: &RuleSet, attempt: &Attempt, code: i32, hits: &mut Vec<RuleHit>) -> i32 {
    match rules.fail_matches.find(attempt) {
        Some(hit) => {
            hits.push(RuleHit::FailOn(hit));
            FORCED_FAILURE
        }
        None => code,
    }
}

/// When configured, replaces the code outright: 0 on evidence, -1 without.
fn fail_unless(rules: &RuleSet, attempt: &Attempt, code: i32, hits: &mut Vec<RuleHit>) -> i32 {
    if rules.fail_unless_matches.is_empty() {
        return code;
    }
    match rules.fail_unless_matches.find(attempt) {
        Some(hit) => {
            hits.push(RuleHit::FailUnlessMatched(hit));
            0
        }
        None => {
            hits.push(RuleHit::FailUnlessMissing);
            FORCED_FAILURE
        }
    }
}

fn success_on(rules: &RuleSet, attempt: &Attempt, code: i32, hits: &mut Vec<RuleHit>) -> i32 {
    if code == 0 {
        return code;
    }
    if rules.success_exit_codes.contains(&code) {
        hits.push(RuleHit::SuccessCode(code));
        return 0;
    }
    match rules.success_matches.find(attempt) {
        Some(hit) => {
            hits.push(RuleHit::SuccessMatch(hit));
            0
        }
        None => code,
    }
}

fn retry_on(rules: &RuleSet, attempt: &Attempt, code: i32) -> Option<RuleHit> {
    if rules.retry_on_all {
        return Some(RuleHit::RetryAll(code));
    }
    if rules.retry_exit_codes.contains(&code) {
        return Some(RuleHit::RetryCode(code));
    }
    rules.retry_matches.find(attempt).map(RuleHit::RetryMatch)
}
