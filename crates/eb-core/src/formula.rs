//! Backoff formula evaluation.
//!
//! The formula is an arithmetic expression over three variables:
//! `x` (zero-based retry index), `i` (one-based retry index) and `r`
//! (uniform random value in [0, 1)). The result is a delay in seconds.

use evalexpr::{build_operator_tree, ContextWithMutableVariables, HashMapContext, Value};
use thiserror::Error;

/// Variables bound for one evaluation of the backoff formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffVars {
    pub x: f64,
    pub i: f64,
    pub r: f64,
}

impl BackoffVars {
    /// Variables for the given one-based retry index with a fresh random term.
    pub fn for_retry(retry: u32) -> Self {
        Self::with_jitter(retry, rand::random::<f64>())
    }

    pub fn with_jitter(retry: u32, r: f64) -> Self {
        Self {
            x: f64::from(retry.saturating_sub(1)),
            i: f64::from(retry),
            r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("cannot parse backoff formula `{expression}`: {reason}")]
    Parse { expression: String, reason: String },
    #[error("cannot evaluate backoff formula `{expression}`: {reason}")]
    Eval { expression: String, reason: String },
}

/// Anything that can parse and evaluate a backoff formula.
pub trait FormulaEvaluator {
    fn evaluate(&self, expression: &str, vars: &BackoffVars) -> Result<f64, FormulaError>;
}

/// Default evaluator backed by `evalexpr`.
///
/// All arithmetic is floating point: variables are bound as floats and
/// integer literals are rewritten as floats, so `3/2` is 1.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

/// Append `.0` to bare integer literals outside string literals. Tokens that
/// start with a digit but are not all digits (`1.5`, `2e3`) are kept as is.
fn float_literals(expression: &str) -> String {
    let mut rewritten = String::with_capacity(expression.len() + 8);
    let mut chars = expression.chars().peekable();
    let mut in_string = false;
    let mut prev: Option<char> = None;
    while let Some(c) = chars.next() {
        let starts_number = !in_string
            && c.is_ascii_digit()
            && !prev.is_some_and(|p| p.is_alphanumeric() || p == '_' || p == '.');
        if !starts_number {
            if c == '"' && prev != Some('\\') {
                in_string = !in_string;
            }
            rewritten.push(c);
            prev = Some(c);
            continue;
        }
        let mut token = String::from(c);
        while let Some(&next) = chars.peek() {
            if !(next.is_alphanumeric() || next == '_' || next == '.') {
                break;
            }
            token.push(next);
            chars.next();
        }
        let integer = token.chars().all(|d| d.is_ascii_digit());
        rewritten.push_str(&token);
        if integer {
            rewritten.push_str(".0");
        }
        prev = token.chars().last();
    }
    rewritten
}

impl FormulaEvaluator for ExprEvaluator {
    fn evaluate(&self, expression: &str, vars: &BackoffVars) -> Result<f64, FormulaError> {
        let tree = build_operator_tree(&float_literals(expression)).map_err(|e| FormulaError::Parse {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        let eval_err = |e: evalexpr::EvalexprError| FormulaError::Eval {
            expression: expression.to_string(),
            reason: e.to_string(),
        };
        let mut context = HashMapContext::new();
        context
            .set_value("x".into(), Value::Float(vars.x))
            .map_err(eval_err)?;
        context
            .set_value("i".into(), Value::Float(vars.i))
            .map_err(eval_err)?;
        context
            .set_value("r".into(), Value::Float(vars.r))
            .map_err(eval_err)?;

        tree.eval_number_with_context(&context).map_err(eval_err)
    }
}
