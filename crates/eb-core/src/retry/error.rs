//! Fatal errors that end a run without a classified outcome.

use crate::formula::FormulaError;
use crate::launcher::LaunchError;
use std::io;
use thiserror::Error;

/// Process exit code when the backoff formula cannot be parsed.
pub const EXIT_FORMULA_PARSE: i32 = 2;
/// Process exit code when the backoff formula cannot be evaluated.
pub const EXIT_FORMULA_EVAL: i32 = 3;
/// Process exit code when the perform-on-failure command fails.
pub const EXIT_SIDE_EFFECT: i32 = 4;
/// Process exit code when the wrapped command cannot be started.
pub const EXIT_LAUNCH: i32 = 127;

#[derive(Debug, Error)]
pub enum RunError {
    /// The wrapped command could not be started at all.
    #[error(transparent)]
    Launch(LaunchError),
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("cannot parse perform-on-failure command `{command}`")]
    SideEffectParse { command: String },
    #[error("perform-on-failure command `{command}` could not be run")]
    SideEffectLaunch {
        command: String,
        #[source]
        source: LaunchError,
    },
    #[error("perform-on-failure command `{command}` exited with code {code}")]
    SideEffectFailed { command: String, code: i32 },
    /// Writing captured output or notices failed.
    #[error("failed to write output")]
    Output(#[from] io::Error),
}

impl RunError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Launch(_) => EXIT_LAUNCH,
            RunError::Formula(FormulaError::Parse { .. }) => EXIT_FORMULA_PARSE,
            RunError::Formula(FormulaError::Eval { .. }) => EXIT_FORMULA_EVAL,
            RunError::SideEffectParse { .. }
            | RunError::SideEffectLaunch { .. }
            | RunError::SideEffectFailed { .. } => EXIT_SIDE_EFFECT,
            RunError::Output(_) => 1,
        }
    }
}
