//! `eb <COMMAND>` – run a command under the retry policy.

use anyhow::{Context, Result};
use eb_core::config::{self, Settings};
use eb_core::launcher::normalize_command;
use eb_core::retry::RetryRunner;
use std::io;
use std::path::Path;

/// Resolve settings for `command`, run it to a final outcome and return the
/// process exit code.
pub fn run_wrapped(command: Vec<String>, config_file: Option<&Path>, flags: Settings) -> Result<i32> {
    let joined = command.join(" ");
    let command = normalize_command(command)
        .filter(|words| !words.is_empty())
        .with_context(|| format!("unable to parse command input: {}", joined))?;

    let cfg = config::load(config_file)?;
    let settings = cfg.layered(&command[0], flags);
    tracing::debug!("resolved settings: {:?}", settings);
    let plan = settings.resolve()?;

    let mut runner = RetryRunner::new(command, plan);
    match runner.run(&mut io::stdout(), &mut io::stderr()) {
        Ok(outcome) => Ok(outcome.exit_code()),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("eb error: {:#}", anyhow::Error::from(err));
            Ok(code)
        }
    }
}
