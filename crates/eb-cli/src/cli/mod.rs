//! CLI for eb, the exponential backoff command wrapper.

mod commands;

use anyhow::Result;
use clap::Parser;
use eb_core::config::Settings;
use eb_core::logging::{self, Verbosity};
use std::path::PathBuf;

use commands::{run_chaos, run_wrapped};

const LONG_ABOUT: &str = "Exponential Backoff Tool

Wraps unreliable tools such as git, gcloud, awscli or vault and retries them
with configurable backoff, deciding success, failure or retry from exit codes
and from messages the tool prints.

Settings come from flags, then the [commands.<name>] section of the config
file for the wrapped command, then the file's top-level keys.";

/// Top-level CLI: options followed by the command to wrap.
#[derive(Debug, Parser)]
#[command(name = "eb", version)]
#[command(about = "Exponential Backoff Tool", long_about = LONG_ABOUT)]
pub struct Cli {
    /// TOML config file with global and per-command settings (default ~/.config/eb/config.toml).
    #[arg(short = 'f', long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Seconds to wait before each retry. `x` is the retry index (0 based), `i` the retry index (1 based), `r` a random float in [0, 1). Examples: "x*15+15", "x*x", "(x*x)+(10*r)".
    #[arg(short, long, value_name = "FORMULA")]
    pub expression: Option<String>,

    /// Number of times to retry the command (-1 = unlimited).
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    pub retries: Option<i64>,

    /// How many seconds to keep retrying (-1 = unlimited).
    #[arg(short, long, value_name = "SECS", allow_negative_numbers = true)]
    pub duration: Option<i64>,

    /// Retry on all non-zero exit codes.
    #[arg(short = 'a', long)]
    pub retry_on_all: bool,

    /// Command to run before each retry; a non-zero exit aborts.
    #[arg(short, long, value_name = "COMMAND")]
    pub perform_on_failure: Option<String>,

    /// Print a one-line notice before each retry.
    #[arg(short = 'm', long)]
    pub print_retry_on_failure: bool,

    /// Print the failed attempt's output and a notice before each retry.
    #[arg(short = 'M', long)]
    pub print_verbose_retry_on_failure: bool,

    /// Comma-delimited exit codes to retry on.
    #[arg(short = 'c', long, value_name = "CODES", value_delimiter = ',', allow_negative_numbers = true)]
    pub retry_on_exit_codes: Option<Vec<i32>>,

    /// Comma-delimited strings in stdout or stderr to retry on.
    #[arg(short = 's', long, value_name = "STRINGS", value_delimiter = ',')]
    pub retry_on_string_matches: Option<Vec<String>>,

    /// Comma-delimited regular expressions matched against stdout or stderr to retry on.
    #[arg(short = 'x', long, value_name = "REGEXPS", value_delimiter = ',')]
    pub retry_on_regexp_matches: Option<Vec<String>>,

    /// Comma-delimited exit codes to treat as success.
    #[arg(short = 'C', long, value_name = "CODES", value_delimiter = ',', allow_negative_numbers = true)]
    pub success_on_exit_codes: Option<Vec<i32>>,

    /// Comma-delimited strings that turn a failure into success.
    #[arg(short = 'S', long, value_name = "STRINGS", value_delimiter = ',')]
    pub success_on_string_matches: Option<Vec<String>>,

    /// Comma-delimited regular expressions that turn a failure into success.
    #[arg(short = 'X', long, value_name = "REGEXPS", value_delimiter = ',')]
    pub success_on_regexp_matches: Option<Vec<String>>,

    /// Comma-delimited strings that force a failure (exit code -1).
    #[arg(short = 'o', long, value_name = "STRINGS", value_delimiter = ',')]
    pub fail_on_string_matches: Option<Vec<String>>,

    /// Comma-delimited regular expressions that force a failure (exit code -1).
    #[arg(short = 'O', long, value_name = "REGEXPS", value_delimiter = ',')]
    pub fail_on_regexp_matches: Option<Vec<String>>,

    /// Comma-delimited strings required for success; fail (exit code -1) otherwise.
    #[arg(short = 'u', long, value_name = "STRINGS", value_delimiter = ',')]
    pub fail_unless_string_matches: Option<Vec<String>>,

    /// Comma-delimited regular expressions required for success; fail (exit code -1) otherwise.
    #[arg(short = 'U', long, value_name = "REGEXPS", value_delimiter = ',')]
    pub fail_unless_regexp_matches: Option<Vec<String>>,

    /// Log settings, attempts and sleeps.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log everything, including which rules fired.
    #[arg(short = 'g', long)]
    pub debug: bool,

    /// Write logs to a file instead of stderr (default ~/.local/state/eb/eb.log).
    #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Ignore COMMAND and exit like a flaky tool would (for testing retry rules).
    #[arg(short, long)]
    pub kill: bool,

    /// Command to wrap. A single argument is split like a shell command line.
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "kill"
    )]
    pub command: Vec<String>,
}

impl Cli {
    pub fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        cli.init_logging();

        if cli.kill {
            return Ok(run_chaos());
        }
        let flags = cli.flag_settings();
        run_wrapped(cli.command, cli.config_file.as_deref(), flags)
    }

    fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.debug)
    }

    fn init_logging(&self) {
        let verbosity = self.verbosity();
        let Some(requested) = &self.log_file else {
            logging::init_logging_stderr(verbosity);
            return;
        };
        let path = match requested {
            Some(path) => Ok(path.clone()),
            None => logging::default_log_file(),
        };
        if let Err(err) = path.and_then(|p| logging::init_logging_file(verbosity, &p)) {
            logging::init_logging_stderr(verbosity);
            tracing::warn!("cannot log to file, using stderr: {:#}", err);
        }
    }

    /// Settings given explicitly on the command line. Unset flags stay
    /// `None` so config file values show through.
    pub fn flag_settings(&self) -> Settings {
        Settings {
            expression: self.expression.clone(),
            retries: self.retries,
            duration: self.duration,
            retry_on_all: self.retry_on_all.then_some(true),
            retry_on_exit_codes: self.retry_on_exit_codes.clone(),
            retry_on_string_matches: non_empty(&self.retry_on_string_matches),
            retry_on_regexp_matches: non_empty(&self.retry_on_regexp_matches),
            success_on_exit_codes: self.success_on_exit_codes.clone(),
            success_on_string_matches: non_empty(&self.success_on_string_matches),
            success_on_regexp_matches: non_empty(&self.success_on_regexp_matches),
            fail_on_string_matches: non_empty(&self.fail_on_string_matches),
            fail_on_regexp_matches: non_empty(&self.fail_on_regexp_matches),
            fail_unless_string_matches: non_empty(&self.fail_unless_string_matches),
            fail_unless_regexp_matches: non_empty(&self.fail_unless_regexp_matches),
            perform_on_failure: self.perform_on_failure.clone(),
            print_retry_on_failure: self.print_retry_on_failure.then_some(true),
            print_verbose_retry_on_failure: self.print_verbose_retry_on_failure.then_some(true),
        }
    }
}

/// Drop empty entries; `-s ""` means no rules, so the config value shows through.
fn non_empty(list: &Option<Vec<String>>) -> Option<Vec<String>> {
    let kept: Vec<String> = list
        .iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();
    (!kept.is_empty()).then_some(kept)
}

#[cfg(test)]
mod tests;
