//! Child process launching and command-line splitting.

use std::borrow::Cow;
use std::io;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Captured result of one execution of a command.
///
/// Streams are kept as raw bytes so they can be passed through unchanged;
/// rules match against a lossy UTF-8 view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Attempt {
    pub fn new(exit_code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Executes an argument vector and captures its output.
pub trait Launcher {
    fn launch(&mut self, argv: &[String]) -> Result<Attempt, LaunchError>;
}

/// Runs commands as real child processes, waiting for each to finish.
///
/// Stdin is not forwarded; stdout and stderr are captured in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&mut self, argv: &[String]) -> Result<Attempt, LaunchError> {
        let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;
        tracing::debug!(program = %program, args = ?args, "launching");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;
        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(program = %program, exit_code, "command exited");
        Ok(Attempt::new(exit_code, output.stdout, output.stderr))
    }
}

/// Split a shell-style command line into words. Returns `None` on unbalanced
/// quotes or a trailing escape.
pub fn split_command_line(line: &str) -> Option<Vec<String>> {
    shlex::split(line)
}

/// Normalize the wrapped command: a single argument is treated as a command
/// line and split into words; several arguments are used verbatim.
pub fn normalize_command(args: Vec<String>) -> Option<Vec<String>> {
    if args.len() == 1 {
        let words = split_command_line(&args[0])?;
        tracing::debug!(line = %args[0], words = ?words, "split command line");
        Some(words)
    } else {
        Some(args)
    }
}
