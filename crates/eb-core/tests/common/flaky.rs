//! A shell command that fails a fixed number of times before succeeding.
//!
//! Each run bumps a counter file in a scratch directory, so tests can assert
//! how many times the wrapped command was launched.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct FlakyCommand {
    dir: TempDir,
}

impl FlakyCommand {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn counter_path(&self) -> PathBuf {
        self.dir.path().join("count")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Number of launches recorded so far.
    pub fn launches(&self) -> u32 {
        fs::read_to_string(self.counter_path())
            .map(|s| s.trim().parse().unwrap_or(0))
            .unwrap_or(0)
    }

    /// argv for `sh -c`: fails with `fail_code` and `fail_message` on stderr
    /// for the first `failures` runs, then prints `success_message` and exits 0.
    pub fn argv(&self, failures: u32, fail_code: i32, fail_message: &str, success_message: &str) -> Vec<String> {
        let script = format!(
            r#"n=$(cat "{count}" 2>/dev/null || echo 0); n=$((n+1)); echo $n > "{count}";
if [ $n -le {failures} ]; then echo "{fail_message}" >&2; exit {fail_code}; fi;
echo "{success_message}""#,
            count = self.counter_path().display(),
        );
        vec!["sh".to_string(), "-c".to_string(), script]
    }
}
