//! Classification rules: exit-code sets and output matchers per category.

use crate::launcher::Attempt;
use regex::Regex;

/// Which captured stream a matcher hit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A single matcher hit: the configured pattern and the stream it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub pattern: String,
    pub stream: Stream,
}

/// Substring and regex matchers for one rule category.
///
/// Strings are matched by case-sensitive containment, regexes by unanchored
/// search. Entries are tried in the order supplied; the first hit is reported.
#[derive(Debug, Clone, Default)]
pub struct Patterns {
    strings: Vec<String>,
    regexes: Vec<Regex>,
}

impl Patterns {
    pub fn new(strings: Vec<String>, regexes: Vec<Regex>) -> Self {
        Self { strings, regexes }
    }

    pub fn strings(strings: &[&str]) -> Self {
        Self::new(strings.iter().map(|s| s.to_string()).collect(), Vec::new())
    }

    pub fn regexes(regexes: Vec<Regex>) -> Self {
        Self::new(Vec::new(), regexes)
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.regexes.is_empty()
    }

    /// First configured string, then regex, found in stdout or stderr.
    pub fn find(&self, attempt: &Attempt) -> Option<Hit> {
        let (stdout, stderr) = (attempt.stdout_text(), attempt.stderr_text());
        let streams = [(Stream::Stdout, &*stdout), (Stream::Stderr, &*stderr)];
        for s in &self.strings {
            for (stream, text) in streams {
                if text.contains(s.as_str()) {
                    return Some(Hit {
                        pattern: s.clone(),
                        stream,
                    });
                }
            }
        }
        for re in &self.regexes {
            for (stream, text) in streams {
                if re.is_match(text) {
                    return Some(Hit {
                        pattern: re.as_str().to_string(),
                        stream,
                    });
                }
            }
        }
        None
    }
}

/// Immutable rule set for one run, built from the resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub retry_on_all: bool,
    pub retry_exit_codes: Vec<i32>,
    pub retry_matches: Patterns,
    pub success_exit_codes: Vec<i32>,
    pub success_matches: Patterns,
    /// Force-fail triggers.
    pub fail_matches: Patterns,
    /// Force-fail unless one of these is present.
    pub fail_unless_matches: Patterns,
    /// Shell-style command run between retries.
    pub perform_on_failure: Option<String>,
    pub print_retry_notice: bool,
    pub print_verbose_retry_notice: bool,
}
