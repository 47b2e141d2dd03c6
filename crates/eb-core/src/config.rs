//! Layered settings: CLI flags over a per-command section over the global
//! section of `~/.config/eb/config.toml`, over built-in defaults.

use crate::retry::{Patterns, RetryLimits, RetryPlan, RuleSet};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_EXPRESSION: &str = "0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid regular expression `{pattern}`")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One layer of settings. Every field is optional so layers can be merged;
/// a `None` falls through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backoff formula in seconds over `x`, `i` and `r`.
    pub expression: Option<String>,
    /// Maximum retries; negative means unbounded.
    pub retries: Option<i64>,
    /// Seconds to keep retrying; negative means unbounded.
    pub duration: Option<i64>,
    pub retry_on_all: Option<bool>,
    pub retry_on_exit_codes: Option<Vec<i32>>,
    pub retry_on_string_matches: Option<Vec<String>>,
    pub retry_on_regexp_matches: Option<Vec<String>>,
    pub success_on_exit_codes: Option<Vec<i32>>,
    pub success_on_string_matches: Option<Vec<String>>,
    pub success_on_regexp_matches: Option<Vec<String>>,
    pub fail_on_string_matches: Option<Vec<String>>,
    pub fail_on_regexp_matches: Option<Vec<String>>,
    pub fail_unless_string_matches: Option<Vec<String>>,
    pub fail_unless_regexp_matches: Option<Vec<String>>,
    pub perform_on_failure: Option<String>,
    pub print_retry_on_failure: Option<bool>,
    pub print_verbose_retry_on_failure: Option<bool>,
}

impl Settings {
    /// Fill every unset field of `self` from `lower`.
    pub fn over(self, lower: &Settings) -> Settings {
        let upper = self;
        macro_rules! pick {
            ($($field:ident),* $(,)?) => {
                Settings {
                    $($field: upper.$field.or_else(|| lower.$field.clone()),)*
                }
            };
        }
        pick!(
            expression,
            retries,
            duration,
            retry_on_all,
            retry_on_exit_codes,
            retry_on_string_matches,
            retry_on_regexp_matches,
            success_on_exit_codes,
            success_on_string_matches,
            success_on_regexp_matches,
            fail_on_string_matches,
            fail_on_regexp_matches,
            fail_unless_string_matches,
            fail_unless_regexp_matches,
            perform_on_failure,
            print_retry_on_failure,
            print_verbose_retry_on_failure,
        )
    }

    /// Apply built-in defaults and compile the rules.
    pub fn resolve(self) -> Result<RetryPlan, ConfigError> {
        let rules = RuleSet {
            retry_on_all: self.retry_on_all.unwrap_or(false),
            retry_exit_codes: self.retry_on_exit_codes.unwrap_or_default(),
            retry_matches: patterns(self.retry_on_string_matches, self.retry_on_regexp_matches)?,
            success_exit_codes: self.success_on_exit_codes.unwrap_or_default(),
            success_matches: patterns(
                self.success_on_string_matches,
                self.success_on_regexp_matches,
            )?,
            fail_matches: patterns(self.fail_on_string_matches, self.fail_on_regexp_matches)?,
            fail_unless_matches: patterns(
                self.fail_unless_string_matches,
                self.fail_unless_regexp_matches,
            )?,
            perform_on_failure: self.perform_on_failure.filter(|c| !c.trim().is_empty()),
            print_retry_notice: self.print_retry_on_failure.unwrap_or(false),
            print_verbose_retry_notice: self.print_verbose_retry_on_failure.unwrap_or(false),
        };
        Ok(RetryPlan {
            rules,
            limits: RetryLimits::from_signed(
                self.retries.unwrap_or(-1),
                self.duration.unwrap_or(-1),
            ),
            expression: self
                .expression
                .unwrap_or_else(|| DEFAULT_EXPRESSION.to_string()),
        })
    }
}

/// Empty entries are dropped: an empty string or regex would match any output.
fn patterns(strings: Option<Vec<String>>, regexes: Option<Vec<String>>) -> Result<Patterns, ConfigError> {
    let strings = strings
        .unwrap_or_default()
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    let regexes = regexes
        .unwrap_or_default()
        .into_iter()
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            Regex::new(&pattern).map_err(|source| ConfigError::Regex { pattern, source })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Patterns::new(strings, regexes))
}

/// Contents of the config file: top-level keys are the global section,
/// `[commands.<name>]` tables are per-command sections.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EbConfig {
    #[serde(flatten)]
    pub global: Settings,
    #[serde(default)]
    pub commands: BTreeMap<String, Settings>,
}

impl EbConfig {
    pub fn from_toml(data: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Section for a command: exact name first, then its file name
    /// (`/usr/bin/git` falls back to `[commands.git]`).
    pub fn section_for(&self, program: &str) -> Option<&Settings> {
        self.commands.get(program).or_else(|| {
            Path::new(program)
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| self.commands.get(name))
        })
    }

    /// Merge `flags` over the section for `program` over the global section.
    pub fn layered(&self, program: &str, flags: Settings) -> Settings {
        let global = &self.global;
        match self.section_for(program) {
            Some(section) => {
                tracing::info!(program, "loading config section");
                flags.over(&section.clone().over(global))
            }
            None => flags.over(global),
        }
    }
}

/// Default config path (`$XDG_CONFIG_HOME/eb/config.toml`), if it exists.
pub fn default_config_path() -> Option<PathBuf> {
    xdg::BaseDirectories::with_prefix("eb")
        .ok()
        .and_then(|dirs| dirs.find_config_file("config.toml"))
}

/// Load the config file. An explicit path must be readable; a missing
/// default file yields an empty config.
pub fn load(explicit: Option<&Path>) -> Result<EbConfig, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => {
                tracing::info!("no config file found; using flags and defaults");
                return Ok(EbConfig::default());
            }
        },
    };
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let cfg = EbConfig::from_toml(&data, &path)?;
    tracing::info!("loaded config file {}", path.display());
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::Attempt;
    use crate::retry::{classify, Outcome};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn parse(toml: &str) -> EbConfig {
        EbConfig::from_toml(toml, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn defaults_resolve_to_unbounded_plan() {
        let plan = Settings::default().resolve().unwrap();
        assert_eq!(plan.expression, "0");
        assert_eq!(plan.limits, RetryLimits::default());
        assert!(!plan.rules.retry_on_all);
        assert!(plan.rules.retry_matches.is_empty());
        assert!(plan.rules.perform_on_failure.is_none());
    }

    #[test]
    fn toml_global_and_command_sections() {
        let cfg = parse(
            r#"
            expression = "x*15+15"
            retries = 5
            duration = 600

            [commands.git]
            retry_on_exit_codes = [128]
            retry_on_string_matches = ["Connection reset", "early EOF"]
            retries = 10

            [commands.gcloud]
            retry_on_all = true
            "#,
        );
        assert_eq!(cfg.global.expression.as_deref(), Some("x*15+15"));
        assert_eq!(cfg.commands.len(), 2);
        let git = &cfg.commands["git"];
        assert_eq!(git.retry_on_exit_codes, Some(vec![128]));
        assert_eq!(git.retries, Some(10));
        assert_eq!(cfg.commands["gcloud"].retry_on_all, Some(true));
    }

    #[test]
    fn flags_beat_command_section_beat_global() {
        let cfg = parse(
            r#"
            expression = "1"
            retries = 5
            duration = 60

            [commands.git]
            retries = 10
            expression = "2"
            "#,
        );
        let flags = Settings {
            expression: Some("3".into()),
            ..Default::default()
        };
        let s = cfg.layered("git", flags);
        assert_eq!(s.expression.as_deref(), Some("3"));
        assert_eq!(s.retries, Some(10));
        assert_eq!(s.duration, Some(60));
    }

    #[test]
    fn unknown_command_uses_global_section() {
        let cfg = parse(
            r#"
            retries = 2
            [commands.git]
            retries = 10
            "#,
        );
        let s = cfg.layered("curl", Settings::default());
        assert_eq!(s.retries, Some(2));
    }

    #[test]
    fn section_lookup_falls_back_to_file_name() {
        let cfg = parse(
            r#"
            [commands.git]
            retry_on_all = true
            "#,
        );
        assert!(cfg.section_for("/usr/bin/git").is_some());
        assert!(cfg.section_for("git").is_some());
        assert!(cfg.section_for("gitk").is_none());
    }

    #[test]
    fn resolve_compiles_rules() {
        let plan = Settings {
            retries: Some(3),
            duration: Some(30),
            retry_on_regexp_matches: Some(vec![r"5\d\d".into()]),
            fail_unless_string_matches: Some(vec!["OK".into()]),
            success_on_exit_codes: Some(vec![5]),
            perform_on_failure: Some("git gc".into()),
            print_retry_on_failure: Some(true),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(plan.limits.max_retries, Some(3));
        assert_eq!(plan.limits.max_duration, Some(Duration::from_secs(30)));
        assert!(!plan.rules.retry_matches.is_empty());
        assert!(!plan.rules.fail_unless_matches.is_empty());
        assert_eq!(plan.rules.success_exit_codes, vec![5]);
        assert_eq!(plan.rules.perform_on_failure.as_deref(), Some("git gc"));
        assert!(plan.rules.print_retry_notice);
    }

    #[test]
    fn blank_perform_on_failure_is_ignored() {
        let plan = Settings {
            perform_on_failure: Some("  ".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(plan.rules.perform_on_failure.is_none());
    }

    #[test]
    fn empty_match_entries_are_ignored() {
        let cfg = parse(
            r#"
            fail_unless_string_matches = [""]
            retry_on_string_matches = ["", "busy"]
            success_on_regexp_matches = [""]
            "#,
        );
        let plan = cfg.global.resolve().unwrap();
        assert!(plan.rules.fail_unless_matches.is_empty());
        assert!(plan.rules.success_matches.is_empty());

        let failed = Attempt::new(3, "", "boom");
        assert_eq!(classify(&failed, &plan.rules).outcome, Outcome::Fail(3));
        let busy = Attempt::new(3, "", "server busy");
        assert_eq!(classify(&busy, &plan.rules).outcome, Outcome::Retry);
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let err = Settings {
            fail_on_regexp_matches: Some(vec!["(unclosed".into()]),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Regex { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = EbConfig::from_toml("retries = \"many\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eb.toml");
        fs::write(&path, "expression = \"x*x\"\n[commands.aws]\nretry_on_all = true\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.global.expression.as_deref(), Some("x*x"));
        assert_eq!(cfg.commands["aws"].retry_on_all, Some(true));
    }
}
