//! CLI argument parsing for perfgate

use crate::analysis::{AnalysisConfig, ConcurrencyPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Encoding of the limits documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LimitsFormat {
    /// JSON documents (default)
    Json,
    /// TOML documents
    Toml,
}

#[derive(Parser, Debug)]
#[command(name = "perfgate")]
#[command(version)]
#[command(about = "Check recorded benchmark competitions against stored performance limits", long_about = None)]
pub struct Cli {
    /// Replay files, one competition each
    #[arg(value_name = "REPLAY", required = true)]
    pub replays: Vec<PathBuf>,

    /// Configuration file (defaults to ./perfgate.toml when present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Limits resource for competitions that do not name one
    #[arg(short = 'l', long = "limits", value_name = "NAME")]
    pub limits: Option<String>,

    /// Encoding of the limits documents
    #[arg(long = "format", value_enum, default_value = "json")]
    pub format: LimitsFormat,

    /// Directory relative limits resources are resolved against
    #[arg(long = "base-dir", value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Widen limits that do not cover the measurements
    #[arg(short = 'a', long = "adjust")]
    pub adjust: bool,

    /// Save adjusted limits
    #[arg(short = 'p', long = "persist")]
    pub persist: bool,

    /// Start from empty limits, ignoring stored ones
    #[arg(long = "ignore-existing")]
    pub ignore_existing: bool,

    /// Fill empty limits even when adjustment is off
    #[arg(long = "force-empty-adjust")]
    pub force_empty_adjust: bool,

    /// Runs that only check before adjustment starts
    #[arg(long = "skip-runs", value_name = "N")]
    pub skip_runs: Option<u32>,

    /// Extra runs after a failed check
    #[arg(long = "reruns-if-failed", value_name = "N")]
    pub reruns_if_failed: Option<u32>,

    /// Extra runs confirming adjusted limits
    #[arg(long = "confirmation-reruns", value_name = "N")]
    pub confirmation_reruns: Option<u32>,

    /// Upper bound on runs per competition (at most 10)
    #[arg(long = "max-attempts", value_name = "N")]
    pub max_attempts: Option<u32>,

    /// What to do when competitions run at the same time (default, lock or fail)
    #[arg(long = "concurrency", value_name = "POLICY")]
    pub concurrency: Option<ConcurrencyPolicy>,

    /// Directory for the lock files coordinating competitions across processes
    #[arg(long = "lock-dir", value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Run all competitions in parallel
    #[arg(long = "parallel")]
    pub parallel: bool,

    /// Decimals compared in the display unit
    #[arg(long = "rounding-digits", value_name = "N")]
    pub rounding_digits: Option<u32>,

    /// Read limits from a previous run's document (path or URL)
    #[arg(long = "previous-run-log", value_name = "NAME")]
    pub previous_run_log: Option<String>,

    /// Timeout for remote limits resources and previous-run logs
    #[arg(long = "previous-run-timeout-ms", value_name = "MS")]
    pub previous_run_timeout_ms: Option<u64>,

    /// Only print the final verdict line per competition
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Enable debug tracing output to stderr
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply flag overrides on top of a loaded configuration
    pub fn apply(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        config.adjust_limits |= self.adjust;
        config.persist_limits |= self.persist;
        config.ignore_existing_limits |= self.ignore_existing;
        config.force_empty_limits_adjust |= self.force_empty_adjust;

        if let Some(n) = self.skip_runs {
            config.skip_runs_before_adjust = n;
        }
        if let Some(n) = self.reruns_if_failed {
            config.reruns_if_failed = n;
        }
        if let Some(n) = self.confirmation_reruns {
            config.confirmation_reruns = n;
        }
        if let Some(n) = self.max_attempts {
            config.max_attempts = n;
        }
        if let Some(policy) = self.concurrency {
            config.concurrency = policy;
        }
        if let Some(digits) = self.rounding_digits {
            config.default_rounding_digits = digits;
        }
        if let Some(log) = &self.previous_run_log {
            config.previous_run_log = Some(log.clone());
        }
        if let Some(ms) = self.previous_run_timeout_ms {
            config.previous_run_timeout_ms = Some(ms);
        }
        if let Some(dir) = &self.base_dir {
            config.base_directory = Some(dir.clone());
        }
        if let Some(dir) = &self.lock_dir {
            config.lock_directory = Some(dir.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "perfgate",
            "--adjust",
            "--max-attempts",
            "5",
            "--concurrency",
            "lock",
            "--lock-dir",
            "/var/lock/perfgate",
            "bar.json",
        ]);
        let config = cli.apply(AnalysisConfig::default());
        assert!(config.adjust_limits);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.concurrency, ConcurrencyPolicy::Lock);
        assert_eq!(config.lock_directory(), PathBuf::from("/var/lock/perfgate"));
        assert!(!config.persist_limits);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let cli = Cli::parse_from(["perfgate", "bar.json"]);
        let base = AnalysisConfig::adjusting();
        assert_eq!(cli.apply(base.clone()), base);
        assert_eq!(cli.format, LimitsFormat::Json);
    }

    #[test]
    fn test_replay_required() {
        assert!(Cli::try_parse_from(["perfgate"]).is_err());
    }
}
