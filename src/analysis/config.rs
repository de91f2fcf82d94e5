// Configuration for a competition invocation
//
// Loaded from `perfgate.toml` (every field optional) and overridden by CLI
// flags. Attempt counts are always clamped to MAX_RUN_ATTEMPTS so that the
// rerun loop terminates whatever the configuration says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard ceiling on analysis runs per invocation
pub const MAX_RUN_ATTEMPTS: u32 = 10;

/// What happens when several competitions run at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Run anyway, warn about the interference
    #[default]
    Default,
    /// Wait until the other run of the same competition finishes
    Lock,
    /// Skip the run with a setup error
    Fail,
}

impl std::str::FromStr for ConcurrencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(ConcurrencyPolicy::Default),
            "lock" => Ok(ConcurrencyPolicy::Lock),
            "fail" => Ok(ConcurrencyPolicy::Fail),
            other => Err(format!(
                "unknown concurrency policy '{}' (expected default, lock or fail)",
                other
            )),
        }
    }
}

/// Analysis configuration
///
/// # Example
/// ```
/// use perfgate::analysis::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert!(!config.adjust_limits);
/// assert_eq!(config.default_rounding_digits, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Widen stored limits that do not cover the measurements
    pub adjust_limits: bool,

    /// Runs that only check before adjustment kicks in
    ///
    /// With a value of 1 the first run only checks; adjustments start on the
    /// second attempt.
    pub skip_runs_before_adjust: u32,

    /// Fill empty stored limits even while adjustment is disabled or skipped
    pub force_empty_limits_adjust: bool,

    /// Write adjusted limits back to the limits resource
    pub persist_limits: bool,

    /// Start from empty limits, ignoring what is stored
    pub ignore_existing_limits: bool,

    /// Extra runs after a failed check
    pub reruns_if_failed: u32,

    /// Extra runs after an adjustment, to confirm the new limits
    pub confirmation_reruns: u32,

    /// Upper bound on runs; clamped to [`MAX_RUN_ATTEMPTS`]
    pub max_attempts: u32,

    pub concurrency: ConcurrencyPolicy,

    /// Decimals compared in the display unit when the unit has no own setting
    pub default_rounding_digits: u32,

    /// Document (path or URL) to read limits from instead of the resource
    pub previous_run_log: Option<String>,

    /// Timeout for every remote read: limits resources and previous-run logs
    pub previous_run_timeout_ms: Option<u64>,

    /// Directory relative resource names are resolved against
    pub base_directory: Option<PathBuf>,

    /// Directory holding the competition lock files shared between processes
    pub lock_directory: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            adjust_limits: false,
            skip_runs_before_adjust: 0,
            force_empty_limits_adjust: false,
            persist_limits: false,
            ignore_existing_limits: false,
            reruns_if_failed: 0,
            confirmation_reruns: 0,
            max_attempts: 3,
            concurrency: ConcurrencyPolicy::Default,
            default_rounding_digits: 2,
            previous_run_log: None,
            previous_run_timeout_ms: None,
            base_directory: None,
            lock_directory: None,
        }
    }
}

impl AnalysisConfig {
    /// Check-only configuration, for CI gates
    pub fn strict() -> Self {
        Self {
            concurrency: ConcurrencyPolicy::Fail,
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Adjusting configuration, for recording new limits
    ///
    /// Adjusted limits are persisted and confirmed by one more run.
    pub fn adjusting() -> Self {
        Self {
            adjust_limits: true,
            persist_limits: true,
            force_empty_limits_adjust: true,
            confirmation_reruns: 1,
            reruns_if_failed: 1,
            concurrency: ConcurrencyPolicy::Lock,
            ..Self::default()
        }
    }

    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Lock directory, `perfgate-locks` in the system temp dir by default
    pub fn lock_directory(&self) -> PathBuf {
        self.lock_directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("perfgate-locks"))
    }

    /// Effective run bound
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_RUN_ATTEMPTS)
    }

    pub fn previous_run_timeout(&self) -> Option<Duration> {
        self.previous_run_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be >= 1, got 0".to_string());
        }

        if self.default_rounding_digits > 12 {
            return Err(format!(
                "default_rounding_digits must be <= 12, got {}",
                self.default_rounding_digits
            ));
        }

        if self.persist_limits && !self.adjust_limits && !self.force_empty_limits_adjust {
            tracing::debug!("persist_limits has no effect without adjustment");
        }

        if self.previous_run_timeout_ms == Some(0) {
            return Err("previous_run_timeout_ms must be positive".to_string());
        }

        Ok(())
    }
}
