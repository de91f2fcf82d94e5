// Explicit analysis context
//
// Everything a pass needs besides its inputs travels in one value that the
// caller owns: run counters, configuration, the message log and the phase
// the state machine is in.

use crate::analysis::config::AnalysisConfig;
use crate::messages::MessageLog;
use std::fmt;

/// Run counters of one competition invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    /// No further run is possible after this one
    pub is_last_run: bool,
}

impl RunState {
    pub fn first(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts,
            is_last_run: max_attempts <= 1,
        }
    }

    /// Counters for the following run, if the bound allows one
    pub fn next(&self) -> Option<Self> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let attempt = self.attempt + 1;
        Some(Self {
            attempt,
            max_attempts: self.max_attempts,
            is_last_run: attempt >= self.max_attempts,
        })
    }
}

/// State of the analysis state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Initial,
    TargetsLoaded,
    Checked,
    Adjusted,
    Failed,
    Persisted,
    RerunRequested,
    Done,
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Context passed to every engine and store call
#[derive(Debug)]
pub struct AnalysisContext {
    pub config: AnalysisConfig,
    pub run: RunState,
    pub phase: AnalysisPhase,
    pub log: MessageLog,
}

impl AnalysisContext {
    pub fn new(config: AnalysisConfig) -> Self {
        let run = RunState::first(config.effective_max_attempts());
        Self {
            config,
            run,
            phase: AnalysisPhase::Initial,
            log: MessageLog::new(),
        }
    }

    /// Move to the next run; `false` when the attempt bound is reached
    pub fn advance_run(&mut self) -> bool {
        match self.run.next() {
            Some(next) => {
                self.run = next;
                self.log.start_run(next.attempt);
                self.phase = AnalysisPhase::Initial;
                true
            }
            None => false,
        }
    }

    pub fn enter(&mut self, phase: AnalysisPhase) {
        tracing::trace!("run #{}: {} -> {}", self.run.attempt, self.phase, phase);
        self.phase = phase;
    }

    /// Adjustment is allowed in this run for a value that is / is not empty
    pub fn may_adjust(&self, stored_is_empty: bool) -> bool {
        let by_policy =
            self.config.adjust_limits && self.run.attempt > self.config.skip_runs_before_adjust;
        by_policy || (stored_is_empty && self.config.force_empty_limits_adjust)
    }

    pub fn rounding_digits(&self) -> u32 {
        self.config.default_rounding_digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_progression() {
        let first = RunState::first(3);
        assert_eq!(first.attempt, 1);
        assert!(!first.is_last_run);
        let second = first.next().unwrap();
        let third = second.next().unwrap();
        assert!(third.is_last_run);
        assert_eq!(third.next(), None);
    }

    #[test]
    fn test_single_attempt_is_last() {
        assert!(RunState::first(1).is_last_run);
    }

    #[test]
    fn test_advance_run_bounded() {
        let mut ctx = AnalysisContext::new(AnalysisConfig {
            max_attempts: 2,
            ..AnalysisConfig::default()
        });
        assert!(ctx.advance_run());
        assert_eq!(ctx.log.run_number(), 2);
        assert!(!ctx.advance_run());
        assert_eq!(ctx.run.attempt, 2);
    }

    #[test]
    fn test_may_adjust_respects_skip() {
        let mut ctx = AnalysisContext::new(AnalysisConfig {
            adjust_limits: true,
            skip_runs_before_adjust: 1,
            ..AnalysisConfig::default()
        });
        assert!(!ctx.may_adjust(false));
        ctx.advance_run();
        assert!(ctx.may_adjust(false));
    }

    #[test]
    fn test_force_empty_adjust() {
        let ctx = AnalysisContext::new(AnalysisConfig {
            force_empty_limits_adjust: true,
            ..AnalysisConfig::default()
        });
        assert!(ctx.may_adjust(true));
        assert!(!ctx.may_adjust(false));
    }
}
