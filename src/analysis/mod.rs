// Competition analysis: configuration, explicit context, the single-pass
// engine and the bounded rerun loop around it.
//
// Control flow per invocation:
//   enter concurrency slot -> [measure -> run_pass -> decide rerun]* -> summary

pub mod concurrency;
mod config;
mod context;
mod engine;
mod rerun;

pub use concurrency::{
    active_competitions, competition_lock_path, enter_competition, CompetitionGuard,
    PARALLEL_RUN_SKIPPED, PARALLEL_RUN_WARNING,
};
pub use config::{AnalysisConfig, ConcurrencyPolicy, MAX_RUN_ATTEMPTS};
pub use context::{AnalysisContext, AnalysisPhase, RunState};
pub use engine::{AnalysisEngine, PassOutcome};
pub use rerun::{CompetitionSummary, CompetitionVerdict, RerunController};
