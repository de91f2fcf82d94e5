// Bounded rerun loop around the analysis engine
//
// Another run is requested when
// (a) limits were adjusted and confirmation reruns remain, or
// (b) checks failed and failure reruns remain,
// never after a setup or execution error, and never past the attempt bound.

use crate::analysis::concurrency::enter_competition;
use crate::analysis::config::AnalysisConfig;
use crate::analysis::context::{AnalysisContext, AnalysisPhase};
use crate::analysis::engine::{AnalysisEngine, PassOutcome};
use crate::benchmark::BenchmarkSet;
use crate::limits::LimitsStore;
use crate::measurement::MeasurementSource;
use crate::messages::{Message, MessageSource, Severity};
use crate::metrics::MetricCatalog;
use std::fmt;

/// Final verdict of a competition invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitionVerdict {
    /// Every metric within its limits
    Passed,
    /// At least one metric out of its limits
    Failed,
    /// A setup or execution error made the result untrustworthy
    Error,
    /// The run was skipped by the concurrency policy
    Skipped,
}

impl fmt::Display for CompetitionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompetitionVerdict::Passed => "passed",
            CompetitionVerdict::Failed => "failed",
            CompetitionVerdict::Error => "error",
            CompetitionVerdict::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Result of a competition invocation
#[derive(Debug, Clone)]
pub struct CompetitionSummary {
    pub competition_id: String,
    pub verdict: CompetitionVerdict,
    /// Runs performed
    pub attempts: u32,
    pub messages: Vec<Message>,
}

impl CompetitionSummary {
    /// Passed, and no setup or execution error was reported along the way
    pub fn is_success(&self) -> bool {
        self.verdict == CompetitionVerdict::Passed
            && !self.messages.iter().any(|m| m.severity.is_critical())
    }

    /// Messages of at least `severity`
    pub fn messages_at_least(&self, severity: Severity) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.severity >= severity)
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        let icon = match self.verdict {
            CompetitionVerdict::Passed => "✅",
            CompetitionVerdict::Failed => "❌",
            CompetitionVerdict::Error => "⛔",
            CompetitionVerdict::Skipped => "⏭",
        };
        report.push_str(&format!(
            "{} Competition '{}' {} ({} run{})\n",
            icon,
            self.competition_id,
            self.verdict.to_string().to_uppercase(),
            self.attempts,
            if self.attempts == 1 { "" } else { "s" }
        ));

        let problems: Vec<&Message> = self.messages_at_least(Severity::Warning).collect();
        if !problems.is_empty() {
            report.push('\n');
            for message in problems {
                report.push_str(&format!("{}\n", message));
            }
        }

        if let Some(last) = self
            .messages
            .iter()
            .rev()
            .find(|m| m.severity == Severity::Informational && m.run_number == self.attempts)
        {
            report.push_str(&format!("\n{}\n", last.text));
        }

        report
    }
}

/// Drives analysis passes until the verdict is stable
pub struct RerunController<'a> {
    store: &'a dyn LimitsStore,
    catalog: &'a MetricCatalog,
}

impl<'a> RerunController<'a> {
    pub fn new(store: &'a dyn LimitsStore, catalog: &'a MetricCatalog) -> Self {
        Self { store, catalog }
    }

    /// Run one competition invocation
    pub fn run(
        &self,
        config: AnalysisConfig,
        benchmarks: &BenchmarkSet,
        source: &mut dyn MeasurementSource,
    ) -> CompetitionSummary {
        let mut ctx = AnalysisContext::new(config);
        let competition_id = benchmarks.competition_id.clone();

        if let Err(e) = ctx.config.validate() {
            ctx.log.setup_error(
                MessageSource::Analyser,
                None,
                format!("Invalid analysis configuration: {}", e),
                None,
            );
            return summarize(ctx, competition_id, CompetitionVerdict::Error, 0);
        }

        let lock_dir = ctx.config.lock_directory();
        let Some(mut guard) =
            enter_competition(&competition_id, ctx.config.concurrency, &lock_dir, &mut ctx.log)
        else {
            return summarize(ctx, competition_id, CompetitionVerdict::Skipped, 0);
        };

        let mut engine = AnalysisEngine::new(self.store, self.catalog, benchmarks);
        let mut confirmations_left = ctx.config.confirmation_reruns;
        let mut failure_reruns_left = ctx.config.reruns_if_failed;

        let outcome = loop {
            tracing::debug!(
                "Competition '{}' run {}/{}",
                competition_id,
                ctx.run.attempt,
                ctx.run.max_attempts
            );
            let report = source.measure(ctx.run.attempt);
            let outcome = engine.run_pass(&mut ctx, &report);
            if outcome.save_failed {
                tracing::debug!(
                    "Competition '{}' run {}: limits stay dirty until a later save",
                    competition_id,
                    ctx.run.attempt
                );
            }

            if outcome.critical {
                break outcome;
            }

            let rerun = if !outcome.adjusted.is_empty() && confirmations_left > 0 {
                confirmations_left -= 1;
                ctx.log.info(
                    MessageSource::Analyser,
                    None,
                    "Limits were adjusted; rerunning to confirm them.",
                );
                true
            } else if !outcome.failed.is_empty() && failure_reruns_left > 0 {
                failure_reruns_left -= 1;
                ctx.log.info(
                    MessageSource::Analyser,
                    None,
                    format!("{} metric(s) out of limits; rerunning.", outcome.failed.len()),
                );
                true
            } else {
                false
            };

            if !rerun {
                break outcome;
            }
            ctx.enter(AnalysisPhase::RerunRequested);
            if !ctx.advance_run() {
                ctx.log.warning(
                    MessageSource::Analyser,
                    None,
                    format!(
                        "Rerun requested but the limit of {} run(s) is reached.",
                        ctx.run.max_attempts
                    ),
                );
                break outcome;
            }
        };
        ctx.enter(AnalysisPhase::Done);
        // Runs that started after this one entered have not been warned about yet
        guard.report_overlap(&mut ctx.log);

        let verdict = finish(&mut ctx, &engine, &outcome);
        let attempts = ctx.run.attempt;
        summarize(ctx, competition_id, verdict, attempts)
    }
}

/// Terminal messages and verdict
fn finish(ctx: &mut AnalysisContext, engine: &AnalysisEngine<'_>, outcome: &PassOutcome) -> CompetitionVerdict {
    if outcome.critical {
        return CompetitionVerdict::Error;
    }

    let unsaved = engine.unsaved_targets();
    if !unsaved.is_empty() {
        let names = unsaved
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let hint = if ctx.config.persist_limits {
            None
        } else {
            Some("Enable limits persistence to keep the adjusted limits.".to_string())
        };
        ctx.log.log(
            MessageSource::Limits,
            Severity::Warning,
            None,
            format!("Adjusted limits of {} were not saved.", names),
            hint,
        );
    }

    if !outcome.failed.is_empty() {
        return CompetitionVerdict::Failed;
    }
    if unsaved.is_empty() {
        ctx.log.info(MessageSource::Analyser, None, "All limits ok.");
    }
    CompetitionVerdict::Passed
}

fn summarize(
    ctx: AnalysisContext,
    competition_id: String,
    verdict: CompetitionVerdict,
    attempts: u32,
) -> CompetitionSummary {
    CompetitionSummary {
        competition_id,
        verdict,
        attempts,
        messages: ctx.log.into_messages(),
    }
}
