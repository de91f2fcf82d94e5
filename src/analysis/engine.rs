// One analysis pass
//
// Initial -> TargetsLoaded -> Checked -> {Adjusted | Failed} -> Persisted
//
// Targets are loaded once per invocation and reused by every rerun. All
// (target x metric) pairs are checked before any decision is made; only
// mismatched or empty stored values are adjusted afterwards.

use crate::analysis::context::{AnalysisContext, AnalysisPhase};
use crate::benchmark::BenchmarkSet;
use crate::limits::LimitsStore;
use crate::measurement::MeasurementReport;
use crate::messages::MessageSource;
use crate::metrics::{format_in_unit, MetricCatalog, MetricId, MetricRange};
use crate::target::{MetricValue, Target, TargetKey};

/// Result of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    /// Metric values checked
    pub checked: usize,
    /// Values out of limits that were not adjusted
    pub failed: Vec<(TargetKey, MetricId)>,
    /// Values whose limits were widened
    pub adjusted: Vec<(TargetKey, MetricId)>,
    /// Targets persisted in this pass
    pub saved: Vec<TargetKey>,
    /// A setup or execution error stopped the pass
    pub critical: bool,
    /// Adjusted limits could not be persisted
    pub save_failed: bool,
}

impl PassOutcome {
    pub fn is_clean(&self) -> bool {
        !self.critical && self.failed.is_empty()
    }
}

/// A value that did not match its stored limits
#[derive(Debug)]
struct Mismatch {
    target: usize,
    value: usize,
    actual: MetricRange,
    limit: MetricRange,
}

/// Measured ranges of one value
enum Measured {
    Ranges { actual: MetricRange, limit: MetricRange },
    Empty,
}

/// Runs analysis passes over one competition
pub struct AnalysisEngine<'a> {
    store: &'a dyn LimitsStore,
    catalog: &'a MetricCatalog,
    benchmarks: &'a BenchmarkSet,
    targets: Option<Vec<Target>>,
}

impl<'a> AnalysisEngine<'a> {
    pub fn new(
        store: &'a dyn LimitsStore,
        catalog: &'a MetricCatalog,
        benchmarks: &'a BenchmarkSet,
    ) -> Self {
        Self {
            store,
            catalog,
            benchmarks,
            targets: None,
        }
    }

    /// Targets loaded by the first pass
    pub fn targets(&self) -> &[Target] {
        self.targets.as_deref().unwrap_or_default()
    }

    /// Targets with adjusted limits not persisted yet
    pub fn unsaved_targets(&self) -> Vec<&TargetKey> {
        self.targets()
            .iter()
            .filter(|t| t.is_dirty())
            .map(|t| &t.key)
            .collect()
    }

    /// Run one pass over `report`
    pub fn run_pass(&mut self, ctx: &mut AnalysisContext, report: &MeasurementReport) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        ctx.enter(AnalysisPhase::Initial);

        if self.targets.is_none() {
            self.targets = self
                .store
                .try_get_targets(ctx, self.benchmarks, self.catalog);
        }
        let Some(mut targets) = self.targets.take() else {
            outcome.critical = true;
            ctx.enter(AnalysisPhase::Failed);
            return outcome;
        };
        ctx.enter(AnalysisPhase::TargetsLoaded);

        if let Err(e) = report.validate() {
            ctx.log.execution_error(
                MessageSource::Measurement,
                None,
                format!("Invalid measurement report: {}", e),
                None,
            );
        }

        let mismatches = if ctx.log.safe_to_continue() {
            self.check(ctx, &targets, report, &mut outcome)
        } else {
            Vec::new()
        };
        ctx.enter(AnalysisPhase::Checked);

        if !ctx.log.safe_to_continue() {
            outcome.critical = true;
            ctx.enter(AnalysisPhase::Failed);
            self.targets = Some(targets);
            return outcome;
        }

        for mismatch in mismatches {
            let target = &mut targets[mismatch.target];
            let key = target.key.clone();
            let value = &mut target.values[mismatch.value];
            decide(ctx, &key, value, &mismatch, &mut outcome);
        }
        ctx.enter(if outcome.failed.is_empty() {
            AnalysisPhase::Adjusted
        } else {
            AnalysisPhase::Failed
        });

        // A failed save is reported by the store but does not stop the run;
        // its targets stay dirty and are retried by the next pass.
        if ctx.config.persist_limits && targets.iter().any(Target::is_dirty) {
            outcome.saved = self.store.try_save_targets(ctx, &targets);
            for target in targets.iter_mut().filter(|t| outcome.saved.contains(&t.key)) {
                target.mark_saved();
            }
            outcome.save_failed = targets.iter().any(Target::is_dirty);
        }
        ctx.enter(AnalysisPhase::Persisted);

        self.targets = Some(targets);
        outcome
    }

    /// Check every pair; stops early only on a critical error
    fn check(
        &self,
        ctx: &mut AnalysisContext,
        targets: &[Target],
        report: &MeasurementReport,
        outcome: &mut PassOutcome,
    ) -> Vec<Mismatch> {
        let digits = ctx.rounding_digits();
        let baseline = self.benchmarks.baseline().map(|m| &m.key);
        let mut mismatches = Vec::new();

        'targets: for (t_idx, target) in targets.iter().enumerate() {
            if !report.has_report(&target.key) {
                ctx.log.execution_error(
                    MessageSource::Measurement,
                    Some(&target.key),
                    "No measurement report for the benchmark.",
                    Some("Check that the benchmark ran to completion.".to_string()),
                );
                break 'targets;
            }

            for (v_idx, value) in target.values.iter().enumerate() {
                outcome.checked += 1;
                let measured = measure(value, &target.key, baseline, report);

                let (actual, limit) = match measured {
                    Measured::Ranges { actual, limit } => (actual, limit),
                    Measured::Empty if value.range.is_unset() => {
                        ctx.log.warning(
                            MessageSource::Analyser,
                            Some(&target.key),
                            format!("Metric '{}' has no samples; ignored.", value.descriptor.display_name),
                        );
                        continue;
                    }
                    Measured::Empty => {
                        ctx.log.execution_error(
                            MessageSource::Measurement,
                            Some(&target.key),
                            format!(
                                "Metric '{}' has stored limits {} but no samples.",
                                value.descriptor.display_name,
                                value.display_range(digits)
                            ),
                            None,
                        );
                        break 'targets;
                    }
                };

                if value.check(&actual, digits) {
                    ctx.log.verbose(
                        MessageSource::Analyser,
                        Some(&target.key),
                        format!(
                            "Metric '{}' {} within limits {}.",
                            value.descriptor.display_name,
                            describe(value, &actual, digits),
                            value.display_range(digits)
                        ),
                    );
                } else {
                    mismatches.push(Mismatch {
                        target: t_idx,
                        value: v_idx,
                        actual,
                        limit,
                    });
                }
            }
        }
        mismatches
    }
}

/// Measured actual and limit ranges of `value` for `key`
fn measure(
    value: &MetricValue,
    key: &TargetKey,
    baseline: Option<&TargetKey>,
    report: &MeasurementReport,
) -> Measured {
    let descriptor = &value.descriptor;
    let calculator = descriptor.calculator();
    let series = descriptor.sample_source.as_str();

    let Some(samples) = report.samples(key, series) else {
        return Measured::Empty;
    };

    let ranges = if descriptor.is_relative {
        let Some(base) = baseline.and_then(|b| report.samples(b, series)) else {
            return Measured::Empty;
        };
        calculator
            .relative_actual_range(samples, base)
            .zip(calculator.relative_limit_range(samples, base))
    } else {
        calculator
            .actual_range(samples)
            .zip(calculator.limit_range(samples))
    };

    match ranges {
        Some((actual, limit)) => Measured::Ranges { actual, limit },
        None => Measured::Empty,
    }
}

/// Adjust a mismatched value or record the failure
fn decide(
    ctx: &mut AnalysisContext,
    key: &TargetKey,
    value: &mut MetricValue,
    mismatch: &Mismatch,
    outcome: &mut PassOutcome,
) {
    let digits = ctx.rounding_digits();
    let name = value.descriptor.display_name.clone();
    let metric = value.metric().clone();
    let was_empty = value.range.is_unset();
    let before = value.display_range(digits);
    let measured = describe(value, &mismatch.actual, digits);

    if ctx.may_adjust(was_empty) {
        value.union_with(&mismatch.limit, false, digits);
        ctx.log.info(
            MessageSource::Analyser,
            Some(key),
            format!(
                "Metric '{}' {}; limits adjusted {} -> {}.",
                name,
                measured,
                before,
                value.display_range(digits)
            ),
        );
        outcome.adjusted.push((key.clone(), metric));
        return;
    }

    let hint = if ctx.config.adjust_limits {
        format!(
            "Adjustment starts after {} run(s).",
            ctx.config.skip_runs_before_adjust
        )
    } else {
        "Enable limits adjustment to accept the new values.".to_string()
    };
    let text = if was_empty {
        format!("Metric '{}' {} but has no stored limits.", name, measured)
    } else {
        format!("Metric '{}' {} is out of limits {}.", name, measured, before)
    };
    ctx.log.test_error(MessageSource::Analyser, Some(key), text, Some(hint));
    outcome.failed.push((key.clone(), metric));
}

/// "measured [a..b] unit" in the unit the value compares in
fn describe(value: &MetricValue, actual: &MetricRange, default_digits: u32) -> String {
    let unit = if value.range.is_unset() {
        value.descriptor.units.select(actual)
    } else {
        value.unit.clone()
    };
    let digits = unit.rounding_digits.unwrap_or(default_digits);
    format!("measured {}", format_in_unit(actual, &unit, digits))
}
