// Stored limits → targets
//
// Every (target, metric kind) pair is classified while the document is read:
// - present & applicable: parsed into a MetricValue
// - present on the baseline for a relative metric: dropped
// - missing: treated as an empty (adjustable) value
// - duplicated: first entry wins
// - unit requirement violated: setup error, value rejected
//
// Outcomes are aggregated and reported once per metric kind, not once per
// target, so a document missing a metric for fifty methods yields one line.

use crate::benchmark::BenchmarkSet;
use crate::limits::document::{DocumentError, LimitsDocument, StoredLimit};
use crate::messages::{MessageLog, MessageSource, Severity};
use crate::metrics::{MetricCatalog, MetricDescriptor, MetricRange};
use crate::target::{MetricValue, Target, TargetKey};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Classification of one (target, metric) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseOutcome {
    NotApplicableToBaseline,
    Missing,
    Duplicate,
    UnitRequired,
    UnitNotAllowed,
    UnknownUnit,
    UnknownMetric,
}

impl ParseOutcome {
    pub fn severity(&self) -> Severity {
        match self {
            ParseOutcome::Missing => Severity::Informational,
            ParseOutcome::NotApplicableToBaseline
            | ParseOutcome::Duplicate
            | ParseOutcome::UnknownMetric => Severity::Warning,
            ParseOutcome::UnitRequired
            | ParseOutcome::UnitNotAllowed
            | ParseOutcome::UnknownUnit => Severity::SetupError,
        }
    }

    fn describe(&self, metric: &str, targets: &str) -> (String, Option<String>) {
        match self {
            ParseOutcome::NotApplicableToBaseline => (
                format!(
                    "Relative metric '{}' stored for baseline {}; ignored.",
                    metric, targets
                ),
                Some("Remove the entry: the baseline is always 1.0 relative to itself.".to_string()),
            ),
            ParseOutcome::Missing => (
                format!(
                    "No stored limits for metric '{}' of {}; treated as empty.",
                    metric, targets
                ),
                None,
            ),
            ParseOutcome::Duplicate => (
                format!(
                    "Duplicate entries for metric '{}' of {}; the first one is used.",
                    metric, targets
                ),
                Some("Remove the duplicate entries from the limits document.".to_string()),
            ),
            ParseOutcome::UnitRequired => (
                format!(
                    "Metric '{}' of {} has no unit; limits rejected.",
                    metric, targets
                ),
                Some("Add a value with Type=\"Unit\" naming the unit of the limits.".to_string()),
            ),
            ParseOutcome::UnitNotAllowed => (
                format!(
                    "Metric '{}' of {} is unitless but a unit is stored; limits rejected.",
                    metric, targets
                ),
                Some("Remove the Type=\"Unit\" value.".to_string()),
            ),
            ParseOutcome::UnknownUnit => (
                format!(
                    "Metric '{}' of {} uses an unknown unit; limits rejected.",
                    metric, targets
                ),
                None,
            ),
            ParseOutcome::UnknownMetric => (
                format!("Unknown metric '{}' stored for {}; ignored.", metric, targets),
                None,
            ),
        }
    }
}

/// Parse options
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Load every value as unset, ignoring stored limits
    pub ignore_existing: bool,
    /// Resource the targets persist to
    pub resource: Option<String>,
}

/// Aggregates outcomes until they are reported
#[derive(Debug, Default)]
struct OutcomeReport {
    groups: BTreeMap<(String, ParseOutcome), Vec<TargetKey>>,
}

impl OutcomeReport {
    fn add(&mut self, metric: &str, outcome: ParseOutcome, target: &TargetKey) {
        self.groups
            .entry((metric.to_string(), outcome))
            .or_default()
            .push(target.clone());
    }

    fn flush(self, log: &mut MessageLog) {
        for ((metric, outcome), targets) in self.groups {
            let names = targets
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let (text, hint) = outcome.describe(&metric, &names);
            let subject = (targets.len() == 1).then(|| &targets[0]);
            log.log(MessageSource::Limits, outcome.severity(), subject, text, hint);
        }
    }
}

/// Build targets for every method of `benchmarks` from `document`
///
/// `document == None` means no stored limits are available at all.
pub fn targets_from_document(
    document: Option<&LimitsDocument>,
    benchmarks: &BenchmarkSet,
    catalog: &MetricCatalog,
    options: &ParseOptions,
    log: &mut MessageLog,
) -> Result<Vec<Target>, DocumentError> {
    let mut report = OutcomeReport::default();
    let mut targets = Vec::with_capacity(benchmarks.methods.len());

    if options.ignore_existing {
        log.info(
            MessageSource::Limits,
            None,
            "Existing limits are ignored; all metrics start empty.",
        );
    }

    for method in &benchmarks.methods {
        let key = &method.key;
        let mut target = Target::new(key.clone(), method.is_baseline);
        target.resource = options.resource.clone();

        let entries = if options.ignore_existing {
            Vec::new()
        } else {
            stored_entries(document, key, catalog)?
        };

        for (name, _) in &entries {
            if catalog.by_name(name).is_none() {
                report.add(name, ParseOutcome::UnknownMetric, key);
            }
        }

        for descriptor in catalog.iter() {
            let id = descriptor.id.as_str();
            let matches: Vec<&StoredLimit> = entries
                .iter()
                .filter(|(name, _)| name == id)
                .map(|(_, limit)| limit)
                .collect();

            if !descriptor.applies_to(method.is_baseline) {
                if !matches.is_empty() {
                    report.add(id, ParseOutcome::NotApplicableToBaseline, key);
                }
                continue;
            }

            let Some(first) = matches.first() else {
                if !options.ignore_existing {
                    report.add(id, ParseOutcome::Missing, key);
                }
                target.values.push(MetricValue::unset(Arc::clone(descriptor)));
                continue;
            };
            if matches.len() > 1 {
                report.add(id, ParseOutcome::Duplicate, key);
            }

            match to_metric_value(descriptor, first) {
                Ok(value) => target.values.push(value),
                Err(outcome) => {
                    report.add(id, outcome, key);
                    target.values.push(MetricValue::unset(Arc::clone(descriptor)));
                }
            }
        }

        targets.push(target);
    }

    report.flush(log);
    Ok(targets)
}

/// Stored `(metric name, limit)` entries for one method, legacy pair first
fn stored_entries(
    document: Option<&LimitsDocument>,
    key: &TargetKey,
    catalog: &MetricCatalog,
) -> Result<Vec<(String, StoredLimit)>, DocumentError> {
    let Some(candidate) = document
        .and_then(|d| d.competition(&key.type_name))
        .and_then(|c| c.candidate(&key.method_name))
    else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    let path = format!("{}/{}", key.type_name, key.method_name);

    if let Some(legacy) = candidate.legacy_limit(&path)? {
        match catalog.primary() {
            Some(primary) => {
                // A missing side of the legacy pair means "ignore that bound"
                let limit = StoredLimit {
                    min: Some(legacy.min.unwrap_or(f64::NEG_INFINITY)),
                    max: Some(legacy.max.unwrap_or(f64::INFINITY)),
                    unit: None,
                };
                entries.push((primary.id.as_str().to_string(), limit));
            }
            None => tracing::warn!("{}: legacy ratio limits without a primary metric", path),
        }
    }

    for metric in &candidate.metrics {
        let limit = metric.decode(&format!("{}/{}", path, metric.name))?;
        entries.push((metric.name.clone(), limit));
    }
    Ok(entries)
}

fn to_metric_value(
    descriptor: &Arc<MetricDescriptor>,
    limit: &StoredLimit,
) -> Result<MetricValue, ParseOutcome> {
    let has_bounds = limit.min.is_some() || limit.max.is_some();
    let unit = match (&limit.unit, descriptor.requires_unit()) {
        (Some(name), true) => Some(
            descriptor
                .units
                .by_name(name)
                .cloned()
                .ok_or(ParseOutcome::UnknownUnit)?,
        ),
        (Some(_), false) => return Err(ParseOutcome::UnitNotAllowed),
        (None, true) if has_bounds && !all_infinite(limit) => {
            return Err(ParseOutcome::UnitRequired)
        }
        (None, _) => None,
    };

    let coefficient = unit.as_ref().map_or(1.0, |u| u.coefficient);
    let range = match (limit.min, limit.max) {
        (None, None) => MetricRange::unset(),
        (min, Some(max)) => {
            let max = max * coefficient;
            let min = min.map_or_else(|| descriptor.min_policy.default_min(max), |v| v * coefficient);
            MetricRange::new(min, max)
        }
        (Some(min), None) => MetricRange::new(min * coefficient, f64::INFINITY),
    };

    let unit = if range.is_unset() { None } else { unit };
    Ok(MetricValue::stored(Arc::clone(descriptor), range, unit))
}

fn all_infinite(limit: &StoredLimit) -> bool {
    [limit.min, limit.max]
        .into_iter()
        .flatten()
        .all(|v| v.is_infinite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkMethod;
    use crate::limits::document::{CandidateEntry, CompetitionEntry, MetricEntry, ValueEntry};

    fn benchmarks() -> BenchmarkSet {
        BenchmarkSet {
            competition_id: "Bar".to_string(),
            methods: vec![
                BenchmarkMethod {
                    key: TargetKey::new("Bar", "Slow"),
                    is_baseline: true,
                },
                BenchmarkMethod {
                    key: TargetKey::new("Bar", "Foo"),
                    is_baseline: false,
                },
            ],
            limits_resource: None,
        }
    }

    fn document(candidates: Vec<CandidateEntry>) -> LimitsDocument {
        LimitsDocument {
            competitions: vec![CompetitionEntry {
                type_name: "Bar".to_string(),
                candidates,
            }],
        }
    }

    fn metric(name: &str, values: Vec<ValueEntry>) -> MetricEntry {
        MetricEntry {
            name: name.to_string(),
            values,
        }
    }

    fn parse(doc: &LimitsDocument) -> (Vec<Target>, MessageLog) {
        let mut log = MessageLog::new();
        let targets = targets_from_document(
            Some(doc),
            &benchmarks(),
            &MetricCatalog::standard(),
            &ParseOptions::default(),
            &mut log,
        )
        .unwrap();
        (targets, log)
    }

    #[test]
    fn test_missing_entry_is_unset_and_reported_once() {
        let (targets, log) = parse(&LimitsDocument::default());
        let foo = &targets[1];
        let ratio = foo.value(&"TimeRatio".into()).unwrap();
        assert!(ratio.range.is_unset());

        let missing: Vec<_> = log
            .messages()
            .iter()
            .filter(|m| m.text.contains("treated as empty"))
            .collect();
        // One per metric kind, not per target
        assert_eq!(missing.len(), 4);
        assert!(missing.iter().all(|m| m.severity == Severity::Informational));
    }

    #[test]
    fn test_baseline_has_no_relative_metric() {
        let (targets, _) = parse(&LimitsDocument::default());
        let baseline = &targets[0];
        assert!(baseline.value(&"TimeRatio".into()).is_none());
        assert!(baseline.value(&"Time".into()).is_some());
    }

    #[test]
    fn test_legacy_pair_maps_to_primary() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            min_ratio: Some("1.85".to_string()),
            max_ratio: Some("2.15".to_string()),
            metrics: vec![],
        }]);
        let (targets, _) = parse(&doc);
        let ratio = targets[1].value(&"TimeRatio".into()).unwrap();
        assert_eq!(ratio.range, MetricRange::new(1.85, 2.15));
        assert!(!ratio.dirty);
    }

    #[test]
    fn test_legacy_single_side_ignores_other_bound() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            max_ratio: Some("3".to_string()),
            ..CandidateEntry::default()
        }]);
        let (targets, _) = parse(&doc);
        let ratio = targets[1].value(&"TimeRatio".into()).unwrap();
        assert_eq!(ratio.range.min, f64::NEG_INFINITY);
        assert_eq!(ratio.range.max, 3.0);
    }

    #[test]
    fn test_structured_entry_scaled_by_unit() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![metric(
                "Time",
                vec![
                    ValueEntry::new("1.5", Some("Min")),
                    ValueEntry::new("2", Some("Max")),
                    ValueEntry::new("ms", Some("Unit")),
                ],
            )],
            ..CandidateEntry::default()
        }]);
        let (targets, _) = parse(&doc);
        let time = targets[1].value(&"Time".into()).unwrap();
        assert_eq!(time.range, MetricRange::new(1.5e6, 2e6));
        assert_eq!(time.unit.name, "ms");
    }

    #[test]
    fn test_max_only_uses_min_policy() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![metric(
                "GcAllocations",
                vec![
                    ValueEntry::new("4", Some("Max")),
                    ValueEntry::new("KB", Some("Unit")),
                ],
            )],
            ..CandidateEntry::default()
        }]);
        let (targets, _) = parse(&doc);
        let gc = targets[1].value(&"GcAllocations".into()).unwrap();
        assert_eq!(gc.range, MetricRange::new(0.0, 4096.0));
    }

    #[test]
    fn test_duplicate_entry_warns_and_uses_first() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![
                metric("Gen0Collections", vec![ValueEntry::new("1", None)]),
                metric("Gen0Collections", vec![ValueEntry::new("9", None)]),
            ],
            ..CandidateEntry::default()
        }]);
        let (targets, log) = parse(&doc);
        let gen0 = targets[1].value(&"Gen0Collections".into()).unwrap();
        assert_eq!(gen0.range, MetricRange::exact(1.0));
        assert_eq!(log.count(Severity::Warning), 1);
    }

    #[test]
    fn test_unit_mismatch_is_setup_error() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![
                metric("Time", vec![ValueEntry::new("5", Some("Max"))]),
                metric(
                    "Gen0Collections",
                    vec![
                        ValueEntry::new("5", Some("Max")),
                        ValueEntry::new("ms", Some("Unit")),
                    ],
                ),
            ],
            ..CandidateEntry::default()
        }]);
        let (targets, log) = parse(&doc);
        assert!(targets[1].value(&"Time".into()).unwrap().range.is_unset());
        assert!(targets[1]
            .value(&"Gen0Collections".into())
            .unwrap()
            .range
            .is_unset());
        assert_eq!(log.count(Severity::SetupError), 2);
        assert!(!log.safe_to_continue());
    }

    #[test]
    fn test_relative_metric_on_baseline_dropped() {
        let doc = document(vec![CandidateEntry {
            method_name: "Slow".to_string(),
            min_ratio: Some("1".to_string()),
            max_ratio: Some("1".to_string()),
            ..CandidateEntry::default()
        }]);
        let (targets, log) = parse(&doc);
        assert!(targets[0].value(&"TimeRatio".into()).is_none());
        assert!(log
            .messages()
            .iter()
            .any(|m| m.severity == Severity::Warning && m.text.contains("baseline")));
    }

    #[test]
    fn test_unknown_metric_warns() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![metric("Cycles", vec![ValueEntry::new("5", None)])],
            ..CandidateEntry::default()
        }]);
        let (_, log) = parse(&doc);
        assert!(log.messages().iter().any(|m| m.text.contains("Unknown metric 'Cycles'")));
    }

    #[test]
    fn test_missing_value_is_parse_error() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            metrics: vec![metric(
                "Time",
                vec![ValueEntry {
                    value: None,
                    kind: Some("Max".to_string()),
                }],
            )],
            ..CandidateEntry::default()
        }]);
        let mut log = MessageLog::new();
        let err = targets_from_document(
            Some(&doc),
            &benchmarks(),
            &MetricCatalog::standard(),
            &ParseOptions::default(),
            &mut log,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Bar/Foo/Time"));
    }

    #[test]
    fn test_ignore_existing() {
        let doc = document(vec![CandidateEntry {
            method_name: "Foo".to_string(),
            min_ratio: Some("1".to_string()),
            max_ratio: Some("2".to_string()),
            ..CandidateEntry::default()
        }]);
        let mut log = MessageLog::new();
        let options = ParseOptions {
            ignore_existing: true,
            resource: Some("limits.json".to_string()),
        };
        let targets = targets_from_document(
            Some(&doc),
            &benchmarks(),
            &MetricCatalog::standard(),
            &options,
            &mut log,
        )
        .unwrap();
        assert!(targets[1].value(&"TimeRatio".into()).unwrap().range.is_unset());
        assert_eq!(targets[1].resource.as_deref(), Some("limits.json"));
    }
}
