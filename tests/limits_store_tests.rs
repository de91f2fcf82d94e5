//! End-to-end tests of the limits stores driven by the rerun controller
//!
//! Serial: competitions share the process-wide slot registry and the default
//! concurrency policy warns about overlapping runs.

use perfgate::analysis::{AnalysisConfig, CompetitionSummary, CompetitionVerdict, RerunController};
use perfgate::limits::{JsonLimitsStore, LimitsStore, ResourceLocator, TomlLimitsStore};
use perfgate::measurement::MeasurementSource;
use perfgate::messages::Severity;
use perfgate::metrics::MetricCatalog;
use perfgate::replay::ReplayFile;
use perfgate::target::TargetKey;
use serial_test::serial;
use std::fs;
use std::path::Path;

mod utils;
use utils::{write_limits, write_replay, COMPETITOR, STORED_RATIO};

fn run_replay(store: &dyn LimitsStore, config: AnalysisConfig, replay: &Path) -> CompetitionSummary {
    let replay = ReplayFile::from_file(replay).unwrap();
    let benchmarks = replay.benchmark_set(None).unwrap();
    let mut source = replay.into_source();
    let catalog = MetricCatalog::standard();
    RerunController::new(store, &catalog).run(config, &benchmarks, &mut source)
}

fn texts(summary: &CompetitionSummary, severity: Severity) -> Vec<String> {
    summary
        .messages
        .iter()
        .filter(|m| m.severity == severity)
        .map(|m| m.text.clone())
        .collect()
}

fn json_store(dir: &Path) -> JsonLimitsStore {
    JsonLimitsStore::new(ResourceLocator::new().with_base_dir(dir))
}

#[test]
#[serial]
fn test_toml_store_records_then_checks() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.toml"), 1);

    let store = TomlLimitsStore::new(ResourceLocator::new().with_base_dir(dir.path()));
    let summary = run_replay(&store, AnalysisConfig::adjusting(), &replay);
    assert_eq!(summary.verdict, CompetitionVerdict::Passed, "{}", summary.to_report_string());
    // One confirmation run after the limits were recorded
    assert_eq!(summary.attempts, 2);

    let written = fs::read_to_string(dir.path().join("limits.toml")).unwrap();
    assert!(written.contains("name = \"TimeRatio\""));
    assert!(written.contains("name = \"Gen0Collections\""));

    // A fresh store checks against what was recorded
    let store = TomlLimitsStore::new(ResourceLocator::new().with_base_dir(dir.path()));
    let summary = run_replay(&store, AnalysisConfig::default(), &replay);
    assert_eq!(summary.verdict, CompetitionVerdict::Passed, "{}", summary.to_report_string());
    assert!(texts(&summary, Severity::Informational).contains(&"All limits ok.".to_string()));
}

#[test]
#[serial]
fn test_unchanged_limits_are_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);
    let summary = run_replay(&json_store(dir.path()), AnalysisConfig::adjusting(), &replay);
    assert!(summary.is_success());

    // Reformat the stored document; identical samples must not trigger a save
    let path = dir.path().join("limits.json");
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let compact = serde_json::to_string(&value).unwrap();
    fs::write(&path, &compact).unwrap();

    let summary = run_replay(&json_store(dir.path()), AnalysisConfig::adjusting(), &replay);
    assert!(summary.is_success());
    assert_eq!(summary.attempts, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), compact);
}

#[test]
#[serial]
fn test_external_change_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let replay_path = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);
    let replay = ReplayFile::from_file(&replay_path).unwrap();
    let benchmarks = replay.benchmark_set(None).unwrap();
    let mut recorded = replay.into_source();

    let limits = dir.path().join("limits.json");
    let external = "{\"competitions\": []}\n";
    let mut source = |run: u32| {
        let mut report = recorded.measure(run);
        if run == 2 {
            // Someone else saves while the confirmation run is measured
            fs::write(&limits, external).unwrap();
            let slower = COMPETITOR.iter().map(|v| v * 1.5).collect();
            report.insert(TargetKey::new("Bar", "Foo"), "Time", slower);
        }
        report
    };

    let store = json_store(dir.path());
    let catalog = MetricCatalog::standard();
    let summary = RerunController::new(&store, &catalog).run(
        AnalysisConfig::adjusting(),
        &benchmarks,
        &mut source,
    );

    // The checks held; only the save was refused
    assert_eq!(summary.verdict, CompetitionVerdict::Passed);
    assert_eq!(summary.attempts, 2);
    assert!(!summary.is_success());
    let errors = texts(&summary, Severity::SetupError);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("changed by someone else"), "{}", errors[0]);
    assert!(texts(&summary, Severity::Warning)
        .contains(&"Adjusted limits of Bar.Foo were not saved.".to_string()));
    assert_eq!(fs::read_to_string(&limits).unwrap(), external);
}

#[test]
#[serial]
fn test_previous_run_log_replaces_stored_limits() {
    let dir = tempfile::tempdir().unwrap();
    write_limits(dir.path(), "previous.json", STORED_RATIO);
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    let config = AnalysisConfig {
        previous_run_log: Some("previous.json".to_string()),
        ..AnalysisConfig::default()
    };
    let summary = run_replay(&json_store(dir.path()), config, &replay);

    // The ratio is within the previous run; the other metrics have no limits
    assert_eq!(summary.verdict, CompetitionVerdict::Failed);
    let failures = texts(&summary, Severity::TestError);
    assert!(failures.iter().all(|t| !t.contains("'TimeRatio'")), "{:?}", failures);
    assert!(failures.iter().any(|t| t.contains("no stored limits")));
    assert!(!dir.path().join("limits.json").exists());
}

#[test]
#[serial]
fn test_missing_previous_run_log_warns() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    let config = AnalysisConfig {
        previous_run_log: Some("absent.json".to_string()),
        ..AnalysisConfig::adjusting()
    };
    let summary = run_replay(&json_store(dir.path()), config, &replay);

    assert!(texts(&summary, Severity::Warning)
        .iter()
        .any(|t| t.starts_with("Previous run log 'absent.json' is not available")));
    assert_eq!(texts(&summary, Severity::SetupError).len(), 0);
}

#[test]
#[serial]
fn test_same_store_serves_cached_limits() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_replay(dir.path(), "one.replay.json", Some("limits.json"), 1);
    let store = json_store(dir.path());
    assert!(run_replay(&store, AnalysisConfig::adjusting(), &first).is_success());

    // Same competition again through the same store: served from the cache
    // and already covered
    let summary = run_replay(&store, AnalysisConfig::adjusting(), &first);
    assert!(summary.is_success());
    assert_eq!(summary.attempts, 1);
    assert!(texts(&summary, Severity::Informational)
        .iter()
        .all(|t| !t.contains("saved to")));
}
