//! Recorded competitions
//!
//! A replay file describes one competition (its methods, baseline and limits
//! resource) together with the samples of one or more recorded runs. The CLI
//! analyses replay files instead of driving a live harness; run N of the
//! analysis uses the N-th recorded run, the last one repeating.
//!
//! ```json
//! {
//!   "competition": "Bar",
//!   "limits": "limits.json",
//!   "baseline": "Slow",
//!   "competitors": ["Foo"],
//!   "runs": [
//!     { "Slow": { "Time": [100, 102, 101] }, "Foo": { "Time": [205, 210, 198] } }
//!   ]
//! }
//! ```

use crate::benchmark::{BenchmarkAttribute, BenchmarkSet, StaticMetadata};
use crate::measurement::{MeasurementReport, MeasurementSource, SeriesSamples};
use crate::target::TargetKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Samples of one recorded run, method name → series → samples
pub type RecordedRun = BTreeMap<String, SeriesSamples>;

/// Contents of a replay file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFile {
    /// Competition id, also the type name of its methods
    pub competition: String,
    /// Limits resource of the competition
    #[serde(default)]
    pub limits: Option<String>,
    pub baseline: String,
    #[serde(default)]
    pub competitors: Vec<String>,
    /// Methods measured but excluded from the competition
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub runs: Vec<RecordedRun>,
}

impl ReplayFile {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_json_str(&content)
            .with_context(|| format!("Invalid replay file {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON")
    }

    fn key(&self, method: &str) -> TargetKey {
        TargetKey::new(self.competition.as_str(), method)
    }

    /// Metadata declared by the file
    pub fn metadata(&self) -> StaticMetadata {
        let mut metadata = StaticMetadata::new()
            .with_method(self.key(&self.baseline), vec![BenchmarkAttribute::Baseline]);
        for method in &self.competitors {
            metadata = metadata.with_method(self.key(method), vec![BenchmarkAttribute::Competitor]);
        }
        for method in &self.excluded {
            metadata = metadata.with_method(
                self.key(method),
                vec![BenchmarkAttribute::Competitor, BenchmarkAttribute::DoesNotCompete],
            );
        }
        metadata
    }

    /// Benchmark set of the competition
    ///
    /// `default_limits` is used when the file names no limits resource.
    pub fn benchmark_set(&self, default_limits: Option<&str>) -> Result<BenchmarkSet> {
        let candidates: Vec<TargetKey> = std::iter::once(&self.baseline)
            .chain(&self.competitors)
            .chain(&self.excluded)
            .map(|m| self.key(m))
            .collect();
        let containers = vec![
            default_limits.map(str::to_string),
            self.limits.clone(),
        ];

        BenchmarkSet::discover(
            self.competition.as_str(),
            &candidates,
            &containers,
            &self.metadata(),
        )
        .with_context(|| format!("Invalid competition '{}'", self.competition))
    }

    pub fn into_source(self) -> ReplaySource {
        let runs = self
            .runs
            .iter()
            .map(|run| {
                let mut report = MeasurementReport::new();
                for (method, series) in run {
                    for (name, samples) in series {
                        report.insert(self.key(method), name.as_str(), samples.clone());
                    }
                }
                report
            })
            .collect();
        ReplaySource { runs }
    }
}

/// Measurement source replaying recorded runs
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    runs: Vec<MeasurementReport>,
}

impl ReplaySource {
    pub fn new(runs: Vec<MeasurementReport>) -> Self {
        Self { runs }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl MeasurementSource for ReplaySource {
    fn measure(&mut self, run_number: u32) -> MeasurementReport {
        let index = (run_number.max(1) as usize - 1).min(self.runs.len().saturating_sub(1));
        self.runs.get(index).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLAY: &str = r#"{
        "competition": "Bar",
        "limits": "bar.json",
        "baseline": "Slow",
        "competitors": ["Foo"],
        "excluded": ["Helper"],
        "runs": [
            { "Slow": { "Time": [100, 102] }, "Foo": { "Time": [205, 210] } },
            { "Slow": { "Time": [101] }, "Foo": { "Time": [207] } }
        ]
    }"#;

    #[test]
    fn test_benchmark_set_from_replay() {
        let replay = ReplayFile::from_json_str(REPLAY).unwrap();
        let set = replay.benchmark_set(Some("default.json")).unwrap();
        assert_eq!(set.methods.len(), 2);
        assert_eq!(set.baseline().unwrap().key, TargetKey::new("Bar", "Slow"));
        assert_eq!(set.limits_resource.as_deref(), Some("bar.json"));
    }

    #[test]
    fn test_default_limits_resource() {
        let mut replay = ReplayFile::from_json_str(REPLAY).unwrap();
        replay.limits = None;
        let set = replay.benchmark_set(Some("default.json")).unwrap();
        assert_eq!(set.limits_resource.as_deref(), Some("default.json"));
    }

    #[test]
    fn test_last_run_repeats() {
        let mut source = ReplayFile::from_json_str(REPLAY).unwrap().into_source();
        let foo = TargetKey::new("Bar", "Foo");
        assert_eq!(source.measure(1).samples(&foo, "Time"), Some(&[205.0, 210.0][..]));
        assert_eq!(source.measure(2).samples(&foo, "Time"), Some(&[207.0][..]));
        assert_eq!(source.measure(7).samples(&foo, "Time"), Some(&[207.0][..]));
    }

    #[test]
    fn test_no_runs_yields_empty_report() {
        let mut source = ReplaySource::default();
        assert!(source.is_empty());
        assert!(!source.measure(1).has_report(&TargetKey::new("Bar", "Foo")));
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = ReplayFile::from_file("/nonexistent/replay.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/replay.json"));
    }
}
