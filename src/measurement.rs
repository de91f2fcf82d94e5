//! Measurement input
//!
//! The harness that runs competitor code is external. It hands over one
//! [`MeasurementReport`] per analysis run: for every target it measured, a
//! set of samples per named series (e.g. `Time`, `GcAllocations`).

use crate::target::TargetKey;
use std::collections::BTreeMap;

/// Samples collected for one target, keyed by series name
pub type SeriesSamples = BTreeMap<String, Vec<f64>>;

/// Result of one measurement run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementReport {
    targets: BTreeMap<TargetKey, SeriesSamples>,
}

impl MeasurementReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record samples for one series of one target
    pub fn insert(&mut self, target: TargetKey, series: impl Into<String>, samples: Vec<f64>) {
        self.targets
            .entry(target)
            .or_default()
            .insert(series.into(), samples);
    }

    pub fn with(mut self, target: TargetKey, series: impl Into<String>, samples: Vec<f64>) -> Self {
        self.insert(target, series, samples);
        self
    }

    /// False when the harness produced no report for `target`
    pub fn has_report(&self, target: &TargetKey) -> bool {
        self.targets.contains_key(target)
    }

    /// Samples of a series; `None` when absent or empty
    pub fn samples(&self, target: &TargetKey, series: &str) -> Option<&[f64]> {
        self.targets
            .get(target)?
            .get(series)
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
    }

    /// Samples must be finite and non-negative
    pub fn validate(&self) -> Result<(), String> {
        for (target, series) in &self.targets {
            for (name, samples) in series {
                if let Some(bad) = samples.iter().find(|s| !s.is_finite() || **s < 0.0) {
                    return Err(format!(
                        "{} series '{}' contains invalid sample {}",
                        target, name, bad
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetKey> {
        self.targets.keys()
    }
}

/// Produces one report per analysis run
pub trait MeasurementSource {
    /// Run the benchmarks; `run_number` starts at 1
    fn measure(&mut self, run_number: u32) -> MeasurementReport;
}

impl<F> MeasurementSource for F
where
    F: FnMut(u32) -> MeasurementReport,
{
    fn measure(&mut self, run_number: u32) -> MeasurementReport {
        self(run_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_lookup() {
        let key = TargetKey::new("Bar", "Foo");
        let report = MeasurementReport::new()
            .with(key.clone(), "Time", vec![1.0, 2.0])
            .with(key.clone(), "GcAllocations", vec![]);

        assert!(report.has_report(&key));
        assert_eq!(report.samples(&key, "Time"), Some(&[1.0, 2.0][..]));
        assert_eq!(report.samples(&key, "GcAllocations"), None);
        assert_eq!(report.samples(&key, "Missing"), None);
        assert!(!report.has_report(&TargetKey::new("Bar", "Baz")));
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        let key = TargetKey::new("Bar", "Foo");
        let negative = MeasurementReport::new().with(key.clone(), "Time", vec![1.0, -1.0]);
        assert!(negative.validate().is_err());
        let nan = MeasurementReport::new().with(key.clone(), "Time", vec![f64::NAN]);
        assert!(nan.validate().is_err());
        let ok = MeasurementReport::new().with(key, "Time", vec![0.0, 3.0]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_closure_is_a_source() {
        let key = TargetKey::new("Bar", "Foo");
        let mut source = |run: u32| MeasurementReport::new().with(key.clone(), "Time", vec![run as f64]);
        let report = source.measure(3);
        assert_eq!(report.samples(&key, "Time"), Some(&[3.0][..]));
    }
}
