// Percentile-based metric calculators
//
// Timing samples are skewed: a GC pause or a scheduler hiccup produces a long
// right tail. Percentiles are insensitive to that tail where the arithmetic
// mean is not, so every "mean" here is the p-th percentile of the samples.
//
// Spread is computed in log space (geometric scale). For relative metrics the
// ratio of two log-normal variables is again log-normal with
//   mu_z = mu_x - mu_y,  sigma_z^2 = sigma_x^2 + sigma_y^2
// assuming independent samples.
//
// Implementation:
// - Percentiles use linear interpolation over sorted samples
// - Uses trueno::Vector for the log-space mean / variance / stddev

use crate::metrics::range::MetricRange;
use std::fmt;
use thiserror::Error;
use trueno::Vector;

/// Calculator configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("Percentile must be in [0, 100], got {0}")]
    InvalidPercentile(f64),

    #[error("Percentile deltas must satisfy 0 <= actual ({actual}) <= limit ({limit})")]
    InvalidDeltas { actual: f64, limit: f64 },
}

/// Calibration preset for a percentile calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalculatorPreset {
    /// Median with a wide window: p=50, actual ±5, limit ±10
    Tight,
    /// p=85, actual ±0, limit ±1
    P85,
    /// p=95, actual ±0, limit ±1
    P95,
    /// Explicit parameters
    Custom {
        percentile: f64,
        actual_delta: f64,
        limit_delta: f64,
    },
}

impl CalculatorPreset {
    /// `(percentile, actual_delta, limit_delta)`
    pub fn parameters(&self) -> (f64, f64, f64) {
        match *self {
            CalculatorPreset::Tight => (50.0, 5.0, 10.0),
            CalculatorPreset::P85 => (85.0, 0.0, 1.0),
            CalculatorPreset::P95 => (95.0, 0.0, 1.0),
            CalculatorPreset::Custom {
                percentile,
                actual_delta,
                limit_delta,
            } => (percentile, actual_delta, limit_delta),
        }
    }

    /// Validate custom parameters
    pub fn validate(&self) -> Result<(), CalculatorError> {
        let (p, actual, limit) = self.parameters();
        if !(0.0..=100.0).contains(&p) {
            return Err(CalculatorError::InvalidPercentile(p));
        }
        if !(actual >= 0.0 && limit >= actual) {
            return Err(CalculatorError::InvalidDeltas { actual, limit });
        }
        Ok(())
    }
}

/// Turns raw samples into metric means, spreads and ranges
///
/// All methods return `None` when the samples (or the baseline samples) are
/// empty, or when a relative value is undefined.
pub trait MetricCalculator: fmt::Debug + Send + Sync {
    /// Central value of the samples
    fn mean(&self, samples: &[f64]) -> Option<f64>;

    /// Geometric spread of the samples
    fn variance(&self, samples: &[f64]) -> Option<f64>;

    /// Range describing what was measured
    fn actual_range(&self, samples: &[f64]) -> Option<MetricRange>;

    /// Wider range used when limits are adjusted
    fn limit_range(&self, samples: &[f64]) -> Option<MetricRange>;

    /// Central value of `samples / baseline`
    fn relative_mean(&self, samples: &[f64], baseline: &[f64]) -> Option<f64>;

    /// Spread of `samples / baseline`
    fn relative_variance(&self, samples: &[f64], baseline: &[f64]) -> Option<f64>;

    /// Measured range of `samples / baseline`
    fn relative_actual_range(&self, samples: &[f64], baseline: &[f64]) -> Option<MetricRange>;

    /// Limit range of `samples / baseline`
    fn relative_limit_range(&self, samples: &[f64], baseline: &[f64]) -> Option<MetricRange>;
}

/// Percentile calculator driven by a [`CalculatorPreset`]
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileCalculator {
    percentile: f64,
    actual_delta: f64,
    limit_delta: f64,
}

impl PercentileCalculator {
    /// Create a calculator, validating the preset
    pub fn new(preset: CalculatorPreset) -> Result<Self, CalculatorError> {
        preset.validate()?;
        let (percentile, actual_delta, limit_delta) = preset.parameters();
        Ok(Self {
            percentile,
            actual_delta,
            limit_delta,
        })
    }

    /// p=50 with a ±5/±10 window
    pub fn tight() -> Self {
        Self {
            percentile: 50.0,
            actual_delta: 5.0,
            limit_delta: 10.0,
        }
    }

    /// p=85 with a 0/±1 window
    pub fn p85() -> Self {
        Self {
            percentile: 85.0,
            actual_delta: 0.0,
            limit_delta: 1.0,
        }
    }

    /// p=95 with a 0/±1 window
    pub fn p95() -> Self {
        Self {
            percentile: 95.0,
            actual_delta: 0.0,
            limit_delta: 1.0,
        }
    }

    /// Configured percentile
    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    fn range(&self, samples: &[f64], delta: f64) -> Option<MetricRange> {
        let sorted = sorted_samples(samples)?;
        let min = percentile_of_sorted(&sorted, self.percentile - delta);
        let max = percentile_of_sorted(&sorted, self.percentile + delta);
        Some(MetricRange::new(min, max))
    }

    fn relative_range(
        &self,
        samples: &[f64],
        baseline: &[f64],
        delta: f64,
    ) -> Option<MetricRange> {
        let sorted = sorted_samples(samples)?;
        let sorted_baseline = sorted_samples(baseline)?;

        // Cross ratios: a wider delta can only widen the range
        let low = percentile_of_sorted(&sorted, self.percentile - delta);
        let high = percentile_of_sorted(&sorted, self.percentile + delta);
        let base_low = percentile_of_sorted(&sorted_baseline, self.percentile - delta);
        let base_high = percentile_of_sorted(&sorted_baseline, self.percentile + delta);

        let min = checked_ratio(low, base_high)?;
        let max = checked_ratio(high, base_low)?;
        Some(MetricRange::new(min, max))
    }
}

impl MetricCalculator for PercentileCalculator {
    fn mean(&self, samples: &[f64]) -> Option<f64> {
        let sorted = sorted_samples(samples)?;
        Some(percentile_of_sorted(&sorted, self.percentile))
    }

    fn variance(&self, samples: &[f64]) -> Option<f64> {
        let (_, logs) = log_samples(samples)?;
        let stddev = Vector::from_slice(&logs).stddev().ok()?;
        Some((stddev as f64).exp())
    }

    fn actual_range(&self, samples: &[f64]) -> Option<MetricRange> {
        self.range(samples, self.actual_delta)
    }

    fn limit_range(&self, samples: &[f64]) -> Option<MetricRange> {
        self.range(samples, self.limit_delta)
    }

    fn relative_mean(&self, samples: &[f64], baseline: &[f64]) -> Option<f64> {
        let value = self.mean(samples)?;
        let base = self.mean(baseline)?;
        checked_ratio(value, base)
    }

    fn relative_variance(&self, samples: &[f64], baseline: &[f64]) -> Option<f64> {
        let (mu_x, var_x) = log_moments(samples)?;
        let (mu_y, var_y) = log_moments(baseline)?;

        let mu_z = mu_x - mu_y;
        let var_z = var_x + var_y;
        let value = (2.0 * mu_z + 2.0 * var_z).exp() - (2.0 * mu_z + var_z).exp();
        Some(value.max(0.0).sqrt())
    }

    fn relative_actual_range(&self, samples: &[f64], baseline: &[f64]) -> Option<MetricRange> {
        self.relative_range(samples, baseline, self.actual_delta)
    }

    fn relative_limit_range(&self, samples: &[f64], baseline: &[f64]) -> Option<MetricRange> {
        self.relative_range(samples, baseline, self.limit_delta)
    }
}

/// Percentile of unsorted samples, `None` for an empty set
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    let sorted = sorted_samples(samples)?;
    Some(percentile_of_sorted(&sorted, p))
}

/// Linear-interpolation percentile over sorted, non-empty data
fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let p = p.clamp(0.0, 100.0);
    let index = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

fn sorted_samples(samples: &[f64]) -> Option<Vec<f64>> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(sorted)
}

fn checked_ratio(value: f64, base: f64) -> Option<f64> {
    if base == 0.0 || !base.is_finite() {
        return None;
    }
    let ratio = value / base;
    ratio.is_finite().then_some(ratio)
}

/// Log-transformed samples, shifted by the first log value
///
/// `trueno::Vector` computes in f32 and its variance is `E[X²] - μ²`. Shifting
/// keeps the values near zero so the subtraction does not eat the spread.
fn log_samples(samples: &[f64]) -> Option<(f64, Vec<f32>)> {
    let logs: Vec<f64> = samples
        .iter()
        .map(|&x| if x <= 0.0 { 0.0 } else { x.ln() })
        .collect();
    let shift = *logs.first()?;
    Some((shift, logs.iter().map(|l| (l - shift) as f32).collect()))
}

/// Mean and variance of the log-transformed samples, about seven significant digits
fn log_moments(samples: &[f64]) -> Option<(f64, f64)> {
    let (shift, logs) = log_samples(samples)?;
    let vector = Vector::from_slice(&logs);
    let mean = vector.mean().ok()?;
    let variance = vector.variance().ok()?;
    Some((shift + mean as f64, (variance as f64).max(0.0)))
}
