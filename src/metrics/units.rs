//! Display units for metric values
//!
//! A `UnitScale` is an ordered set of units. Each unit applies from a threshold
//! upward, so picking a unit for a range is a static interval lookup: the unit
//! with the greatest threshold not above the range magnitude wins, and the
//! lowest unit also covers everything below its own threshold.

use crate::metrics::range::MetricRange;
use std::fmt;
use thiserror::Error;

/// Errors raised while building a unit scale
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitScaleError {
    #[error("Unit '{name}' has invalid threshold {threshold} (must be finite and >= 0)")]
    InvalidThreshold { name: String, threshold: f64 },

    #[error("Unit '{name}' has invalid scale coefficient {coefficient}")]
    InvalidCoefficient { name: String, coefficient: f64 },

    #[error("Duplicate unit name '{0}'")]
    DuplicateName(String),
}

/// A single display unit
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUnit {
    /// Unit suffix used in reports and stored documents (empty for unitless values)
    pub name: String,

    /// Raw values are divided by this coefficient for display
    pub coefficient: f64,

    /// Raw magnitude from which this unit is preferred
    pub applies_from: f64,

    /// Decimal digits kept when values are shown in this unit
    pub rounding_digits: Option<u32>,
}

impl MetricUnit {
    /// Create a unit
    pub fn new(name: impl Into<String>, coefficient: f64, applies_from: f64) -> Self {
        Self {
            name: name.into(),
            coefficient,
            applies_from,
            rounding_digits: None,
        }
    }

    /// Set the display rounding hint
    pub fn with_rounding_digits(mut self, digits: u32) -> Self {
        self.rounding_digits = Some(digits);
        self
    }

    /// The synthetic unit used by metrics without a scale
    pub fn empty() -> Self {
        Self::new("", 1.0, 0.0)
    }

    /// True for the synthetic unit
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Convert a raw value into this unit
    pub fn to_display(&self, raw: f64) -> f64 {
        raw / self.coefficient
    }

    /// Convert a value expressed in this unit back to raw
    pub fn from_display(&self, value: f64) -> f64 {
        value * self.coefficient
    }
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered set of units for one metric kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitScale {
    units: Vec<MetricUnit>,
}

impl UnitScale {
    /// Build a scale, sorting units by ascending threshold
    pub fn new(units: Vec<MetricUnit>) -> Result<Self, UnitScaleError> {
        let mut units = units;
        for (i, unit) in units.iter().enumerate() {
            if !unit.applies_from.is_finite() || unit.applies_from < 0.0 {
                return Err(UnitScaleError::InvalidThreshold {
                    name: unit.name.clone(),
                    threshold: unit.applies_from,
                });
            }
            if !unit.coefficient.is_finite() || unit.coefficient <= 0.0 {
                return Err(UnitScaleError::InvalidCoefficient {
                    name: unit.name.clone(),
                    coefficient: unit.coefficient,
                });
            }
            if units[..i].iter().any(|u| u.name == unit.name) {
                return Err(UnitScaleError::DuplicateName(unit.name.clone()));
            }
        }

        // Stable sort: equal thresholds keep declaration order
        units.sort_by(|a, b| a.applies_from.total_cmp(&b.applies_from));
        Ok(Self { units })
    }

    /// Scale without units (ratios, plain counts)
    pub fn none() -> Self {
        Self::default()
    }

    /// Durations measured in nanoseconds
    pub fn time() -> Self {
        Self {
            units: vec![
                MetricUnit::new("ns", 1.0, 0.0).with_rounding_digits(1),
                MetricUnit::new("μs", 1e3, 1e3).with_rounding_digits(2),
                MetricUnit::new("ms", 1e6, 1e6).with_rounding_digits(2),
                MetricUnit::new("s", 1e9, 1e9).with_rounding_digits(3),
                MetricUnit::new("min", 6e10, 6e10).with_rounding_digits(3),
            ],
        }
    }

    /// Sizes measured in bytes
    pub fn binary_size() -> Self {
        const KB: f64 = 1024.0;
        Self {
            units: vec![
                MetricUnit::new("B", 1.0, 0.0).with_rounding_digits(0),
                MetricUnit::new("KB", KB, KB).with_rounding_digits(2),
                MetricUnit::new("MB", KB * KB, KB * KB).with_rounding_digits(2),
                MetricUnit::new("GB", KB * KB * KB, KB * KB * KB).with_rounding_digits(2),
            ],
        }
    }

    /// True when the scale declares no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in ascending threshold order
    pub fn units(&self) -> &[MetricUnit] {
        &self.units
    }

    /// Resolve a stored unit name
    pub fn by_name(&self, name: &str) -> Option<&MetricUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Best unit for a single raw value
    pub fn select_value(&self, value: f64) -> MetricUnit {
        if value.is_finite() {
            self.select_magnitude(value.abs())
        } else {
            self.lowest()
        }
    }

    /// Best unit for a range
    ///
    /// Uses the smaller magnitude of the finite bounds so that both ends stay
    /// readable in the chosen unit.
    pub fn select(&self, range: &MetricRange) -> MetricUnit {
        let magnitude = [range.min, range.max]
            .into_iter()
            .filter(|v| v.is_finite())
            .map(f64::abs)
            .reduce(f64::min);

        match magnitude {
            Some(m) => self.select_magnitude(m),
            None => self.lowest(),
        }
    }

    fn select_magnitude(&self, magnitude: f64) -> MetricUnit {
        // Sorted ascending: the last unit whose threshold is <= magnitude.
        // Ties resolve to the first declared unit for that threshold.
        let idx = self.units.partition_point(|u| u.applies_from <= magnitude);
        if idx == 0 {
            return self.lowest();
        }
        let threshold = self.units[idx - 1].applies_from;
        let first_tied = self.units.partition_point(|u| u.applies_from < threshold);
        self.units[first_tied].clone()
    }

    fn lowest(&self) -> MetricUnit {
        self.units.first().cloned().unwrap_or_else(MetricUnit::empty)
    }
}
