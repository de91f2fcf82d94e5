//! Metric value ranges
//!
//! Three "empty-ish" states are kept apart:
//! - unset: both bounds NaN, no opinion yet (adjustment may fill it)
//! - one-sided: a bound is infinite, that side is ignored
//! - degenerate: `min == max`, an exact match

use crate::metrics::units::MetricUnit;
use std::fmt;

/// Closed `[min, max]` interval over raw metric values
#[derive(Debug, Clone, Copy)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    /// Create a range; a `min` above `max` collapses onto `max`
    pub fn new(min: f64, max: f64) -> Self {
        if min > max {
            Self { min: max, max }
        } else {
            Self { min, max }
        }
    }

    /// The "no opinion yet" range
    pub const fn unset() -> Self {
        Self {
            min: f64::NAN,
            max: f64::NAN,
        }
    }

    /// Exact-value range
    pub const fn exact(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Both bounds unset
    pub fn is_unset(&self) -> bool {
        self.min.is_nan() && self.max.is_nan()
    }

    /// At least one bound is infinite
    pub fn is_one_sided(&self) -> bool {
        self.min.is_infinite() || self.max.is_infinite()
    }

    /// Exact match range
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// Smallest range covering both operands
    ///
    /// NaN bounds are absorbed by the other operand (`f64::min`/`f64::max`
    /// ignore NaN), so widening an unset range yields the candidate.
    pub fn union(&self, other: &MetricRange) -> MetricRange {
        MetricRange::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Containment without rounding, see [`MetricRange::contains_rounded`]
    pub fn contains(&self, other: &MetricRange) -> bool {
        contains_bounds(self.min, self.max, other.min, other.max)
    }

    /// Containment after rounding both ranges to `digits` decimals of `unit`
    ///
    /// A fully unset range only contains another unset range. A single NaN
    /// side places no constraint, and an infinite bound is always satisfied.
    pub fn contains_rounded(&self, other: &MetricRange, unit: &MetricUnit, digits: u32) -> bool {
        let round = |v: f64| round_in_unit(v, unit, digits);
        contains_bounds(
            round(self.min),
            round(self.max),
            round(other.min),
            round(other.max),
        )
    }

    /// Round outward to the resolution of `unit`, so the result contains `self`
    pub fn round_outward(&self, unit: &MetricUnit, digits: u32) -> MetricRange {
        // Absorbs representation error such as 1.3 * 100 = 130.00000000000003
        const EPSILON: f64 = 1e-9;
        let factor = 10f64.powi(digits as i32);
        let floor = |v: f64| {
            if v.is_finite() {
                unit.from_display((unit.to_display(v) * factor + EPSILON).floor() / factor)
            } else {
                v
            }
        };
        let ceil = |v: f64| {
            if v.is_finite() {
                unit.from_display((unit.to_display(v) * factor - EPSILON).ceil() / factor)
            } else {
                v
            }
        };
        MetricRange::new(floor(self.min).min(self.min), ceil(self.max).max(self.max))
    }

    /// Bitwise-stable equality, NaN equals NaN
    pub fn same_as(&self, other: &MetricRange) -> bool {
        same_bound(self.min, other.min) && same_bound(self.max, other.max)
    }
}

impl PartialEq for MetricRange {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Default for MetricRange {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for MetricRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            return f.write_str("[empty]");
        }
        write!(f, "[{}..{}]", format_bound(self.min), format_bound(self.max))
    }
}

/// Value converted to `unit` and rounded to `digits` decimals
pub fn round_in_unit(value: f64, unit: &MetricUnit, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits as i32);
    (unit.to_display(value) * factor).round() / factor
}

/// Render a range in a unit for messages, e.g. `[1.20..3.00] ms`
pub fn format_in_unit(range: &MetricRange, unit: &MetricUnit, digits: u32) -> String {
    if range.is_unset() {
        return "[empty]".to_string();
    }
    let show = |v: f64| {
        if v.is_finite() {
            format!("{:.*}", digits as usize, unit.to_display(v))
        } else {
            format_bound(v)
        }
    };
    let text = format!("[{}..{}]", show(range.min), show(range.max));
    if unit.is_empty() {
        text
    } else {
        format!("{} {}", text, unit.name)
    }
}

fn format_bound(v: f64) -> String {
    if v.is_nan() {
        "?".to_string()
    } else if v == f64::INFINITY {
        "+∞".to_string()
    } else if v == f64::NEG_INFINITY {
        "-∞".to_string()
    } else {
        v.to_string()
    }
}

fn same_bound(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits() || a == b
}

fn contains_bounds(outer_min: f64, outer_max: f64, inner_min: f64, inner_max: f64) -> bool {
    let outer_unset = outer_min.is_nan() && outer_max.is_nan();
    let inner_unset = inner_min.is_nan() && inner_max.is_nan();
    if outer_unset {
        return inner_unset;
    }
    if inner_unset {
        return true;
    }

    let min_ok = outer_min.is_nan()
        || outer_min == f64::NEG_INFINITY
        || (!inner_min.is_nan() && outer_min <= inner_min);
    let max_ok = outer_max.is_nan()
        || outer_max == f64::INFINITY
        || (!inner_max.is_nan() && inner_max <= outer_max);
    min_ok && max_ok
}
