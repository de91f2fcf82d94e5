//! Benchmark targets and their per-metric limit state
//!
//! A [`MetricValue`] is only ever changed through the union operation:
//! checking mode answers "is the candidate inside the stored limits?" without
//! touching anything, adjustment mode widens the stored limits to cover the
//! candidate and records whether anything changed.

use crate::metrics::{format_in_unit, MetricDescriptor, MetricId, MetricRange, MetricUnit};
use std::fmt;
use std::sync::Arc;

/// Identity of a benchmarked method: declaring type + method name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub type_name: String,
    pub method_name: String,
}

impl TargetKey {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method_name)
    }
}

/// Stored limits of one metric for one target
#[derive(Debug, Clone)]
pub struct MetricValue {
    pub descriptor: Arc<MetricDescriptor>,
    pub range: MetricRange,
    pub unit: MetricUnit,
    pub dirty: bool,
}

impl MetricValue {
    /// Value with no stored limits yet
    pub fn unset(descriptor: Arc<MetricDescriptor>) -> Self {
        let unit = descriptor.units.select(&MetricRange::unset());
        Self {
            descriptor,
            range: MetricRange::unset(),
            unit,
            dirty: false,
        }
    }

    /// Value loaded from storage; the display unit is picked from the range
    /// unless the stored unit is given
    pub fn stored(
        descriptor: Arc<MetricDescriptor>,
        range: MetricRange,
        unit: Option<MetricUnit>,
    ) -> Self {
        let unit = unit.unwrap_or_else(|| descriptor.units.select(&range));
        Self {
            descriptor,
            range,
            unit,
            dirty: false,
        }
    }

    pub fn metric(&self) -> &MetricId {
        &self.descriptor.id
    }

    fn digits_for(&self, unit: &MetricUnit, default_digits: u32) -> u32 {
        unit.rounding_digits.unwrap_or(default_digits)
    }

    /// Unit used for comparisons: the stored one, or the candidate's when
    /// nothing is stored yet
    fn comparison_unit(&self, candidate: &MetricRange) -> MetricUnit {
        if self.range.is_unset() {
            self.descriptor.units.select(candidate)
        } else {
            self.unit.clone()
        }
    }

    /// Whether `candidate` lies within the stored range, after rounding both
    /// to the display resolution. Never mutates.
    pub fn check(&self, candidate: &MetricRange, default_digits: u32) -> bool {
        let unit = self.comparison_unit(candidate);
        let digits = self.digits_for(&unit, default_digits);
        self.range.contains_rounded(candidate, &unit, digits)
    }

    /// Widen the stored range to cover `candidate`; returns whether it changed
    pub fn adjust(&mut self, candidate: &MetricRange, default_digits: u32) -> bool {
        if candidate.is_unset() {
            return false;
        }

        let widened = self.range.union(candidate);
        let unit = self.descriptor.units.select(&widened);
        let digits = self.digits_for(&unit, default_digits);
        let widened = widened.round_outward(&unit, digits);

        if widened.same_as(&self.range) {
            return false;
        }

        tracing::debug!(
            "Adjusted {} limits {} -> {}",
            self.descriptor.id,
            self.range,
            widened
        );
        self.range = widened;
        self.unit = unit;
        self.dirty = true;
        true
    }

    /// Union entry point
    ///
    /// Checking mode returns containment. Adjustment mode widens the stored
    /// range and returns `true` (the stored range now covers the candidate).
    pub fn union_with(
        &mut self,
        candidate: &MetricRange,
        is_checking_only: bool,
        default_digits: u32,
    ) -> bool {
        if is_checking_only {
            self.check(candidate, default_digits)
        } else {
            self.adjust(candidate, default_digits);
            true
        }
    }

    /// Clear the dirty flag once persisted
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Stored range formatted in its display unit
    pub fn display_range(&self, default_digits: u32) -> String {
        let digits = self.digits_for(&self.unit, default_digits);
        format_in_unit(&self.range, &self.unit, digits)
    }
}

/// One benchmarked method with its per-metric state
#[derive(Debug, Clone)]
pub struct Target {
    pub key: TargetKey,
    pub is_baseline: bool,
    /// Limits resource this target is persisted to
    pub resource: Option<String>,
    pub values: Vec<MetricValue>,
}

impl Target {
    pub fn new(key: TargetKey, is_baseline: bool) -> Self {
        Self {
            key,
            is_baseline,
            resource: None,
            values: Vec::new(),
        }
    }

    pub fn value(&self, metric: &MetricId) -> Option<&MetricValue> {
        self.values.iter().find(|v| v.metric() == metric)
    }

    pub fn value_mut(&mut self, metric: &MetricId) -> Option<&mut MetricValue> {
        self.values.iter_mut().find(|v| v.metric() == metric)
    }

    pub fn is_dirty(&self) -> bool {
        self.values.iter().any(|v| v.dirty)
    }

    pub fn mark_saved(&mut self) {
        for value in &mut self.values {
            value.mark_saved();
        }
    }
}
