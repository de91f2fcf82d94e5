// Metric model: units, ranges, calculators and the metric catalog
//
// Leaves of the crate. Nothing in here knows about stored limits or runs.

pub mod calculator;
pub mod descriptor;
pub mod range;
pub mod units;

pub use calculator::{
    percentile, CalculatorError, CalculatorPreset, MetricCalculator, PercentileCalculator,
};
pub use descriptor::{
    CatalogError, MetricCatalog, MetricDescriptor, MetricId, MetricRegistration, MinPolicy,
};
pub use range::{format_in_unit, round_in_unit, MetricRange};
pub use units::{MetricUnit, UnitScale, UnitScaleError};
