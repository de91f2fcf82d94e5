//! Metric kinds and the metric catalog
//!
//! Every metric kind is registered once with an explicit
//! `(calculator, unit scale, relative, primary)` tuple. Kinds are identified
//! by a [`MetricId`] value, which is what every map in the crate is keyed by.

use crate::metrics::calculator::{
    CalculatorError, CalculatorPreset, MetricCalculator, PercentileCalculator,
};
use crate::metrics::units::UnitScale;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stable identifier of a metric kind (also its stored name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lower bound used when a stored limit only declares its upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinPolicy {
    #[default]
    Zero,
    NegativeInfinity,
    SameAsMax,
}

impl MinPolicy {
    /// Default lower bound for a given upper bound
    pub fn default_min(&self, max: f64) -> f64 {
        match self {
            MinPolicy::Zero => 0.0,
            MinPolicy::NegativeInfinity => f64::NEG_INFINITY,
            MinPolicy::SameAsMax => max,
        }
    }
}

/// Errors raised while registering metric kinds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Metric id must not be empty")]
    EmptyId,

    #[error("Metric '{0}' is already registered")]
    Duplicate(MetricId),

    #[error("Metric '{new}' cannot be primary: '{existing}' is already the primary metric")]
    SecondPrimary { existing: MetricId, new: MetricId },

    #[error("Primary metric '{0}' must be relative to the baseline")]
    PrimaryNotRelative(MetricId),

    #[error("Metric '{id}' has an invalid calculator: {source}")]
    Calculator {
        id: MetricId,
        #[source]
        source: CalculatorError,
    },
}

/// Registration tuple for one metric kind
#[derive(Debug, Clone)]
pub struct MetricRegistration {
    pub id: MetricId,
    pub display_name: Option<String>,
    pub is_primary: bool,
    pub is_relative: bool,
    pub min_policy: MinPolicy,
    pub preset: CalculatorPreset,
    pub units: UnitScale,
    /// Measurement series the metric is computed from (defaults to `id`)
    pub sample_source: Option<String>,
}

impl MetricRegistration {
    /// Absolute, non-primary metric with no units
    pub fn new(id: impl Into<String>, preset: CalculatorPreset) -> Self {
        Self {
            id: MetricId::new(id),
            display_name: None,
            is_primary: false,
            is_relative: false,
            min_policy: MinPolicy::Zero,
            preset,
            units: UnitScale::none(),
            sample_source: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn relative(mut self) -> Self {
        self.is_relative = true;
        self
    }

    pub fn with_units(mut self, units: UnitScale) -> Self {
        self.units = units;
        self
    }

    pub fn with_min_policy(mut self, policy: MinPolicy) -> Self {
        self.min_policy = policy;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_sample_source(mut self, series: impl Into<String>) -> Self {
        self.sample_source = Some(series.into());
        self
    }
}

/// A registered metric kind
#[derive(Debug)]
pub struct MetricDescriptor {
    pub id: MetricId,
    pub display_name: String,
    pub is_primary: bool,
    pub is_relative: bool,
    pub min_policy: MinPolicy,
    pub units: UnitScale,
    pub sample_source: String,
    calculator: Box<dyn MetricCalculator>,
}

impl MetricDescriptor {
    /// Calculator bound to this metric
    pub fn calculator(&self) -> &dyn MetricCalculator {
        self.calculator.as_ref()
    }

    /// Relative metrics never apply to the baseline itself
    pub fn applies_to(&self, is_baseline: bool) -> bool {
        !(self.is_relative && is_baseline)
    }

    /// True when stored values must carry a unit name
    pub fn requires_unit(&self) -> bool {
        !self.units.is_empty()
    }
}

impl PartialEq for MetricDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MetricDescriptor {}

/// Registry of metric kinds, in registration order
#[derive(Debug, Default)]
pub struct MetricCatalog {
    descriptors: Vec<Arc<MetricDescriptor>>,
    by_id: HashMap<MetricId, usize>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in metric kinds
    ///
    /// - `TimeRatio`: primary, time relative to the baseline, p95
    /// - `Time`: absolute elapsed time in nanoseconds, p95
    /// - `GcAllocations`: allocated bytes per operation, median window
    /// - `Gen0Collections`: collection count, p85
    pub fn standard() -> Self {
        let registrations = vec![
            MetricRegistration::new("TimeRatio", CalculatorPreset::P95)
                .primary()
                .relative()
                .with_sample_source("Time")
                .with_display_name("Time ratio"),
            MetricRegistration::new("Time", CalculatorPreset::P95)
                .with_units(UnitScale::time()),
            MetricRegistration::new("GcAllocations", CalculatorPreset::Tight)
                .with_units(UnitScale::binary_size()),
            MetricRegistration::new("Gen0Collections", CalculatorPreset::P85),
        ];

        let mut catalog = Self::new();
        for registration in registrations {
            // Built-in registrations are known to be valid
            if let Err(e) = catalog.register(registration) {
                tracing::error!("Built-in metric registration failed: {}", e);
            }
        }
        catalog
    }

    /// Register a metric kind
    pub fn register(
        &mut self,
        registration: MetricRegistration,
    ) -> Result<Arc<MetricDescriptor>, CatalogError> {
        let id = registration.id.clone();
        if id.as_str().trim().is_empty() {
            return Err(CatalogError::EmptyId);
        }
        if self.by_id.contains_key(&id) {
            return Err(CatalogError::Duplicate(id));
        }
        if registration.is_primary {
            if let Some(existing) = self.primary() {
                return Err(CatalogError::SecondPrimary {
                    existing: existing.id.clone(),
                    new: id,
                });
            }
            if !registration.is_relative {
                return Err(CatalogError::PrimaryNotRelative(id));
            }
        }

        let calculator = PercentileCalculator::new(registration.preset).map_err(|source| {
            CatalogError::Calculator {
                id: id.clone(),
                source,
            }
        })?;

        let display_name = registration
            .display_name
            .unwrap_or_else(|| default_display_name(id.as_str()));
        let sample_source = registration
            .sample_source
            .unwrap_or_else(|| id.as_str().to_string());

        let descriptor = Arc::new(MetricDescriptor {
            id: id.clone(),
            display_name,
            is_primary: registration.is_primary,
            is_relative: registration.is_relative,
            min_policy: registration.min_policy,
            units: registration.units,
            sample_source,
            calculator: Box::new(calculator),
        });

        tracing::debug!("Registered metric {}", id);
        self.by_id.insert(id, self.descriptors.len());
        self.descriptors.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    pub fn get(&self, id: &MetricId) -> Option<&Arc<MetricDescriptor>> {
        self.by_id.get(id).map(|&i| &self.descriptors[i])
    }

    /// Lookup by stored name
    pub fn by_name(&self, name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.get(&MetricId::new(name))
    }

    /// The primary metric, if registered
    pub fn primary(&self) -> Option<&Arc<MetricDescriptor>> {
        self.descriptors.iter().find(|d| d.is_primary)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MetricDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Id with a conventional `Metric` / `Attribute` suffix stripped
fn default_display_name(id: &str) -> String {
    for suffix in ["Attribute", "Metric"] {
        if let Some(stripped) = id.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    id.to_string()
}
