//! Competition discovery through declarative benchmark metadata
//!
//! The metadata reader itself lives outside this crate; it is consulted only
//! to find out which methods take part in a competition, which one is the
//! baseline, and where the limits of the competition are stored.

use crate::target::TargetKey;
use std::collections::HashMap;
use thiserror::Error;

/// Metadata attached to a benchmark method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkAttribute {
    /// Method takes part in the competition
    Competitor,
    /// Method is the baseline all relative metrics are computed against
    Baseline,
    /// Method is measured but excluded from limit checks
    DoesNotCompete,
    /// Name of the limits resource declared on the method
    LimitsResource(String),
}

/// Opaque key→attributes reader
pub trait MetadataSource {
    /// Attributes declared on `method`; `inherit` includes declarations from
    /// enclosing containers
    fn attributes(&self, method: &TargetKey, inherit: bool) -> Vec<BenchmarkAttribute>;
}

/// In-memory metadata, used by the replay CLI and tests
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    methods: HashMap<TargetKey, Vec<BenchmarkAttribute>>,
    inherited: HashMap<String, Vec<BenchmarkAttribute>>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare attributes on a method
    pub fn with_method(mut self, method: TargetKey, attributes: Vec<BenchmarkAttribute>) -> Self {
        self.methods.entry(method).or_default().extend(attributes);
        self
    }

    /// Declare attributes on a type; visible to its methods when inheriting
    pub fn with_type(mut self, type_name: impl Into<String>, attributes: Vec<BenchmarkAttribute>) -> Self {
        self.inherited
            .entry(type_name.into())
            .or_default()
            .extend(attributes);
        self
    }
}

impl MetadataSource for StaticMetadata {
    fn attributes(&self, method: &TargetKey, inherit: bool) -> Vec<BenchmarkAttribute> {
        let mut attributes = self.methods.get(method).cloned().unwrap_or_default();
        if inherit {
            if let Some(inherited) = self.inherited.get(&method.type_name) {
                attributes.extend(inherited.iter().cloned());
            }
        }
        attributes
    }
}

/// Errors raised while building a benchmark set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkSetError {
    #[error("Competition '{0}' has no competing methods")]
    NoCompetitors(String),

    #[error("Competition '{0}' has no baseline method")]
    NoBaseline(String),

    #[error("Competition '{competition}' has several baselines: {methods:?}")]
    SeveralBaselines {
        competition: String,
        methods: Vec<String>,
    },
}

/// One method taking part in a competition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkMethod {
    pub key: TargetKey,
    pub is_baseline: bool,
}

/// All methods of one competition plus where their limits live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkSet {
    pub competition_id: String,
    pub methods: Vec<BenchmarkMethod>,
    /// Resolved limits resource name, if any was declared
    pub limits_resource: Option<String>,
}

impl BenchmarkSet {
    /// Build a set from metadata
    ///
    /// `containers` holds the limits resource declared on each enclosing
    /// container, ordered outermost to innermost; the innermost declaration
    /// wins. A resource declared on a method overrides all containers.
    pub fn discover(
        competition_id: impl Into<String>,
        candidates: &[TargetKey],
        containers: &[Option<String>],
        source: &dyn MetadataSource,
    ) -> Result<Self, BenchmarkSetError> {
        let competition_id = competition_id.into();
        let mut methods = Vec::new();
        let mut method_resource = None;

        for key in candidates {
            let attributes = source.attributes(key, true);
            if attributes.contains(&BenchmarkAttribute::DoesNotCompete) {
                tracing::debug!("{} does not compete, skipped", key);
                continue;
            }

            let is_baseline = attributes.contains(&BenchmarkAttribute::Baseline);
            if !is_baseline && !attributes.contains(&BenchmarkAttribute::Competitor) {
                continue;
            }

            for attribute in &attributes {
                if let BenchmarkAttribute::LimitsResource(name) = attribute {
                    method_resource.get_or_insert_with(|| name.clone());
                }
            }

            methods.push(BenchmarkMethod {
                key: key.clone(),
                is_baseline,
            });
        }

        if methods.is_empty() {
            return Err(BenchmarkSetError::NoCompetitors(competition_id));
        }

        let baselines: Vec<String> = methods
            .iter()
            .filter(|m| m.is_baseline)
            .map(|m| m.key.to_string())
            .collect();
        match baselines.len() {
            0 => return Err(BenchmarkSetError::NoBaseline(competition_id)),
            1 => {}
            _ => {
                return Err(BenchmarkSetError::SeveralBaselines {
                    competition: competition_id,
                    methods: baselines,
                })
            }
        }

        let limits_resource =
            method_resource.or_else(|| containers.iter().rev().flatten().next().cloned());

        Ok(Self {
            competition_id,
            methods,
            limits_resource,
        })
    }

    /// The baseline method
    pub fn baseline(&self) -> Option<&BenchmarkMethod> {
        self.methods.iter().find(|m| m.is_baseline)
    }
}
