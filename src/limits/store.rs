//! Limits stores
//!
//! [`LimitsStore`] is the seam between the analysis engine and wherever the
//! limits live. The crate ships one implementation, [`DocumentLimitsStore`],
//! parameterized by the document format: [`JsonLimitsStore`] and
//! [`TomlLimitsStore`] are interchangeable backends over the same model.
//!
//! Every resource is read and parsed at most once per store instance. Saves
//! re-read the physical resource and compare its checksum with the cached
//! snapshot first; a resource changed out of band is never overwritten.

use crate::analysis::AnalysisContext;
use crate::benchmark::BenchmarkSet;
use crate::limits::document::{DocumentError, LimitsDocument, MetricEntry, StoredLimit};
use crate::limits::parse::{targets_from_document, ParseOptions};
use crate::limits::resource::{ResourceError, ResourceLocator, ResourceOrigin};
use crate::messages::MessageSource;
use crate::metrics::{round_in_unit, MetricCatalog};
use crate::target::{MetricValue, Target, TargetKey};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Loads and persists targets
pub trait LimitsStore: Send + Sync {
    /// Targets of every method in `benchmarks`, or `None` after a setup error
    fn try_get_targets(
        &self,
        ctx: &mut AnalysisContext,
        benchmarks: &BenchmarkSet,
        catalog: &MetricCatalog,
    ) -> Option<Vec<Target>>;

    /// Persist dirty targets; returns the keys of the targets saved
    fn try_save_targets(&self, ctx: &mut AnalysisContext, targets: &[Target]) -> Vec<TargetKey>;
}

/// Text encoding of a [`LimitsDocument`]
pub trait DocumentFormat: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, content: &str) -> Result<LimitsDocument, DocumentError>;
    fn render(&self, document: &LimitsDocument) -> Result<String, DocumentError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl DocumentFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, content: &str) -> Result<LimitsDocument, DocumentError> {
        if content.trim().is_empty() {
            return Ok(LimitsDocument::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    fn render(&self, document: &LimitsDocument) -> Result<String, DocumentError> {
        let mut text = serde_json::to_string_pretty(document)?;
        text.push('\n');
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlFormat;

impl DocumentFormat for TomlFormat {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn parse(&self, content: &str) -> Result<LimitsDocument, DocumentError> {
        Ok(toml::from_str(content)?)
    }

    fn render(&self, document: &LimitsDocument) -> Result<String, DocumentError> {
        Ok(toml::to_string_pretty(document)?)
    }
}

/// Parsed resource with the checksum of the bytes it was parsed from
#[derive(Debug, Clone)]
struct CachedDocument {
    origin: ResourceOrigin,
    document: LimitsDocument,
    /// `None` when the resource does not exist yet
    checksum: Option<String>,
}

/// Why a resource could not be loaded
#[derive(Debug)]
enum LoadError {
    Resource(ResourceError),
    Document(ResourceOrigin, DocumentError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Resource(e) => write!(f, "{}", e),
            LoadError::Document(origin, e) => write!(f, "{}: {}", origin.describe(), e),
        }
    }
}

/// Store backed by limits documents
#[derive(Debug)]
pub struct DocumentLimitsStore<F: DocumentFormat> {
    format: F,
    locator: ResourceLocator,
    cache: Mutex<HashMap<String, CachedDocument>>,
}

pub type JsonLimitsStore = DocumentLimitsStore<JsonFormat>;
pub type TomlLimitsStore = DocumentLimitsStore<TomlFormat>;

impl<F: DocumentFormat + Default> DocumentLimitsStore<F> {
    pub fn new(locator: ResourceLocator) -> Self {
        Self::with_format(F::default(), locator)
    }
}

impl<F: DocumentFormat> DocumentLimitsStore<F> {
    pub fn with_format(format: F, locator: ResourceLocator) -> Self {
        Self {
            format,
            locator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedDocument>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached document of `name`, reading it on first use
    fn load_cached(
        &self,
        name: &str,
        create_missing: bool,
        timeout: Option<Duration>,
    ) -> Result<CachedDocument, LoadError> {
        if let Some(cached) = self.cache().get(name) {
            return Ok(cached.clone());
        }

        let loaded = match self.locator.resolve(name) {
            Some(origin) => {
                let snapshot = self
                    .locator
                    .read_within(&origin, timeout)
                    .map_err(LoadError::Resource)?;
                let document = self
                    .format
                    .parse(&snapshot.content)
                    .map_err(|e| LoadError::Document(origin.clone(), e))?;
                tracing::debug!(
                    "Loaded {} limits from {} ({} competitions)",
                    self.format.name(),
                    origin.describe(),
                    document.competitions.len()
                );
                CachedDocument {
                    origin,
                    document,
                    checksum: Some(snapshot.checksum),
                }
            }
            None => {
                let path = self
                    .locator
                    .creation_path(name)
                    .filter(|_| create_missing)
                    .ok_or_else(|| LoadError::Resource(ResourceError::NotFound(name.to_string())))?;
                CachedDocument {
                    origin: ResourceOrigin::File(path),
                    document: LimitsDocument::default(),
                    checksum: None,
                }
            }
        };

        self.cache().insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// Previous-run log; failures degrade to "no previous limits"
    fn load_previous_run(&self, ctx: &mut AnalysisContext, name: &str) -> Option<LimitsDocument> {
        let loaded = self
            .locator
            .load_within(name, ctx.config.previous_run_timeout())
            .map_err(|e| e.to_string())
            .and_then(|snapshot| self.format.parse(&snapshot.content).map_err(|e| e.to_string()));

        match loaded {
            Ok(document) => Some(document),
            Err(e) => {
                ctx.log.warning(
                    MessageSource::Limits,
                    None,
                    format!(
                        "Previous run log '{}' is not available ({}); proceeding without stored limits.",
                        name, e
                    ),
                );
                None
            }
        }
    }

    fn save_resource(
        &self,
        ctx: &mut AnalysisContext,
        name: &str,
        targets: &[&Target],
    ) -> Result<(), String> {
        let cached = self
            .load_cached(name, true, ctx.config.previous_run_timeout())
            .map_err(|e| e.to_string())?;
        if !cached.origin.is_writable() {
            return Err(ResourceError::ReadOnly(cached.origin.describe()).to_string());
        }

        let mut document = cached.document.clone();
        for target in targets {
            apply_target(&mut document, target, ctx.rounding_digits());
        }
        let content = self.format.render(&document).map_err(|e| e.to_string())?;

        let checksum = self
            .locator
            .write_verified(&cached.origin, cached.checksum.as_deref(), &content)
            .map_err(|e| e.to_string())?;

        self.cache().insert(
            name.to_string(),
            CachedDocument {
                origin: cached.origin.clone(),
                document,
                checksum: Some(checksum),
            },
        );
        ctx.log.info(
            MessageSource::Limits,
            None,
            format!(
                "Limits of {} benchmark(s) saved to {}.",
                targets.len(),
                cached.origin.describe()
            ),
        );
        Ok(())
    }
}

impl<F: DocumentFormat> LimitsStore for DocumentLimitsStore<F> {
    fn try_get_targets(
        &self,
        ctx: &mut AnalysisContext,
        benchmarks: &BenchmarkSet,
        catalog: &MetricCatalog,
    ) -> Option<Vec<Target>> {
        let Some(resource) = benchmarks.limits_resource.clone() else {
            ctx.log.setup_error(
                MessageSource::Limits,
                None,
                format!(
                    "Competition '{}' declares no limits resource.",
                    benchmarks.competition_id
                ),
                Some("Declare a limits resource on the competition or one of its containers.".to_string()),
            );
            return None;
        };

        let options = ParseOptions {
            ignore_existing: ctx.config.ignore_existing_limits,
            resource: Some(resource.clone()),
        };

        let document = match ctx.config.previous_run_log.clone() {
            Some(log_name) => self.load_previous_run(ctx, &log_name),
            None => match self.load_cached(
                &resource,
                ctx.config.persist_limits,
                ctx.config.previous_run_timeout(),
            ) {
                Ok(cached) => {
                    if cached.checksum.is_none() {
                        ctx.log.info(
                            MessageSource::Limits,
                            None,
                            format!(
                                "Limits resource '{}' does not exist yet; it will be created on save.",
                                resource
                            ),
                        );
                    }
                    Some(cached.document)
                }
                Err(e) => {
                    ctx.log.setup_error(
                        MessageSource::Limits,
                        None,
                        format!("Could not load limits: {}", e),
                        Some("Check the resource name or enable limits persistence to create it.".to_string()),
                    );
                    return None;
                }
            },
        };

        match targets_from_document(document.as_ref(), benchmarks, catalog, &options, &mut ctx.log) {
            Ok(targets) => Some(targets),
            Err(e) => {
                ctx.log.setup_error(
                    MessageSource::Limits,
                    None,
                    format!("Malformed limits document '{}': {}", resource, e),
                    None,
                );
                None
            }
        }
    }

    fn try_save_targets(&self, ctx: &mut AnalysisContext, targets: &[Target]) -> Vec<TargetKey> {
        let mut by_resource: BTreeMap<&str, Vec<&Target>> = BTreeMap::new();
        for target in targets.iter().filter(|t| t.is_dirty()) {
            match target.resource.as_deref() {
                Some(resource) => by_resource.entry(resource).or_default().push(target),
                None => ctx.log.warning(
                    MessageSource::Limits,
                    Some(&target.key),
                    "Adjusted limits have no resource to be saved to.",
                ),
            }
        }

        let mut saved = Vec::new();
        for (resource, group) in by_resource {
            match self.save_resource(ctx, resource, &group) {
                Ok(()) => saved.extend(group.iter().map(|t| t.key.clone())),
                Err(e) => ctx.log.setup_error(
                    MessageSource::Limits,
                    None,
                    format!("Could not save limits to '{}': {}", resource, e),
                    Some("Rerun the competition to pick up the current limits.".to_string()),
                ),
            }
        }
        saved
    }
}

/// Write the dirty values of `target` into `document`
fn apply_target(document: &mut LimitsDocument, target: &Target, default_digits: u32) {
    let candidate = document.candidate_mut(&target.key.type_name, &target.key.method_name);

    for value in target.values.iter().filter(|v| v.dirty) {
        let descriptor = &value.descriptor;
        if descriptor.is_primary {
            candidate.min_ratio = None;
            candidate.max_ratio = None;
        }

        let entry = MetricEntry::encode(descriptor.id.as_str(), &stored_limit(value, default_digits));
        let name = descriptor.id.as_str();
        match candidate.metrics.iter().position(|m| m.name == name) {
            Some(first) => {
                candidate.metrics[first] = entry;
                let mut index = 0;
                candidate.metrics.retain(|m| {
                    let keep = index <= first || m.name != name;
                    index += 1;
                    keep
                });
            }
            None => candidate.metrics.push(entry),
        }
    }
}

/// Stored form of a value: display unit, policy-default min omitted
fn stored_limit(value: &MetricValue, default_digits: u32) -> StoredLimit {
    let unit = &value.unit;
    let digits = unit.rounding_digits.unwrap_or(default_digits);
    let range = value.range;

    let max = round_in_unit(range.max, unit, digits);
    let min = if range.min == value.descriptor.min_policy.default_min(range.max) {
        None
    } else {
        Some(round_in_unit(range.min, unit, digits))
    };

    StoredLimit {
        min,
        max: Some(max),
        unit: value
            .descriptor
            .requires_unit()
            .then(|| unit.name.clone()),
    }
}
