// Stored limits: wire model, physical resources, parsing and the store seam

pub mod document;
pub mod parse;
pub mod resource;
pub mod store;

pub use document::{
    CandidateEntry, CompetitionEntry, DocumentError, LimitsDocument, MetricEntry, StoredLimit,
    ValueEntry,
};
pub use parse::{targets_from_document, ParseOptions, ParseOutcome};
pub use resource::{checksum, ResourceError, ResourceLocator, ResourceOrigin, ResourceSnapshot};
pub use store::{
    DocumentFormat, DocumentLimitsStore, JsonFormat, JsonLimitsStore, LimitsStore, TomlFormat,
    TomlLimitsStore,
};
