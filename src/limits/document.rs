// Persisted limits wire model
//
// One root container holding competition groupings (by type name), each with
// candidate entries (by method name). A candidate carries, per metric kind,
// either the legacy `MinRatio`/`MaxRatio` pair (primary metric only) or a
// structured entry keyed by the metric's stored name whose child values each
// have a required `Value` and an optional `Type` (`Min`, `Max`, `Unit`).
//
// Values are kept as the strings found in the document so that a document
// re-rendered without changes is byte-identical to what was read.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse and render errors for limits documents
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse limits document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse limits document: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to render limits document: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error("{path}: entry has no Value")]
    MissingValue { path: String },

    #[error("{path}: '{value}' is not a number")]
    InvalidNumber { path: String, value: String },

    #[error("{path}: unknown value type '{kind}' (expected Min, Max or Unit)")]
    UnknownValueType { path: String, kind: String },
}

/// Root container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsDocument {
    #[serde(default)]
    pub competitions: Vec<CompetitionEntry>,
}

/// One competition grouping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitionEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub candidates: Vec<CandidateEntry>,
}

/// Stored limits of one method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    #[serde(rename = "method")]
    pub method_name: String,
    #[serde(rename = "MinRatio", default, skip_serializing_if = "Option::is_none")]
    pub min_ratio: Option<String>,
    #[serde(rename = "MaxRatio", default, skip_serializing_if = "Option::is_none")]
    pub max_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricEntry>,
}

/// Structured entry for one metric kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    #[serde(default)]
    pub values: Vec<ValueEntry>,
}

/// A single stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueEntry {
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ValueEntry {
    pub fn new(value: impl Into<String>, kind: Option<&str>) -> Self {
        Self {
            value: Some(value.into()),
            kind: kind.map(str::to_string),
        }
    }
}

/// Decoded content of a metric entry, values still in the stored unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredLimit {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: Option<String>,
}

impl MetricEntry {
    /// Decode child values; `path` names the entry in error messages
    pub fn decode(&self, path: &str) -> Result<StoredLimit, DocumentError> {
        let mut limit = StoredLimit::default();
        for value in &self.values {
            let raw = value.value.as_deref().ok_or_else(|| DocumentError::MissingValue {
                path: path.to_string(),
            })?;
            match value.kind.as_deref() {
                None => {
                    let v = parse_number(path, raw)?;
                    limit.min = Some(v);
                    limit.max = Some(v);
                }
                Some("Min") => limit.min = Some(parse_number(path, raw)?),
                Some("Max") => limit.max = Some(parse_number(path, raw)?),
                Some("Unit") => limit.unit = Some(raw.to_string()),
                Some(other) => {
                    return Err(DocumentError::UnknownValueType {
                        path: path.to_string(),
                        kind: other.to_string(),
                    })
                }
            }
        }
        Ok(limit)
    }

    /// Encode a limit; `None` bounds are omitted
    pub fn encode(name: &str, limit: &StoredLimit) -> Self {
        let mut values = Vec::new();
        match (limit.min, limit.max) {
            (Some(min), Some(max)) if min == max => {
                values.push(ValueEntry::new(format_number(min), None));
            }
            (min, max) => {
                if let Some(min) = min {
                    values.push(ValueEntry::new(format_number(min), Some("Min")));
                }
                if let Some(max) = max {
                    values.push(ValueEntry::new(format_number(max), Some("Max")));
                }
            }
        }
        if let Some(unit) = &limit.unit {
            values.push(ValueEntry::new(unit.clone(), Some("Unit")));
        }
        Self {
            name: name.to_string(),
            values,
        }
    }
}

impl CandidateEntry {
    /// Decode the legacy ratio pair, if present
    pub fn legacy_limit(&self, path: &str) -> Result<Option<StoredLimit>, DocumentError> {
        if self.min_ratio.is_none() && self.max_ratio.is_none() {
            return Ok(None);
        }
        let min = self
            .min_ratio
            .as_deref()
            .map(|v| parse_number(path, v))
            .transpose()?;
        let max = self
            .max_ratio
            .as_deref()
            .map(|v| parse_number(path, v))
            .transpose()?;
        Ok(Some(StoredLimit {
            min,
            max,
            unit: None,
        }))
    }
}

impl LimitsDocument {
    pub fn competition(&self, type_name: &str) -> Option<&CompetitionEntry> {
        self.competitions.iter().find(|c| c.type_name == type_name)
    }

    /// Candidate entry, created at the end of the document when missing
    pub fn candidate_mut(&mut self, type_name: &str, method_name: &str) -> &mut CandidateEntry {
        let c_idx = match self
            .competitions
            .iter()
            .position(|c| c.type_name == type_name)
        {
            Some(i) => i,
            None => {
                self.competitions.push(CompetitionEntry {
                    type_name: type_name.to_string(),
                    candidates: Vec::new(),
                });
                self.competitions.len() - 1
            }
        };
        let competition = &mut self.competitions[c_idx];

        let m_idx = match competition
            .candidates
            .iter()
            .position(|m| m.method_name == method_name)
        {
            Some(i) => i,
            None => {
                competition.candidates.push(CandidateEntry {
                    method_name: method_name.to_string(),
                    ..CandidateEntry::default()
                });
                competition.candidates.len() - 1
            }
        };
        &mut competition.candidates[m_idx]
    }
}

impl CompetitionEntry {
    pub fn candidate(&self, method_name: &str) -> Option<&CandidateEntry> {
        self.candidates.iter().find(|c| c.method_name == method_name)
    }
}

/// Parse a stored number; accepts `inf`/`-inf` for one-sided limits
pub fn parse_number(path: &str, raw: &str) -> Result<f64, DocumentError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
        .ok_or_else(|| DocumentError::InvalidNumber {
            path: path.to_string(),
            value: raw.to_string(),
        })
}

/// Shortest representation that parses back to the same value
pub fn format_number(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_min_max_unit() {
        let entry = MetricEntry {
            name: "Time".to_string(),
            values: vec![
                ValueEntry::new("1.5", Some("Min")),
                ValueEntry::new("3", Some("Max")),
                ValueEntry::new("ms", Some("Unit")),
            ],
        };
        let limit = entry.decode("Bar/Foo/Time").unwrap();
        assert_eq!(limit.min, Some(1.5));
        assert_eq!(limit.max, Some(3.0));
        assert_eq!(limit.unit.as_deref(), Some("ms"));
    }

    #[test]
    fn test_decode_untyped_value_is_exact() {
        let entry = MetricEntry {
            name: "Gen0Collections".to_string(),
            values: vec![ValueEntry::new("4", None)],
        };
        let limit = entry.decode("p").unwrap();
        assert_eq!(limit.min, Some(4.0));
        assert_eq!(limit.max, Some(4.0));
    }

    #[test]
    fn test_decode_missing_value_names_path() {
        let entry = MetricEntry {
            name: "Time".to_string(),
            values: vec![ValueEntry {
                value: None,
                kind: Some("Max".to_string()),
            }],
        };
        let err = entry.decode("Bar/Foo/Time").unwrap_err();
        assert_eq!(err.to_string(), "Bar/Foo/Time: entry has no Value");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let entry = MetricEntry {
            name: "Time".to_string(),
            values: vec![ValueEntry::new("1", Some("Median"))],
        };
        assert!(matches!(
            entry.decode("p"),
            Err(DocumentError::UnknownValueType { .. })
        ));
    }

    #[test]
    fn test_infinite_values() {
        assert_eq!(parse_number("p", "-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert!(parse_number("p", "NaN").is_err());
        assert!(parse_number("p", "abc").is_err());
    }

    #[test]
    fn test_encode_degenerate_as_single_value() {
        let entry = MetricEntry::encode(
            "Gen0Collections",
            &StoredLimit {
                min: Some(2.0),
                max: Some(2.0),
                unit: None,
            },
        );
        assert_eq!(entry.values, vec![ValueEntry::new("2", None)]);
    }

    #[test]
    fn test_legacy_limit_one_sided() {
        let candidate = CandidateEntry {
            method_name: "Foo".to_string(),
            max_ratio: Some("2.5".to_string()),
            ..CandidateEntry::default()
        };
        let limit = candidate.legacy_limit("Bar/Foo").unwrap().unwrap();
        assert_eq!(limit.min, None);
        assert_eq!(limit.max, Some(2.5));
    }

    #[test]
    fn test_candidate_mut_creates_entries() {
        let mut doc = LimitsDocument::default();
        doc.candidate_mut("Bar", "Foo").min_ratio = Some("1".to_string());
        doc.candidate_mut("Bar", "Baz");
        assert_eq!(doc.competitions.len(), 1);
        assert_eq!(doc.competitions[0].candidates.len(), 2);
        assert_eq!(
            doc.competition("Bar").unwrap().candidate("Foo").unwrap().min_ratio.as_deref(),
            Some("1")
        );
    }
}
