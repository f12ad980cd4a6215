//! Profile type identifiers
//!
//! The wire form is `kind:sampleType:sampleUnit:periodType:periodUnit`, e.g.
//! `process_cpu:cpu:nanoseconds:cpu:nanoseconds`. The store keys series by
//! the three-part `kind:periodType:periodUnit` and keys sample values by
//! `sampleType:sampleUnit`.

use std::fmt;
use std::str::FromStr;

use crate::query::error::{QueryError, QueryResult};
use crate::types::ProfileType;

const SEGMENTS: usize = 5;

/// Parsed five-part profile type identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileTypeId {
    /// Profile kind
    pub kind: String,
    /// Sample type
    pub sample_type: String,
    /// Sample unit
    pub sample_unit: String,
    /// Period type
    pub period_type: String,
    /// Period unit
    pub period_unit: String,
}

impl ProfileTypeId {
    /// Parse the wire form
    ///
    /// Exactly five colon separated, non-empty segments are required.
    pub fn parse(raw: &str) -> QueryResult<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != SEGMENTS || parts.iter().any(|p| p.is_empty()) {
            return Err(QueryError::invalid_request(format!(
                "invalid type id '{}': expected kind:sampleType:sampleUnit:periodType:periodUnit",
                raw
            )));
        }
        Ok(Self {
            kind: parts[0].to_string(),
            sample_type: parts[1].to_string(),
            sample_unit: parts[2].to_string(),
            period_type: parts[3].to_string(),
            period_unit: parts[4].to_string(),
        })
    }

    /// Series key as stored in `type_id` columns
    pub fn type_key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.period_type, self.period_unit)
    }

    /// Sample key as stored in value arrays
    pub fn sample_key(&self) -> String {
        format!("{}:{}", self.sample_type, self.sample_unit)
    }
}

impl fmt::Display for ProfileTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.kind, self.sample_type, self.sample_unit, self.period_type, self.period_unit
        )
    }
}

impl FromStr for ProfileTypeId {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Rebuild a full profile type from a discovery row
///
/// `type_id` is the stored `kind:periodType:periodUnit` key; the sample pair
/// comes from the series' sample type list. The identifier is the first
/// segment, the sample pair, then everything after the first colon verbatim.
/// Period type and unit are the second and third segments, empty if absent.
pub fn reconstruct(type_id: &str, sample_type: &str, sample_unit: &str) -> QueryResult<ProfileType> {
    let (head, rest) = match type_id.split_once(':') {
        Some((head, rest)) if !head.is_empty() => (head, rest),
        _ => {
            return Err(QueryError::store_failure(format!(
                "malformed stored type id '{}'",
                type_id
            )))
        }
    };

    let mut segments = type_id.split(':');
    let name = segments.next().unwrap_or_default();
    let period_type = segments.next().unwrap_or_default();
    let period_unit = segments.next().unwrap_or_default();

    Ok(ProfileType {
        id: format!("{}:{}:{}:{}", head, sample_type, sample_unit, rest),
        name: name.to_string(),
        sample_type: sample_type.to_string(),
        sample_unit: sample_unit.to_string(),
        period_type: period_type.to_string(),
        period_unit: period_unit.to_string(),
    })
}
