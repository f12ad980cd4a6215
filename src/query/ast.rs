//! Request model and selector AST
//!
//! # Overview
//!
//! - [`LabelSelector`] / [`SelectorTerm`] / [`MatchOp`]: parsed label selector
//! - [`AggregationMode`]: how series buckets are folded
//! - Request structs for the five querier operations
//!
//! Selectors are usually parsed from text with [`LabelSelector::parse`], but
//! they can also be built programmatically:
//!
//! ```rust
//! use profile_querier::query::ast::{LabelSelector, MatchOp};
//!
//! let selector = LabelSelector::new()
//!     .with_term("service_name", MatchOp::Eq, "api")
//!     .unwrap()
//!     .with_term("env", MatchOp::MatchRegex, "prod|staging")
//!     .unwrap();
//! assert_eq!(selector.len(), 2);
//! ```

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::query::error::{QueryError, QueryResult};

/// Longest accepted regex pattern
pub const MAX_PATTERN_LEN: usize = 1000;

/// Most terms a selector may carry; each term owns one bit of a 64-bit mask
pub const MAX_TERMS: usize = 64;

// ============================================================================
// Selector
// ============================================================================

/// Label comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `=~`
    MatchRegex,
    /// `!~`
    NotMatchRegex,
}

impl MatchOp {
    /// Operator token
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Eq => "=",
            MatchOp::Neq => "!=",
            MatchOp::MatchRegex => "=~",
            MatchOp::NotMatchRegex => "!~",
        }
    }

    /// True for the regex operators
    pub fn is_regex(&self) -> bool {
        matches!(self, MatchOp::MatchRegex | MatchOp::NotMatchRegex)
    }
}

impl FromStr for MatchOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(MatchOp::Eq),
            "!=" => Ok(MatchOp::Neq),
            "=~" => Ok(MatchOp::MatchRegex),
            "!~" => Ok(MatchOp::NotMatchRegex),
            other => Err(QueryError::invalid_request(format!(
                "unknown selector operator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `label op "value"` term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorTerm {
    /// Label name
    pub label: String,
    /// Operator
    pub op: MatchOp,
    /// Literal value or regex pattern
    pub value: String,
}

impl SelectorTerm {
    /// Build and validate a term
    ///
    /// Label names must be identifiers. Regex patterns are length-limited and
    /// must compile.
    pub fn new(label: impl Into<String>, op: MatchOp, value: impl Into<String>) -> QueryResult<Self> {
        let term = Self {
            label: label.into(),
            op,
            value: value.into(),
        };
        term.validate()?;
        Ok(term)
    }

    /// Validate label name and pattern
    pub fn validate(&self) -> QueryResult<()> {
        validate_label_name(&self.label)?;
        if self.op.is_regex() {
            if self.value.len() > MAX_PATTERN_LEN {
                return Err(QueryError::invalid_request(format!(
                    "regex pattern exceeds maximum length of {} characters",
                    MAX_PATTERN_LEN
                )));
            }
            if let Err(e) = Regex::new(&self.value) {
                return Err(QueryError::invalid_request(format!(
                    "invalid regex pattern '{}': {}",
                    self.value, e
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for SelectorTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.label, self.op, self.value)
    }
}

/// Validate a label name
///
/// Must start with a letter or underscore, then letters, digits, underscores.
pub fn validate_label_name(name: &str) -> QueryResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(QueryError::invalid_request(format!(
            "invalid label name '{}'",
            name
        )));
    }
    Ok(())
}

/// Conjunction of selector terms
///
/// An empty selector matches every series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    /// Terms in source order; order only fixes bit positions
    pub terms: Vec<SelectorTerm>,
}

impl LabelSelector {
    /// Empty selector
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Parse selector text; empty text and `{}` select everything
    pub fn parse(text: &str) -> QueryResult<Self> {
        crate::query::parser::parse_selector(text)
    }

    /// Add a validated term
    pub fn with_term(
        mut self,
        label: impl Into<String>,
        op: MatchOp,
        value: impl Into<String>,
    ) -> QueryResult<Self> {
        self.push(SelectorTerm::new(label, op, value)?)?;
        Ok(self)
    }

    /// Append a term, enforcing the term limit
    pub fn push(&mut self, term: SelectorTerm) -> QueryResult<()> {
        if self.terms.len() >= MAX_TERMS {
            return Err(QueryError::invalid_request(format!(
                "selector has more than {} terms",
                MAX_TERMS
            )));
        }
        self.terms.push(term);
        Ok(())
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True when the selector matches everything
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", term)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// How the values of one time bucket are folded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    /// Sum of sample values
    #[default]
    Sum,
    /// Sum of sample values divided by the sum of their weights
    Average,
}

impl FromStr for AggregationMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" | "time_series_aggregation_type_sum" => Ok(AggregationMode::Sum),
            "average" | "avg" | "time_series_aggregation_type_average" => {
                Ok(AggregationMode::Average)
            },
            other => Err(QueryError::invalid_request(format!(
                "unknown aggregation '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Sum => write!(f, "SUM"),
            AggregationMode::Average => write!(f, "AVERAGE"),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Optional millisecond bounds; zero is treated the same as absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBounds {
    /// Start, epoch milliseconds
    pub start_ms: Option<i64>,
    /// End, epoch milliseconds
    pub end_ms: Option<i64>,
}

impl TimeBounds {
    /// Both bounds given
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self {
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
        }
    }
}

/// Label values lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelValuesRequest {
    /// Label name; required
    pub name: String,
    /// Window
    pub bounds: TimeBounds,
}

/// Stacktrace merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStacktracesRequest {
    /// Five-part profile type id
    pub profile_type_id: String,
    /// Selector text
    pub label_selector: String,
    /// Window
    pub bounds: TimeBounds,
}

/// Time-series selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectSeriesRequest {
    /// Five-part profile type id
    pub profile_type_id: String,
    /// Selector text
    pub label_selector: String,
    /// Labels to group by; empty keeps series identity
    pub group_by: Vec<String>,
    /// Bucket width in seconds; required, must be positive
    pub step_secs: i64,
    /// Bucket fold
    pub aggregation: AggregationMode,
    /// Window
    pub bounds: TimeBounds,
}
