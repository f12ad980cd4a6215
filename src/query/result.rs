//! Result decoding and series assembly
//!
//! Rows arrive as JSON objects keyed by the column aliases of the compiled
//! query. The store may quote 64-bit integers, so every integer decoder
//! accepts either a JSON number or a numeric string. Any row that does not
//! have the expected shape fails the whole request; partial results are
//! never returned.

use serde_json::Value;

use crate::profile_type;
use crate::query::error::{QueryError, QueryResult};
use crate::store::Row;
use crate::types::{
    Fingerprint, FunctionEntry, LabelSet, MergedTree, ProfileType, Series, SeriesPoint, TreeNode,
};

// ============================================================================
// Field decoders
// ============================================================================

fn malformed(column: &str, value: &Value) -> QueryError {
    QueryError::store_failure(format!(
        "malformed value for column '{}': {}",
        column, value
    ))
}

fn field<'a>(row: &'a Row, column: &str) -> QueryResult<&'a Value> {
    row.get(column)
        .ok_or_else(|| QueryError::store_failure(format!("missing column '{}'", column)))
}

/// Decode an unsigned 64-bit integer
pub fn as_u64(value: &Value, column: &str) -> QueryResult<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| malformed(column, value))
}

/// Decode a signed 64-bit integer
pub fn as_i64(value: &Value, column: &str) -> QueryResult<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| malformed(column, value))
}

/// Decode a float; `null` and `nan` become NaN
pub fn as_f64(value: &Value, column: &str) -> QueryResult<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Null => Some(f64::NAN),
        _ => None,
    }
    .ok_or_else(|| malformed(column, value))
}

/// Decode a string
pub fn as_str<'a>(value: &'a Value, column: &str) -> QueryResult<&'a str> {
    value.as_str().ok_or_else(|| malformed(column, value))
}

fn as_array<'a>(value: &'a Value, column: &str) -> QueryResult<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| malformed(column, value))
}

/// Decode an array of `(name, value)` tuples
pub fn as_label_set(value: &Value, column: &str) -> QueryResult<LabelSet> {
    let mut labels = LabelSet::new();
    for pair in as_array(value, column)? {
        match pair.as_array().map(|p| p.as_slice()) {
            Some([name, val]) => labels.add(as_str(name, column)?, as_str(val, column)?),
            _ => return Err(malformed(column, pair)),
        }
    }
    Ok(labels)
}

// ============================================================================
// Series assembly
// ============================================================================

/// One decoded row of a series query
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    /// Output fingerprint (stored or derived)
    pub fingerprint: Fingerprint,
    /// Labels of the group
    pub labels: LabelSet,
    /// Bucket start, epoch milliseconds
    pub timestamp_ms: i64,
    /// Aggregated value
    pub value: f64,
}

impl SeriesRow {
    /// Decode from a store row
    pub fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(Self {
            fingerprint: as_u64(field(row, "fingerprint")?, "fingerprint")?,
            labels: as_label_set(field(row, "labels")?, "labels")?,
            timestamp_ms: as_i64(field(row, "timestamp_ms")?, "timestamp_ms")?,
            value: as_f64(field(row, "value")?, "value")?,
        })
    }
}

/// Streaming, order-dependent series assembler
///
/// A new series starts whenever the fingerprint differs from the previous
/// row's. Input sorted by (fingerprint, timestamp) yields one series per
/// fingerprint with ascending points. Unsorted input is not re-sorted: the
/// same fingerprint appearing in separate runs produces separate series.
#[derive(Debug, Default)]
pub struct SeriesAssembler {
    current: Option<(Fingerprint, Series)>,
    finished: Vec<Series>,
}

impl SeriesAssembler {
    /// Empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one row
    pub fn push(&mut self, row: SeriesRow) {
        let point = SeriesPoint {
            timestamp_ms: row.timestamp_ms,
            value: row.value,
        };
        if let Some((fingerprint, series)) = self.current.as_mut() {
            if *fingerprint == row.fingerprint {
                series.points.push(point);
                return;
            }
        }

        let next = Series {
            labels: row.labels,
            points: vec![point],
        };
        if let Some((_, done)) = self.current.replace((row.fingerprint, next)) {
            self.finished.push(done);
        }
    }

    /// Number of series emitted so far, including the open one
    pub fn len(&self) -> usize {
        self.finished.len() + usize::from(self.current.is_some())
    }

    /// True if no row was pushed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the open series and return all series in emission order
    pub fn finish(mut self) -> Vec<Series> {
        if let Some((_, done)) = self.current.take() {
            self.finished.push(done);
        }
        self.finished
    }
}

/// Decode and assemble series rows
pub fn decode_series(rows: &[Row]) -> QueryResult<Vec<Series>> {
    let mut assembler = SeriesAssembler::new();
    for row in rows {
        assembler.push(SeriesRow::from_row(row)?);
    }
    Ok(assembler.finish())
}

// ============================================================================
// Discovery
// ============================================================================

/// Decode profile type discovery rows
pub fn decode_profile_types(rows: &[Row]) -> QueryResult<Vec<ProfileType>> {
    rows.iter()
        .map(|row| {
            let type_id = as_str(field(row, "type_id")?, "type_id")?;
            let pair = field(row, "sample_type_unit")?;
            match as_array(pair, "sample_type_unit")?.as_slice() {
                [st, su] => profile_type::reconstruct(
                    type_id,
                    as_str(st, "sample_type_unit")?,
                    as_str(su, "sample_type_unit")?,
                ),
                _ => Err(malformed("sample_type_unit", pair)),
            }
        })
        .collect()
}

/// Decode a single string column from every row
pub fn decode_strings(rows: &[Row], column: &str) -> QueryResult<Vec<String>> {
    rows.iter()
        .map(|row| as_str(field(row, column)?, column).map(str::to_string))
        .collect()
}

// ============================================================================
// Stacktrace merge
// ============================================================================

fn decode_node(value: &Value) -> QueryResult<TreeNode> {
    match value.as_array().map(|v| v.as_slice()) {
        Some([parent, node, function, self_value, total]) => Ok(TreeNode {
            parent_id: as_u64(parent, "tree")?,
            node_id: as_u64(node, "tree")?,
            function_id: as_u64(function, "tree")?,
            self_value: as_i64(self_value, "tree")?,
            total_value: as_i64(total, "tree")?,
        }),
        _ => Err(malformed("tree", value)),
    }
}

fn decode_function(value: &Value) -> QueryResult<FunctionEntry> {
    match value.as_array().map(|v| v.as_slice()) {
        Some([id, name]) => Ok(FunctionEntry {
            id: as_u64(id, "functions")?,
            name: as_str(name, "functions")?.to_string(),
        }),
        _ => Err(malformed("functions", value)),
    }
}

/// Decode the single row of a merge query
///
/// No rows at all is treated as an empty tree.
pub fn decode_merged_tree(rows: &[Row]) -> QueryResult<MergedTree> {
    let row = match rows {
        [] => return Ok(MergedTree::default()),
        [row] => row,
        _ => {
            return Err(QueryError::store_failure(format!(
                "merge query returned {} rows, expected 1",
                rows.len()
            )))
        },
    };

    let nodes = as_array(field(row, "tree")?, "tree")?
        .iter()
        .map(decode_node)
        .collect::<QueryResult<Vec<_>>>()?;
    let functions = as_array(field(row, "functions")?, "functions")?
        .iter()
        .map(decode_function)
        .collect::<QueryResult<Vec<_>>>()?;

    Ok(MergedTree { nodes, functions })
}
