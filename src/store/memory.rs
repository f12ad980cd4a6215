//! In-memory column store
//!
//! Evaluates the typed [`QueryPlan`] of a compiled query over in-memory
//! tables with the same semantics the SQL has in the real store, and
//! returns rows in the same JSON shape (64-bit integers quoted).
//!
//! Intended for:
//! - **Unit and integration testing** of the full request path
//! - **Development** of new planners without a running store
//!
//! # Warning
//!
//! Not suitable for production: data lives in process memory only, and
//! label-derived fingerprints use a different hash than the store's
//! `cityHash64`. Fingerprints are opaque, so results are otherwise
//! equivalent.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use profile_querier::store::memory::{MemoryStore, SeriesRecord};
//!
//! let store = MemoryStore::new();
//! store.insert_series(SeriesRecord {
//!     fingerprint: 1,
//!     date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     type_id: "process_cpu:cpu:nanoseconds".to_string(),
//!     sample_types_units: vec![("cpu".to_string(), "nanoseconds".to_string())],
//!     tags: vec![("service_name".to_string(), "api".to_string())],
//! });
//! assert!(store.executed_queries().is_empty());
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::StoreError;
use crate::query::ast::AggregationMode;
use crate::query::planner::{
    CompiledQuery, FingerprintQuery, LabelValuesQuery, MergeQuery, QueryPlan, SeriesQuery,
};
use crate::query::time_window::TimeWindow;
use crate::store::{ColumnStore, Row};
use crate::types::{Fingerprint, LabelSet};

// =============================================================================
// Records
// =============================================================================

/// One row of the series table; also feeds the label index and key tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRecord {
    /// Series identity
    pub fingerprint: Fingerprint,
    /// Day partition
    pub date: NaiveDate,
    /// Three-part type key
    pub type_id: String,
    /// Sample (type, unit) pairs carried by the series
    pub sample_types_units: Vec<(String, String)>,
    /// Labels
    pub tags: Vec<(String, String)>,
}

/// Node of a stored sample tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleNode {
    /// Parent node id
    pub parent_id: u64,
    /// Node id
    pub node_id: u64,
    /// Function id
    pub function_id: u64,
    /// (sample key, self, total) per sample type
    pub values: Vec<(String, i64, i64)>,
}

/// One row of the sample table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    /// Series identity
    pub fingerprint: Fingerprint,
    /// Sample time
    pub timestamp_ns: i64,
    /// (sample key, value sum, weight) per sample type
    pub values_agg: Vec<(String, i64, i64)>,
    /// Call-stack tree
    pub tree: Vec<SampleNode>,
    /// Function table
    pub functions: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
struct Tables {
    series: Vec<SeriesRecord>,
    samples: Vec<SampleRecord>,
}

// =============================================================================
// Store
// =============================================================================

/// In-memory implementation of [`ColumnStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    executed: RwLock<Vec<String>>,
    failure: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series row
    pub fn insert_series(&self, record: SeriesRecord) {
        self.tables.write().series.push(record);
    }

    /// Add a sample row
    pub fn insert_sample(&self, record: SampleRecord) {
        self.tables.write().samples.push(record);
    }

    /// SQL of every query received so far
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.read().clone()
    }

    /// Make every following query fail with `message`; `None` heals the store
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.write() = message;
    }

    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, StoreError> {
        self.executed.write().push(query.sql.clone());
        if let Some(message) = self.failure.read().clone() {
            return Err(StoreError::Rejected(message));
        }

        let tables = self.tables.read();
        let rows = match &query.plan {
            QueryPlan::ProfileTypes(q) => profile_types(&tables, &q.window),
            QueryPlan::LabelNames(q) => label_names(&tables, &q.window),
            QueryPlan::LabelValues(q) => label_values(&tables, q),
            QueryPlan::MergeStacktraces(q) => merge_stacktraces(&tables, q),
            QueryPlan::SelectSeries(q) => select_series(&tables, q),
        };
        debug!(
            operation = query.plan.operation(),
            rows = rows.len(),
            "memory store evaluated plan"
        );
        Ok(rows)
    }
}

#[async_trait]
impl ColumnStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Row>, StoreError> {
        self.execute(query)
    }
}

// =============================================================================
// Plan evaluation
// =============================================================================

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn index_fingerprints(tables: &Tables, q: &FingerprintQuery) -> BTreeSet<Fingerprint> {
    let rows = tables
        .series
        .iter()
        .filter(|s| q.window.contains_day(s.date))
        .filter(|s| q.matches_type(&s.type_id, &s.sample_types_units))
        .flat_map(|s| {
            s.tags
                .iter()
                .map(move |(k, v)| (s.fingerprint, k.as_str(), v.as_str()))
        });
    q.condition.matching_fingerprints(rows)
}

fn profile_types(tables: &Tables, window: &TimeWindow) -> Vec<Row> {
    let distinct: BTreeSet<(&str, &str, &str)> = tables
        .series
        .iter()
        .filter(|s| window.contains_day(s.date))
        .flat_map(|s| {
            s.sample_types_units
                .iter()
                .map(move |(st, su)| (s.type_id.as_str(), st.as_str(), su.as_str()))
        })
        .collect();
    distinct
        .into_iter()
        .map(|(type_id, st, su)| row(json!({ "type_id": type_id, "sample_type_unit": [st, su] })))
        .collect()
}

fn label_names(tables: &Tables, window: &TimeWindow) -> Vec<Row> {
    let distinct: BTreeSet<&str> = tables
        .series
        .iter()
        .filter(|s| window.contains_day(s.date))
        .flat_map(|s| s.tags.iter().map(|(k, _)| k.as_str()))
        .collect();
    distinct
        .into_iter()
        .map(|key| row(json!({ "key": key })))
        .collect()
}

fn label_values(tables: &Tables, q: &LabelValuesQuery) -> Vec<Row> {
    let distinct: BTreeSet<&str> = tables
        .series
        .iter()
        .filter(|s| q.window.contains_day(s.date))
        .flat_map(|s| s.tags.iter())
        .filter(|(k, _)| *k == q.name)
        .map(|(_, v)| v.as_str())
        .collect();
    distinct
        .into_iter()
        .map(|val| row(json!({ "val": val })))
        .collect()
}

fn merge_stacktraces(tables: &Tables, q: &MergeQuery) -> Vec<Row> {
    let idx = index_fingerprints(tables, &q.index);

    let mut raw: Vec<&SampleRecord> = tables
        .samples
        .iter()
        .filter(|s| idx.contains(&s.fingerprint) && q.window.contains_ns(s.timestamp_ns))
        .collect();
    if let Some(limit) = q.row_limit {
        raw.sort_by(|a, b| b.timestamp_ns.cmp(&a.timestamp_ns));
        raw.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    let mut merged: BTreeMap<(u64, u64, u64), (i64, i64)> = BTreeMap::new();
    let mut functions: BTreeSet<(u64, &str)> = BTreeSet::new();
    for sample in &raw {
        for node in &sample.tree {
            let (self_value, total_value) = node
                .values
                .iter()
                .find(|(key, _, _)| *key == q.sample_key)
                .map(|(_, s, t)| (*s, *t))
                .unwrap_or((0, 0));
            let entry = merged
                .entry((node.parent_id, node.node_id, node.function_id))
                .or_insert((0, 0));
            entry.0 += self_value;
            entry.1 += total_value;
        }
        for (id, name) in &sample.functions {
            functions.insert((*id, name.as_str()));
        }
    }

    let tree: Vec<Value> = merged
        .into_iter()
        .map(|((parent, node, func), (s, t))| {
            json!([
                parent.to_string(),
                node.to_string(),
                func.to_string(),
                s.to_string(),
                t.to_string()
            ])
        })
        .collect();
    let functions: Vec<Value> = functions
        .into_iter()
        .map(|(id, name)| json!([id.to_string(), name]))
        .collect();

    vec![row(json!({ "functions": functions, "tree": tree }))]
}

#[derive(Default)]
struct Bucket {
    labels: Option<LabelSet>,
    value_sum: f64,
    weight_sum: f64,
}

fn select_series(tables: &Tables, q: &SeriesQuery) -> Vec<Row> {
    let idx = index_fingerprints(tables, &q.index);

    // ANY LEFT JOIN keeps the first labels row per stored fingerprint
    let mut labels: BTreeMap<Fingerprint, (LabelSet, Fingerprint)> = BTreeMap::new();
    for s in tables
        .series
        .iter()
        .filter(|s| idx.contains(&s.fingerprint) && q.window.contains_day(s.date))
    {
        labels.entry(s.fingerprint).or_insert_with(|| {
            q.resolver
                .resolve(&LabelSet::from_pairs(s.tags.clone()), s.fingerprint)
        });
    }

    let mut buckets: BTreeMap<(Fingerprint, i64), Bucket> = BTreeMap::new();
    for sample in tables
        .samples
        .iter()
        .filter(|s| idx.contains(&s.fingerprint) && q.window.contains_ns(s.timestamp_ns))
    {
        let (tags, fingerprint) = labels
            .get(&sample.fingerprint)
            .cloned()
            .unwrap_or_default();
        let (value, weight) = sample
            .values_agg
            .iter()
            .find(|(key, _, _)| *key == q.sample_key)
            .map(|(_, v, w)| (*v as f64, *w as f64))
            .unwrap_or((0.0, 0.0));

        let bucket = buckets
            .entry((fingerprint, q.bucket_ms(sample.timestamp_ns)))
            .or_default();
        bucket.value_sum += value;
        bucket.weight_sum += weight;
        bucket.labels = match bucket.labels.take() {
            Some(current) if current <= tags => Some(current),
            _ => Some(tags),
        };
    }

    buckets
        .into_iter()
        .map(|((fingerprint, timestamp_ms), bucket)| {
            let value = match q.aggregation {
                AggregationMode::Sum => bucket.value_sum,
                AggregationMode::Average => bucket.value_sum / bucket.weight_sum,
            };
            let pairs: Vec<Value> = bucket
                .labels
                .unwrap_or_default()
                .pairs
                .into_iter()
                .map(|(k, v)| json!([k, v]))
                .collect();
            row(json!({
                "timestamp_ms": timestamp_ms.to_string(),
                "fingerprint": fingerprint.to_string(),
                "labels": pairs,
                "value": value,
            }))
        })
        .collect()
}
