//! Stacktrace tree aggregation query
//!
//! Three stages, all executed by the store:
//!
//! 1. `raw`: per sample, project every tree node with the requested sample
//!    type's (self, total) pair, plus the sample's function table. An
//!    optional row cap keeps only the newest samples.
//! 2. `joined`: explode the node arrays and sum self/total per
//!    (parent_id, node_id, function_id).
//! 3. Collect the merged nodes into one sorted array and the distinct
//!    function entries into one array.
//!
//! A node whose sample has no value for the requested type contributes
//! zeros rather than being dropped.

use crate::query::planner::fingerprint::{FingerprintQuery, INDEX_CTE};
use crate::query::sql::{quote_str, Select};
use crate::query::time_window::TimeWindow;
use crate::store::TableNames;

/// Per-sample projection CTE
pub const RAW_CTE: &str = "raw";

/// Per-node aggregation CTE
pub const JOINED_CTE: &str = "joined";

/// Stacktrace merge plan
#[derive(Debug, Clone)]
pub struct MergeQuery {
    /// Qualifying fingerprints
    pub index: FingerprintQuery,
    /// `sampleType:sampleUnit` key inside node value arrays
    pub sample_key: String,
    /// Sample window
    pub window: TimeWindow,
    /// Keep only the newest `n` samples
    pub row_limit: Option<u64>,
}

impl MergeQuery {
    fn raw_select(&self, tables: &TableNames) -> Select {
        let [from_ts, to_ts] = self.window.timestamp_conditions("timestamp_ns");
        let nodes = format!(
            "arrayMap(x -> (x.1, x.2, x.3, (arrayFirst(y -> y.1 == {}, x.4) AS af).2, af.3), tree)",
            quote_str(&self.sample_key)
        );
        let select = Select::new()
            .column_as(nodes, "nodes")
            .column("functions")
            .from(tables.samples())
            .and_where(from_ts)
            .and_where(to_ts)
            .and_where(format!("fingerprint {} {}", tables.membership(), INDEX_CTE));
        match self.row_limit {
            Some(limit) => select.order_by("timestamp_ns DESC").limit(limit),
            None => select,
        }
    }

    fn joined_select() -> Select {
        Select::new()
            .column_as(
                "(node.1, node.2, node.3, sum(node.4), sum(node.5))",
                "merged",
            )
            .from(RAW_CTE)
            .array_join(format!("{}.nodes AS node", RAW_CTE))
            .group_by("node.1")
            .group_by("node.2")
            .group_by("node.3")
    }

    /// Full statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let functions = Select::new()
            .column("groupUniqArray(fn)")
            .from(RAW_CTE)
            .array_join(format!("{}.functions AS fn", RAW_CTE));
        let tree = Select::new()
            .column("arraySort(groupArray(merged))")
            .from(JOINED_CTE);

        Select::new()
            .with(INDEX_CTE, self.index.to_select(tables))
            .with(RAW_CTE, self.raw_select(tables))
            .with(JOINED_CTE, Self::joined_select())
            .column_as(format!("({})", functions), "functions")
            .column_as(format!("({})", tree), "tree")
    }
}
