//! Column store seam
//!
//! The querier talks to the analytical store through [`ColumnStore`]: a
//! compiled query goes in, JSON rows come out (the shape the store's JSON
//! output format produces, with 64-bit integers possibly quoted).
//!
//! [`TableNames`] decides which physical tables a query reads. In a
//! clustered deployment every read goes through the `_dist` tables and
//! fingerprint membership uses `GLOBAL IN`, so the index CTE is evaluated
//! once on the initiator.

pub mod memory;
pub mod util;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::query::planner::CompiledQuery;

pub use memory::MemoryStore;

/// One result row, keyed by column alias
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Label index table
pub const LABEL_INDEX_TABLE: &str = "profiles_series_gin";
/// Series metadata table
pub const SERIES_TABLE: &str = "profiles_series";
/// Label key table
pub const LABEL_KEYS_TABLE: &str = "profiles_series_keys";
/// Sample table
pub const SAMPLES_TABLE: &str = "profiles";

/// Physical table naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    database: String,
    distributed: bool,
}

impl TableNames {
    /// Tables in `database`; a non-empty cluster name selects distributed tables
    pub fn new(database: impl Into<String>, cluster_name: Option<&str>) -> Self {
        Self {
            database: database.into(),
            distributed: cluster_name.map(|c| !c.is_empty()).unwrap_or(false),
        }
    }

    /// Database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// True for clustered deployments
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    fn table(&self, base: &str) -> String {
        if self.distributed {
            format!("{}.{}_dist", self.database, base)
        } else {
            format!("{}.{}", self.database, base)
        }
    }

    /// Label index table
    pub fn label_index(&self) -> String {
        self.table(LABEL_INDEX_TABLE)
    }

    /// Series metadata table
    pub fn series(&self) -> String {
        self.table(SERIES_TABLE)
    }

    /// Label key table
    pub fn label_keys(&self) -> String {
        self.table(LABEL_KEYS_TABLE)
    }

    /// Sample table
    pub fn samples(&self) -> String {
        self.table(SAMPLES_TABLE)
    }

    /// Membership operator for the shared fingerprint set
    pub fn membership(&self) -> &'static str {
        if self.distributed {
            "GLOBAL IN"
        } else {
            "IN"
        }
    }
}

/// Executes compiled queries
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run a query and return all rows
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Row>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node_tables() {
        let tables = TableNames::new("qryn", None);
        assert!(!tables.is_distributed());
        assert_eq!(tables.label_index(), "qryn.profiles_series_gin");
        assert_eq!(tables.series(), "qryn.profiles_series");
        assert_eq!(tables.label_keys(), "qryn.profiles_series_keys");
        assert_eq!(tables.samples(), "qryn.profiles");
        assert_eq!(tables.membership(), "IN");
    }

    #[test]
    fn test_distributed_tables() {
        let tables = TableNames::new("qryn", Some("cluster_a"));
        assert!(tables.is_distributed());
        assert_eq!(tables.samples(), "qryn.profiles_dist");
        assert_eq!(tables.membership(), "GLOBAL IN");
    }

    #[test]
    fn test_empty_cluster_name_is_single_node() {
        assert!(!TableNames::new("qryn", Some("")).is_distributed());
    }
}
