//! Querier - runs compiled requests against the column store
//!
//! Every operation follows the same path:
//!
//! ```text
//! Request ─► QueryPlanner ─► CompiledQuery ─► ColumnStore ─► rows ─► assembler
//! ```
//!
//! Validation happens entirely in the planner, so a rejected request never
//! reaches the store. Each call runs inside a span carrying a fresh request
//! id and the operation name.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::codec::{ProtobufTreeCodec, TreeCodec};
use crate::config::ApplicationConfig;
use crate::query::ast::{
    LabelValuesRequest, MergeStacktracesRequest, SelectSeriesRequest, TimeBounds,
};
use crate::query::error::{QueryError, QueryResult};
use crate::query::planner::{CompiledQuery, QueryPlanner};
use crate::query::result;
use crate::store::{ColumnStore, Row};
use crate::types::{MergedTree, ProfileType, Series};

/// Merged call-stack tree and its encoded form
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStacktracesResponse {
    /// Decoded tree
    pub tree: MergedTree,
    /// Tree encoded by the querier's codec
    pub encoded: Vec<u8>,
}

/// Entry point for profile queries
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct Querier {
    store: Arc<dyn ColumnStore>,
    planner: QueryPlanner,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn TreeCodec>,
}

impl Querier {
    /// Querier using the system clock and the protobuf tree codec
    pub fn new(store: Arc<dyn ColumnStore>, planner: QueryPlanner) -> Self {
        Self {
            store,
            planner,
            clock: Arc::new(SystemClock),
            codec: Arc::new(ProtobufTreeCodec::new()),
        }
    }

    /// Querier configured from application settings
    pub fn from_config(store: Arc<dyn ColumnStore>, config: &ApplicationConfig) -> Self {
        let planner = QueryPlanner::with_config(config.table_names(), config.planner_config());
        Self::new(store, planner)
    }

    /// Replace the clock used for default time windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the tree codec
    pub fn with_codec(mut self, codec: Arc<dyn TreeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Planner in use
    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// List profile types seen in the window
    pub async fn profile_types(&self, bounds: TimeBounds) -> QueryResult<Vec<ProfileType>> {
        let span = request_span("list_profile_types");
        async {
            let compiled = self.planner.profile_types(bounds, self.clock.now_ms())?;
            let rows = self.run(&compiled).await?;
            result::decode_profile_types(&rows)
        }
        .instrument(span)
        .await
    }

    /// List label names seen in the window
    pub async fn label_names(&self, bounds: TimeBounds) -> QueryResult<Vec<String>> {
        let span = request_span("list_label_names");
        async {
            let compiled = self.planner.label_names(bounds, self.clock.now_ms())?;
            let rows = self.run(&compiled).await?;
            result::decode_strings(&rows, "key")
        }
        .instrument(span)
        .await
    }

    /// List values of one label name seen in the window
    pub async fn label_values(&self, request: &LabelValuesRequest) -> QueryResult<Vec<String>> {
        let span = request_span("list_label_values");
        async {
            let compiled = self.planner.label_values(request, self.clock.now_ms())?;
            let rows = self.run(&compiled).await?;
            result::decode_strings(&rows, "val")
        }
        .instrument(span)
        .await
    }

    /// Merge the call-stack trees of all matching samples
    pub async fn merge_stacktraces(
        &self,
        request: &MergeStacktracesRequest,
    ) -> QueryResult<MergeStacktracesResponse> {
        let span = request_span("merge_stacktraces");
        async {
            let compiled = self
                .planner
                .merge_stacktraces(request, self.clock.now_ms())?;
            let rows = self.run(&compiled).await?;
            let tree = result::decode_merged_tree(&rows)?;
            let encoded = self.codec.encode(&tree)?;
            debug!(
                nodes = tree.nodes.len(),
                functions = tree.functions.len(),
                bytes = encoded.len(),
                codec = self.codec.name(),
                "encoded merged tree"
            );
            Ok(MergeStacktracesResponse { tree, encoded })
        }
        .instrument(span)
        .await
    }

    /// Aggregate matching samples into time series
    pub async fn select_series(&self, request: &SelectSeriesRequest) -> QueryResult<Vec<Series>> {
        let span = request_span("select_series");
        async {
            let compiled = self.planner.select_series(request, self.clock.now_ms())?;
            let rows = self.run(&compiled).await?;
            let series = result::decode_series(&rows)?;
            debug!(series = series.len(), "assembled series");
            Ok(series)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, compiled: &CompiledQuery) -> QueryResult<Vec<Row>> {
        debug!(store = self.store.name(), sql = %compiled.sql, "executing query");
        let start = Instant::now();
        match self.store.query(compiled).await {
            Ok(rows) => {
                debug!(
                    rows = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "query completed"
                );
                Ok(rows)
            },
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "store query failed"
                );
                Err(QueryError::from(e))
            },
        }
    }
}

impl std::fmt::Debug for Querier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Querier")
            .field("store", &self.store.name())
            .field("codec", &self.codec.name())
            .field("planner", &self.planner)
            .finish()
    }
}

fn request_span(operation: &'static str) -> tracing::Span {
    info_span!("query", request_id = %Uuid::new_v4(), operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::query::error::QueryErrorKind;
    use crate::store::memory::{MemoryStore, SeriesRecord};
    use crate::store::TableNames;
    use chrono::NaiveDate;

    // 2023-11-15T00:00:00Z
    const NOW_MS: i64 = 1_700_006_400_000;

    fn querier(store: Arc<MemoryStore>) -> Querier {
        Querier::new(store, QueryPlanner::new(TableNames::new("qryn", None)))
            .with_clock(Arc::new(MockClock::at_millis(NOW_MS)))
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_series(SeriesRecord {
            fingerprint: 7,
            date: NaiveDate::from_ymd_opt(2023, 11, 14).unwrap(),
            type_id: "memory:space:bytes".to_string(),
            sample_types_units: vec![
                ("alloc_space".to_string(), "bytes".to_string()),
                ("alloc_objects".to_string(), "count".to_string()),
            ],
            tags: vec![("service_name".to_string(), "api".to_string())],
        });
        store
    }

    #[tokio::test]
    async fn test_profile_types_default_window() {
        let store = seeded();
        let types = querier(store.clone())
            .profile_types(TimeBounds::default())
            .await
            .unwrap();
        assert_eq!(types.len(), 2);
        assert!(types
            .iter()
            .any(|t| t.id == "memory:alloc_space:bytes:space:bytes"));
        assert_eq!(store.executed_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_default_window_follows_clock() {
        let clock = Arc::new(MockClock::at_millis(NOW_MS));
        let querier = querier(seeded()).with_clock(clock.clone());
        assert_eq!(querier.label_names(TimeBounds::default()).await.unwrap().len(), 1);

        // 7 day discovery lookback no longer reaches 2023-11-14
        clock.advance(chrono::Duration::days(8));
        assert!(querier
            .label_names(TimeBounds::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_label_names() {
        let names = querier(seeded())
            .label_names(TimeBounds::default())
            .await
            .unwrap();
        assert_eq!(names, vec!["service_name".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_store() {
        let store = seeded();
        let err = querier(store.clone())
            .label_values(&LabelValuesRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::InvalidRequest);
        assert!(store.executed_queries().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = seeded();
        store.set_failure(Some("Code: 241. Memory limit exceeded".to_string()));
        let err = querier(store)
            .label_names(TimeBounds::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::StoreFailure);
    }

    #[tokio::test]
    async fn test_merge_without_samples_is_empty() {
        let response = querier(seeded())
            .merge_stacktraces(&MergeStacktracesRequest {
                profile_type_id: "memory:alloc_space:bytes:space:bytes".to_string(),
                label_selector: "{service_name=\"api\"}".to_string(),
                bounds: TimeBounds::default(),
            })
            .await
            .unwrap();
        assert!(response.tree.is_empty());
        assert!(response.encoded.is_empty());
    }
}
