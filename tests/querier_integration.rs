//! End-to-end tests of the querier over the in-memory store
//!
//! Each test seeds series and samples, runs one operation through
//! [`Querier`], and checks both the assembled result and the SQL that was
//! sent to the store.

use std::sync::Arc;

use chrono::NaiveDate;
use profile_querier::clock::MockClock;
use profile_querier::codec::ProtobufTreeCodec;
use profile_querier::config::ApplicationConfig;
use profile_querier::query::{
    AggregationMode, LabelValuesRequest, MergeStacktracesRequest, Querier, QueryErrorKind,
    QueryPlanner, SelectSeriesRequest, TimeBounds,
};
use profile_querier::store::memory::{MemoryStore, SampleNode, SampleRecord, SeriesRecord};
use profile_querier::store::TableNames;
use profile_querier::types::LabelSet;

// =============================================================================
// Fixtures
// =============================================================================

/// 2023-11-15T00:00:00Z
const T0_SECS: i64 = 1_700_006_400;
const NS: i64 = 1_000_000_000;

const CPU_TYPE: &str = "process_cpu:cpu:nanoseconds:cpu:nanoseconds";
const CPU_KEY: &str = "cpu:nanoseconds";

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 11, 15).unwrap()
}

fn hour() -> TimeBounds {
    TimeBounds::new(T0_SECS * 1000, (T0_SECS + 3600) * 1000)
}

fn series(fingerprint: u64, tags: &[(&str, &str)]) -> SeriesRecord {
    SeriesRecord {
        fingerprint,
        date: day(),
        type_id: "process_cpu:cpu:nanoseconds".to_string(),
        sample_types_units: vec![("cpu".to_string(), "nanoseconds".to_string())],
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn sample(fingerprint: u64, offset_secs: i64, value: i64, weight: i64) -> SampleRecord {
    SampleRecord {
        fingerprint,
        timestamp_ns: (T0_SECS + offset_secs) * NS,
        values_agg: vec![(CPU_KEY.to_string(), value, weight)],
        tree: vec![
            SampleNode {
                parent_id: 0,
                node_id: 1,
                function_id: 100,
                values: vec![(CPU_KEY.to_string(), 0, value)],
            },
            SampleNode {
                parent_id: 1,
                node_id: 2,
                function_id: 101,
                values: vec![(CPU_KEY.to_string(), value, value)],
            },
        ],
        functions: vec![(100, "main".to_string()), (101, "handle".to_string())],
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_series(series(1, &[("service_name", "api"), ("env", "prod"), ("pod", "a")]));
    store.insert_series(series(2, &[("service_name", "api"), ("env", "prod"), ("pod", "b")]));
    store.insert_series(series(3, &[("service_name", "api"), ("env", "dev"), ("pod", "c")]));
    store.insert_series(series(4, &[("service_name", "db")]));
    store
}

fn querier(store: Arc<MemoryStore>, tables: TableNames) -> Querier {
    Querier::new(store, QueryPlanner::new(tables))
        .with_clock(Arc::new(MockClock::at_millis((T0_SECS + 3600) * 1000)))
}

fn single_node(store: Arc<MemoryStore>) -> Querier {
    querier(store, TableNames::new("qryn", None))
}

fn series_request(selector: &str) -> SelectSeriesRequest {
    SelectSeriesRequest {
        profile_type_id: CPU_TYPE.to_string(),
        label_selector: selector.to_string(),
        step_secs: 60,
        bounds: hour(),
        ..Default::default()
    }
}

// =============================================================================
// SelectSeries
// =============================================================================

#[tokio::test]
async fn test_average_divides_by_weight() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 10, 2));
    store.insert_sample(sample(1, 20, 20, 8));

    let mut request = series_request(r#"{pod="a"}"#);
    request.aggregation = AggregationMode::Average;
    let result = single_node(store).select_series(&request).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].points.len(), 1);
    assert_eq!(result[0].points[0].value, 3.0);
}

#[tokio::test]
async fn test_step_buckets_align_to_step() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 3, 1));
    store.insert_sample(sample(1, 65, 4, 1));

    let result = single_node(store)
        .select_series(&series_request(r#"{pod="a"}"#))
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    let points: Vec<(i64, f64)> = result[0]
        .points
        .iter()
        .map(|p| (p.timestamp_ms - T0_SECS * 1000, p.value))
        .collect();
    assert_eq!(points, vec![(0, 3.0), (60_000, 4.0)]);
}

#[tokio::test]
async fn test_group_by_collapses_series() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 5, 1));
    store.insert_sample(sample(2, 10, 7, 1));
    store.insert_sample(sample(3, 10, 11, 1));

    let mut request = series_request(r#"{service_name="api"}"#);
    request.group_by = vec!["env".to_string()];
    let mut result = single_node(store.clone())
        .select_series(&request)
        .await
        .unwrap();
    result.sort_by(|a, b| a.labels.cmp(&b.labels));

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].labels, LabelSet::from_pairs([("env", "dev")]));
    assert_eq!(result[0].points[0].value, 11.0);
    assert_eq!(result[1].labels, LabelSet::from_pairs([("env", "prod")]));
    assert_eq!(result[1].points[0].value, 12.0);

    let sql = store.executed_queries().pop().unwrap();
    assert!(sql.contains("cityHash64(tags) AS new_fingerprint"));
    assert!(sql.contains("arrayFilter(x -> x.1 IN ('env'), p.tags)"));
}

#[tokio::test]
async fn test_selector_picks_matching_fingerprint() {
    let store = Arc::new(MemoryStore::new());
    store.insert_series(series(1, &[("service", "a")]));
    store.insert_series(series(2, &[("service", "b")]));
    store.insert_sample(sample(1, 10, 1, 1));
    store.insert_sample(sample(2, 10, 1, 1));

    let result = single_node(store)
        .select_series(&series_request(r#"{service="a"}"#))
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].labels, LabelSet::from_pairs([("service", "a")]));
}

#[tokio::test]
async fn test_negative_term_requires_label() {
    let store = seeded_store();
    store.insert_sample(sample(3, 10, 1, 1));
    store.insert_sample(sample(4, 10, 1, 1));

    let result = single_node(store)
        .select_series(&series_request(r#"{env!="prod"}"#))
        .await
        .unwrap();

    // series 4 has no env label at all
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].labels.get("pod"), Some("c"));
}

#[tokio::test]
async fn test_invalid_step_never_reaches_store() {
    let store = seeded_store();
    let mut request = series_request("{}");
    request.step_secs = 0;

    let err = single_node(store.clone())
        .select_series(&request)
        .await
        .unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::InvalidRequest);
    assert!(store.executed_queries().is_empty());
}

#[tokio::test]
async fn test_bad_selector_never_reaches_store() {
    let store = seeded_store();
    for selector in [r#"{env=~"("}"#, r#"{env<>"prod"}"#, r#"{env="prod""#] {
        let err = single_node(store.clone())
            .select_series(&series_request(selector))
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::InvalidRequest, "{}", selector);
    }
    assert!(store.executed_queries().is_empty());
}

// =============================================================================
// MergeStacktraces
// =============================================================================

#[tokio::test]
async fn test_merge_sums_matching_samples() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 10, 1));
    store.insert_sample(sample(2, 20, 15, 1));
    store.insert_sample(sample(3, 30, 1000, 1));

    let codec = ProtobufTreeCodec::new();
    let response = single_node(store)
        .with_codec(Arc::new(codec))
        .merge_stacktraces(&MergeStacktracesRequest {
            profile_type_id: CPU_TYPE.to_string(),
            label_selector: r#"{service_name="api", env="prod"}"#.to_string(),
            bounds: hour(),
        })
        .await
        .unwrap();

    let tree = &response.tree;
    assert_eq!(tree.nodes.len(), 2);
    assert_eq!(tree.node(0, 1, 100).unwrap().total_value, 25);
    assert_eq!(tree.node(1, 2, 101).unwrap().self_value, 25);
    assert_eq!(tree.total_self(), 25);
    assert_eq!(tree.functions.len(), 2);
    assert_eq!(codec.decode(&response.encoded).unwrap(), *tree);
}

#[tokio::test]
async fn test_merge_respects_time_window() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 10, 1));
    store.insert_sample(sample(1, 7200, 10, 1));

    let response = single_node(store)
        .merge_stacktraces(&MergeStacktracesRequest {
            profile_type_id: CPU_TYPE.to_string(),
            label_selector: String::new(),
            bounds: hour(),
        })
        .await
        .unwrap();
    assert_eq!(response.tree.total_self(), 10);
}

#[tokio::test]
async fn test_merge_rejects_short_type_id() {
    let store = seeded_store();
    let err = single_node(store.clone())
        .merge_stacktraces(&MergeStacktracesRequest {
            profile_type_id: "process_cpu:cpu".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_request());
    assert!(store.executed_queries().is_empty());
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_discovery_operations() {
    let store = seeded_store();
    let querier = single_node(store);

    let types = querier.profile_types(TimeBounds::default()).await.unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].id, CPU_TYPE);
    assert_eq!(types[0].name, "process_cpu");

    let names = querier.label_names(TimeBounds::default()).await.unwrap();
    assert_eq!(names, vec!["env", "pod", "service_name"]);

    let values = querier
        .label_values(&LabelValuesRequest {
            name: "env".to_string(),
            bounds: TimeBounds::default(),
        })
        .await
        .unwrap();
    assert_eq!(values, vec!["dev", "prod"]);
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let store = seeded_store();
    store.set_failure(Some("connection reset".to_string()));

    let err = single_node(store.clone())
        .select_series(&series_request("{}"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, QueryErrorKind::StoreFailure);
    assert!(err.message.contains("connection reset"));
    assert_eq!(store.executed_queries().len(), 1);
}

// =============================================================================
// Table layout
// =============================================================================

#[tokio::test]
async fn test_distributed_layout() {
    let store = seeded_store();
    store.insert_sample(sample(1, 10, 10, 1));

    let mut config = ApplicationConfig::default();
    config.store.cluster_name = "main".to_string();
    let querier = Querier::from_config(store.clone(), &config)
        .with_clock(Arc::new(MockClock::at_millis((T0_SECS + 3600) * 1000)));

    let result = querier
        .select_series(&series_request(r#"{pod="a"}"#))
        .await
        .unwrap();
    assert_eq!(result.len(), 1);

    let sql = store.executed_queries().pop().unwrap();
    assert!(sql.contains("qryn.profiles_dist"));
    assert!(sql.contains("qryn.profiles_series_gin_dist"));
    assert!(sql.contains("GLOBAL IN"));
    assert!(!sql.contains("qryn.profiles "));
}
