//! Query planner - compiles typed requests into store queries
//!
//! Each request is validated, its time window resolved, and its selector
//! compiled before anything reaches the store. The result is a
//! [`CompiledQuery`]: the SQL text plus the typed [`QueryPlan`] it was
//! rendered from.
//!
//! # Planning Phases
//!
//! ```text
//! Request
//!     │
//!     ▼
//! ┌─────────────────┐
//! │    Validate     │  type id, selector, step, label name
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Typed plan    │  index scan, resolver, aggregation stages
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Render SQL    │  single-node or distributed tables
//! └─────────────────┘
//! ```

pub mod discovery;
pub mod fingerprint;
pub mod labels;
pub mod merge;
pub mod series;

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::profile_type::ProfileTypeId;
use crate::query::ast::{
    LabelSelector, LabelValuesRequest, MergeStacktracesRequest, SelectSeriesRequest, TimeBounds,
};
use crate::query::error::{QueryError, QueryResult};
use crate::query::selector::SelectorCondition;
use crate::query::time_window::{TimeWindow, DISCOVERY_LOOKBACK, SAMPLE_LOOKBACK};
use crate::store::TableNames;

pub use discovery::{LabelNamesQuery, LabelValuesQuery, ProfileTypesQuery};
pub use fingerprint::FingerprintQuery;
pub use labels::SeriesResolver;
pub use merge::MergeQuery;
pub use series::SeriesQuery;

// ============================================================================
// Planner Configuration
// ============================================================================

/// Largest step whose width in nanoseconds fits the store's Int64 arithmetic
pub const MAX_STEP_SECS: i64 = i64::MAX / 1_000_000_000;

/// Configuration for query planning
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Lookback used when a discovery request has no start
    pub discovery_lookback: Duration,

    /// Lookback used when a merge or series request has no start
    pub sample_lookback: Duration,

    /// Keep only the newest `n` samples in a stacktrace merge
    pub merge_row_limit: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            discovery_lookback: DISCOVERY_LOOKBACK,
            sample_lookback: SAMPLE_LOOKBACK,
            merge_row_limit: None,
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Typed plan of a compiled query
#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// Profile type discovery
    ProfileTypes(ProfileTypesQuery),
    /// Label name discovery
    LabelNames(LabelNamesQuery),
    /// Label value discovery
    LabelValues(LabelValuesQuery),
    /// Stacktrace merge
    MergeStacktraces(MergeQuery),
    /// Series selection
    SelectSeries(SeriesQuery),
}

impl QueryPlan {
    /// Operation name, used in logs
    pub fn operation(&self) -> &'static str {
        match self {
            QueryPlan::ProfileTypes(_) => "profile_types",
            QueryPlan::LabelNames(_) => "label_names",
            QueryPlan::LabelValues(_) => "label_values",
            QueryPlan::MergeStacktraces(_) => "merge_stacktraces",
            QueryPlan::SelectSeries(_) => "select_series",
        }
    }

    /// Render SQL for the given tables
    pub fn to_sql(&self, tables: &TableNames) -> String {
        match self {
            QueryPlan::ProfileTypes(q) => q.to_select(tables).to_sql(),
            QueryPlan::LabelNames(q) => q.to_select(tables).to_sql(),
            QueryPlan::LabelValues(q) => q.to_select(tables).to_sql(),
            QueryPlan::MergeStacktraces(q) => q.to_select(tables).to_sql(),
            QueryPlan::SelectSeries(q) => q.to_select(tables).to_sql(),
        }
    }

    /// One line summary of the plan
    pub fn explain(&self) -> String {
        match self {
            QueryPlan::ProfileTypes(q) => format!("ProfileTypes window={:?}", q.window),
            QueryPlan::LabelNames(q) => format!("LabelNames window={:?}", q.window),
            QueryPlan::LabelValues(q) => {
                format!("LabelValues name={} window={:?}", q.name, q.window)
            },
            QueryPlan::MergeStacktraces(q) => format!(
                "MergeStacktraces type={} sample={} terms={} limit={:?} window={:?}",
                q.index.type_key,
                q.sample_key,
                q.index.condition.term_count(),
                q.row_limit,
                q.window
            ),
            QueryPlan::SelectSeries(q) => format!(
                "SelectSeries type={} sample={} terms={} group_by={:?} step={}s agg={} window={:?}",
                q.index.type_key,
                q.sample_key,
                q.index.condition.term_count(),
                q.resolver.group_by,
                q.step_secs,
                q.aggregation,
                q.window
            ),
        }
    }
}

/// SQL text and the plan it was rendered from
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Statement sent to the store
    pub sql: String,
    /// Typed plan
    pub plan: QueryPlan,
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Compiles requests against a table layout
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    tables: TableNames,
    config: PlannerConfig,
}

impl QueryPlanner {
    /// Planner with default configuration
    pub fn new(tables: TableNames) -> Self {
        Self::with_config(tables, PlannerConfig::default())
    }

    /// Planner with explicit configuration
    pub fn with_config(tables: TableNames, config: PlannerConfig) -> Self {
        Self { tables, config }
    }

    /// Table layout
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Planner configuration
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn compile(&self, plan: QueryPlan) -> CompiledQuery {
        let sql = plan.to_sql(&self.tables);
        debug!(operation = plan.operation(), plan = %plan.explain(), "compiled query");
        CompiledQuery { sql, plan }
    }

    fn discovery_window(&self, bounds: TimeBounds, now_ms: i64) -> QueryResult<TimeWindow> {
        TimeWindow::resolve(
            bounds.start_ms,
            bounds.end_ms,
            self.config.discovery_lookback,
            now_ms,
        )
    }

    fn sample_window(&self, bounds: TimeBounds, now_ms: i64) -> QueryResult<TimeWindow> {
        TimeWindow::resolve(
            bounds.start_ms,
            bounds.end_ms,
            self.config.sample_lookback,
            now_ms,
        )
    }

    /// Profile type discovery
    pub fn profile_types(&self, bounds: TimeBounds, now_ms: i64) -> QueryResult<CompiledQuery> {
        let window = self.discovery_window(bounds, now_ms)?;
        Ok(self.compile(QueryPlan::ProfileTypes(ProfileTypesQuery { window })))
    }

    /// Label name discovery
    pub fn label_names(&self, bounds: TimeBounds, now_ms: i64) -> QueryResult<CompiledQuery> {
        let window = self.discovery_window(bounds, now_ms)?;
        Ok(self.compile(QueryPlan::LabelNames(LabelNamesQuery { window })))
    }

    /// Label value discovery; the name is required
    pub fn label_values(
        &self,
        request: &LabelValuesRequest,
        now_ms: i64,
    ) -> QueryResult<CompiledQuery> {
        if request.name.is_empty() {
            return Err(QueryError::invalid_request("label name is required"));
        }
        let window = self.discovery_window(request.bounds, now_ms)?;
        Ok(self.compile(QueryPlan::LabelValues(LabelValuesQuery {
            name: request.name.clone(),
            window,
        })))
    }

    /// Stacktrace merge
    pub fn merge_stacktraces(
        &self,
        request: &MergeStacktracesRequest,
        now_ms: i64,
    ) -> QueryResult<CompiledQuery> {
        let type_id = ProfileTypeId::parse(&request.profile_type_id)?;
        let condition = compile_selector(&request.label_selector)?;
        let window = self.sample_window(request.bounds, now_ms)?;

        Ok(self.compile(QueryPlan::MergeStacktraces(MergeQuery {
            index: FingerprintQuery::new(&type_id, window, condition),
            sample_key: type_id.sample_key(),
            window,
            row_limit: self.config.merge_row_limit,
        })))
    }

    /// Series selection
    pub fn select_series(
        &self,
        request: &SelectSeriesRequest,
        now_ms: i64,
    ) -> QueryResult<CompiledQuery> {
        let type_id = ProfileTypeId::parse(&request.profile_type_id)?;
        if request.step_secs <= 0 || request.step_secs > MAX_STEP_SECS {
            return Err(QueryError::invalid_request(format!(
                "step must be between 1 and {} seconds, got {}",
                MAX_STEP_SECS, request.step_secs
            )));
        }
        let condition = compile_selector(&request.label_selector)?;
        let window = self.sample_window(request.bounds, now_ms)?;

        Ok(self.compile(QueryPlan::SelectSeries(SeriesQuery {
            index: FingerprintQuery::new(&type_id, window, condition),
            resolver: SeriesResolver::new(request.group_by.clone()),
            sample_key: type_id.sample_key(),
            step_secs: request.step_secs,
            aggregation: request.aggregation,
            window,
        })))
    }
}

fn compile_selector(text: &str) -> QueryResult<SelectorCondition> {
    let selector = LabelSelector::parse(text)?;
    SelectorCondition::compile(&selector)
}
