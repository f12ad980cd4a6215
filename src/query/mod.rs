//! Profile query compilation and execution
//!
//! Turns the five profile read operations into SQL for the column store
//! and assembles the returned rows.
//!
//! # Architecture
//!
//! ```text
//! Request
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Parse     │  type id, label selector
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Compile    │  bitmask conjunction, time window
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Plan      │  index CTE, label resolver, aggregation stages
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Execute    │  ColumnStore
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Assemble   │  series, profile types, merged tree
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use profile_querier::query::{QueryPlanner, SelectSeriesRequest, TimeBounds};
//! use profile_querier::store::TableNames;
//!
//! let planner = QueryPlanner::new(TableNames::new("qryn", None));
//! let request = SelectSeriesRequest {
//!     profile_type_id: "process_cpu:cpu:nanoseconds:cpu:nanoseconds".to_string(),
//!     label_selector: r#"{service_name="api"}"#.to_string(),
//!     step_secs: 60,
//!     bounds: TimeBounds::new(1_700_000_000_000, 1_700_003_600_000),
//!     ..Default::default()
//! };
//! let compiled = planner.select_series(&request, 1_700_003_600_000).unwrap();
//! assert!(compiled.sql.contains("HAVING"));
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod parser;
pub mod planner;
pub mod result;
pub mod selector;
pub mod sql;
pub mod time_window;

// Re-export main types
pub use ast::{
    AggregationMode, LabelSelector, LabelValuesRequest, MatchOp, MergeStacktracesRequest,
    SelectSeriesRequest, SelectorTerm, TimeBounds,
};
pub use engine::{MergeStacktracesResponse, Querier};
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use planner::{CompiledQuery, PlannerConfig, QueryPlan, QueryPlanner};
pub use selector::SelectorCondition;
pub use time_window::TimeWindow;
