//! Profile Querier - SQL compiler for continuous-profiling reads
//!
//! This library compiles profile read requests into queries over a
//! columnar store and assembles the results:
//! - Label selectors compiled to a single grouped bitmask conjunction
//! - Day-partition and nanosecond time pruning
//! - Group-by series resolution and step-bucketed aggregation
//! - Three-stage call-stack tree merges
//! - Single-node and distributed table layouts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod profile_type;
pub mod types;

/// Merged tree encoding for responses
pub mod codec;

/// Configuration management with TOML support
pub mod config;

/// Query compilation, execution and result assembly
pub mod query;

/// Column store seam and in-memory implementation
pub mod store;

// Re-export main types
pub use config::ApplicationConfig;
pub use error::{Error, Result};
pub use query::{Querier, QueryPlanner};
pub use types::{LabelSet, MergedTree, ProfileType, Series};
