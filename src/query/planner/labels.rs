//! Series resolver
//!
//! Maps each selected fingerprint to its label set. With a group-by list the
//! labels are reduced to that subset and a new fingerprint is derived by
//! hashing the reduced set, so series that agree on the group-by labels
//! collapse into one. Without a group-by list the original identity is kept.

use crate::query::planner::fingerprint::INDEX_CTE;
use crate::query::sql::{quote_list, Select};
use crate::query::time_window::TimeWindow;
use crate::store::TableNames;
use crate::types::{Fingerprint, LabelSet};

/// Name of the CTE holding resolved labels
pub const LABELS_CTE: &str = "labels";

/// Label resolution with optional grouping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesResolver {
    /// Labels to keep; empty keeps every label and the stored fingerprint
    pub group_by: Vec<String>,
}

impl SeriesResolver {
    /// Resolver for a group-by list
    pub fn new(group_by: Vec<String>) -> Self {
        Self { group_by }
    }

    /// True if series are re-keyed
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Resolve one series in process
    ///
    /// Returns the (possibly reduced) canonical labels and the output
    /// fingerprint.
    pub fn resolve(&self, labels: &LabelSet, fingerprint: Fingerprint) -> (LabelSet, Fingerprint) {
        if self.is_grouped() {
            let reduced = labels.reduce(&self.group_by);
            let derived = reduced.fingerprint();
            (reduced, derived)
        } else {
            (labels.sorted(), fingerprint)
        }
    }

    /// `labels` CTE body over the series table
    pub fn to_select(&self, tables: &TableNames, window: &TimeWindow) -> Select {
        let [from_day, to_day] = window.date_conditions("date");
        let select = Select::new().distinct().column("fingerprint");
        let select = if self.is_grouped() {
            select
                .column_as(
                    format!(
                        "arraySort(arrayFilter(x -> x.1 IN ({}), p.tags))",
                        quote_list(&self.group_by)
                    ),
                    "tags",
                )
                .column_as("cityHash64(tags)", "new_fingerprint")
        } else {
            select
                .column_as("arraySort(p.tags)", "tags")
                .column_as("fingerprint", "new_fingerprint")
        };
        select
            .from(format!("{} AS p", tables.series()))
            .and_where(format!("fingerprint {} {}", tables.membership(), INDEX_CTE))
            .and_where(from_day)
            .and_where(to_day)
    }
}
