//! Time-series aggregation query
//!
//! Samples of the selected series are bucketed by `step` seconds and grouped
//! by (bucket, resolved fingerprint). SUM adds sample values; AVERAGE divides
//! the summed values by the summed weights of the bucket, which is not the
//! mean of per-sample ratios.

use crate::query::ast::AggregationMode;
use crate::query::planner::fingerprint::{FingerprintQuery, INDEX_CTE};
use crate::query::planner::labels::{SeriesResolver, LABELS_CTE};
use crate::query::sql::{quote_str, Select};
use crate::query::time_window::TimeWindow;
use crate::store::TableNames;

/// Series selection plan
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    /// Qualifying fingerprints
    pub index: FingerprintQuery,
    /// Label resolution and grouping
    pub resolver: SeriesResolver,
    /// `sampleType:sampleUnit` key inside `values_agg`
    pub sample_key: String,
    /// Bucket width in seconds, positive
    pub step_secs: i64,
    /// Bucket fold
    pub aggregation: AggregationMode,
    /// Sample window
    pub window: TimeWindow,
}

impl SeriesQuery {
    /// Bucket start in milliseconds for a sample timestamp
    pub fn bucket_ms(&self, timestamp_ns: i64) -> i64 {
        let width_ns = self.step_secs.saturating_mul(1_000_000_000);
        timestamp_ns
            .div_euclid(width_ns)
            .saturating_mul(self.step_secs)
            .saturating_mul(1000)
    }

    fn value_column(&self) -> String {
        let pick = format!(
            "arrayFirst(x -> x.1 == {}, p.values_agg)",
            quote_str(&self.sample_key)
        );
        match self.aggregation {
            AggregationMode::Sum => format!("sum(toFloat64({}.2))", pick),
            AggregationMode::Average => {
                format!("sum(toFloat64({pick}.2)) / sum(toFloat64({pick}.3))")
            },
        }
    }

    /// Full statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let [from_ts, to_ts] = self.window.timestamp_conditions("p.timestamp_ns");
        let step = self.step_secs;
        Select::new()
            .with(INDEX_CTE, self.index.to_select(tables))
            .with(LABELS_CTE, self.resolver.to_select(tables, &self.window))
            .column_as(
                format!("intDiv(p.timestamp_ns, 1000000000 * {step}) * {step} * 1000"),
                "timestamp_ms",
            )
            .column_as("labels.new_fingerprint", "fingerprint")
            .column_as("min(labels.tags)", "labels")
            .column_as(self.value_column(), "value")
            .from(format!("{} AS p", tables.samples()))
            .join(format!(
                "ANY LEFT JOIN {} AS labels ON p.fingerprint = labels.fingerprint",
                LABELS_CTE
            ))
            .and_where(format!("p.fingerprint {} {}", tables.membership(), INDEX_CTE))
            .and_where(from_ts)
            .and_where(to_ts)
            .group_by("timestamp_ms")
            .group_by("fingerprint")
            .order_by("fingerprint ASC")
            .order_by("timestamp_ms ASC")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_type::ProfileTypeId;
    use crate::query::selector::SelectorCondition;

    fn series_query(aggregation: AggregationMode, step_secs: i64) -> SeriesQuery {
        let type_id = ProfileTypeId::parse("memory:alloc_space:bytes:space:bytes").unwrap();
        let window = TimeWindow::new(0, 3600).unwrap();
        SeriesQuery {
            index: FingerprintQuery::new(&type_id, window, SelectorCondition::match_all()),
            resolver: SeriesResolver::default(),
            sample_key: type_id.sample_key(),
            step_secs,
            aggregation,
            window,
        }
    }

    #[test]
    fn test_bucket_ms() {
        let q = series_query(AggregationMode::Sum, 60);
        assert_eq!(q.bucket_ms(0), 0);
        assert_eq!(q.bucket_ms(59_999_999_999), 0);
        assert_eq!(q.bucket_ms(60_000_000_000), 60_000);
        assert_eq!(q.bucket_ms(61_000_000_000), 60_000);
    }

    #[test]
    fn test_sum_sql() {
        let sql = series_query(AggregationMode::Sum, 15)
            .to_select(&TableNames::new("qryn", None))
            .to_sql();
        assert!(sql.starts_with("WITH idx AS (SELECT fingerprint FROM qryn.profiles_series_gin"));
        assert!(sql.contains("labels AS (SELECT DISTINCT fingerprint"));
        assert!(sql.contains(
            "SELECT intDiv(p.timestamp_ns, 1000000000 * 15) * 15 * 1000 AS timestamp_ms, \
             labels.new_fingerprint AS fingerprint, min(labels.tags) AS labels, \
             sum(toFloat64(arrayFirst(x -> x.1 == 'alloc_space:bytes', p.values_agg).2)) AS value \
             FROM qryn.profiles AS p ANY LEFT JOIN labels AS labels ON p.fingerprint = labels.fingerprint"
        ));
        assert!(sql.contains("(p.timestamp_ns >= 0) AND (p.timestamp_ns <= 3600000000000)"));
        assert!(sql.ends_with(
            "GROUP BY timestamp_ms, fingerprint ORDER BY fingerprint ASC, timestamp_ms ASC"
        ));
    }

    #[test]
    fn test_average_sql() {
        let sql = series_query(AggregationMode::Average, 60)
            .to_select(&TableNames::new("qryn", None))
            .to_sql();
        assert!(sql.contains(
            "sum(toFloat64(arrayFirst(x -> x.1 == 'alloc_space:bytes', p.values_agg).2)) / \
             sum(toFloat64(arrayFirst(x -> x.1 == 'alloc_space:bytes', p.values_agg).3)) AS value"
        ));
    }
}
