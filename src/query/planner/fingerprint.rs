//! Fingerprint index query
//!
//! Scans the label index for series of the requested profile type within
//! the window's day bounds, then narrows them with the selector condition.
//! Consumers reference the result as the shared `idx` CTE.

use crate::profile_type::ProfileTypeId;
use crate::query::selector::SelectorCondition;
use crate::query::sql::{quote_str, Select};
use crate::query::time_window::TimeWindow;
use crate::store::TableNames;

/// Name of the CTE holding qualifying fingerprints
pub const INDEX_CTE: &str = "idx";

/// Qualifying fingerprints for a profile type, window and selector
#[derive(Debug, Clone)]
pub struct FingerprintQuery {
    /// Stored three-part type key
    pub type_key: String,
    /// Sample type that must be present on the series
    pub sample_type: String,
    /// Sample unit that must be present on the series
    pub sample_unit: String,
    /// Window; only its day bounds apply here
    pub window: TimeWindow,
    /// Compiled selector
    pub condition: SelectorCondition,
}

impl FingerprintQuery {
    /// Build for a parsed type id
    pub fn new(type_id: &ProfileTypeId, window: TimeWindow, condition: SelectorCondition) -> Self {
        Self {
            type_key: type_id.type_key(),
            sample_type: type_id.sample_type.clone(),
            sample_unit: type_id.sample_unit.clone(),
            window,
            condition,
        }
    }

    /// True if a series row carries the requested type and sample pair
    pub fn matches_type(&self, type_id: &str, sample_types_units: &[(String, String)]) -> bool {
        type_id == self.type_key
            && sample_types_units
                .iter()
                .any(|(st, su)| *st == self.sample_type && *su == self.sample_unit)
    }

    /// Index scan statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let [from_day, to_day] = self.window.date_conditions("date");
        let select = Select::new()
            .column("fingerprint")
            .from(tables.label_index())
            .and_where(from_day)
            .and_where(to_day)
            .and_where(format!("type_id = {}", quote_str(&self.type_key)))
            .and_where(format!(
                "has(sample_types_units, ({}, {}))",
                quote_str(&self.sample_type),
                quote_str(&self.sample_unit)
            ));
        self.condition.apply(select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{LabelSelector, MatchOp};

    fn query(selector: LabelSelector) -> FingerprintQuery {
        let type_id = ProfileTypeId::parse("process_cpu:cpu:nanoseconds:cpu:nanoseconds").unwrap();
        FingerprintQuery::new(
            &type_id,
            TimeWindow::new(0, 86_400).unwrap(),
            SelectorCondition::compile(&selector).unwrap(),
        )
    }

    #[test]
    fn test_index_sql_without_selector() {
        let sql = query(LabelSelector::new())
            .to_select(&TableNames::new("qryn", None))
            .to_sql();
        assert_eq!(
            sql,
            "SELECT fingerprint FROM qryn.profiles_series_gin \
             WHERE (date >= toDate(FROM_UNIXTIME(0))) AND (date <= toDate(FROM_UNIXTIME(86400))) \
             AND (type_id = 'process_cpu:cpu:nanoseconds') \
             AND (has(sample_types_units, ('cpu', 'nanoseconds')))"
        );
    }

    #[test]
    fn test_index_sql_with_selector() {
        let selector = LabelSelector::new()
            .with_term("service_name", MatchOp::Eq, "api")
            .unwrap();
        let sql = query(selector)
            .to_select(&TableNames::new("qryn", None))
            .to_sql();
        assert!(sql.contains("((key = 'service_name' AND val = 'api'))"));
        assert!(sql.ends_with(
            "GROUP BY fingerprint HAVING groupBitOr(bitShiftLeft(toUInt64((key = 'service_name' AND val = 'api')), 0)) = 1"
        ));
    }

    #[test]
    fn test_matches_type() {
        let q = query(LabelSelector::new());
        let pairs = vec![
            ("samples".to_string(), "count".to_string()),
            ("cpu".to_string(), "nanoseconds".to_string()),
        ];
        assert!(q.matches_type("process_cpu:cpu:nanoseconds", &pairs));
        assert!(!q.matches_type("memory:space:bytes", &pairs));
        assert!(!q.matches_type("process_cpu:cpu:nanoseconds", &pairs[..1]));
    }
}
