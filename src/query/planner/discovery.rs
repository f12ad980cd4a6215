//! Discovery queries: profile types, label names, label values

use crate::query::sql::{quote_str, Select};
use crate::query::time_window::TimeWindow;
use crate::store::TableNames;

/// Distinct (type key, sample pair) combinations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTypesQuery {
    /// Day window
    pub window: TimeWindow,
}

impl ProfileTypesQuery {
    /// Statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let [from_day, to_day] = self.window.date_conditions("date");
        Select::new()
            .distinct()
            .column("type_id")
            .column("sample_type_unit")
            .from(tables.series())
            .array_join("sample_types_units AS sample_type_unit")
            .and_where(from_day)
            .and_where(to_day)
    }
}

/// Distinct label names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelNamesQuery {
    /// Day window
    pub window: TimeWindow,
}

impl LabelNamesQuery {
    /// Statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let [from_day, to_day] = self.window.date_conditions("date");
        Select::new()
            .distinct()
            .column("key")
            .from(tables.label_keys())
            .and_where(from_day)
            .and_where(to_day)
    }
}

/// Distinct values of one label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelValuesQuery {
    /// Label name
    pub name: String,
    /// Day window
    pub window: TimeWindow,
}

impl LabelValuesQuery {
    /// Statement
    pub fn to_select(&self, tables: &TableNames) -> Select {
        let [from_day, to_day] = self.window.date_conditions("date");
        Select::new()
            .distinct()
            .column("val")
            .from(tables.label_index())
            .and_where(format!("key = {}", quote_str(&self.name)))
            .and_where(from_day)
            .and_where(to_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeWindow {
        TimeWindow::new(0, 60).unwrap()
    }

    #[test]
    fn test_profile_types_sql() {
        let sql = ProfileTypesQuery { window: window() }
            .to_select(&TableNames::new("qryn", None))
            .to_sql();
        assert_eq!(
            sql,
            "SELECT DISTINCT type_id, sample_type_unit FROM qryn.profiles_series \
             ARRAY JOIN sample_types_units AS sample_type_unit \
             WHERE (date >= toDate(FROM_UNIXTIME(0))) AND (date <= toDate(FROM_UNIXTIME(60)))"
        );
    }

    #[test]
    fn test_label_names_sql() {
        let sql = LabelNamesQuery { window: window() }
            .to_select(&TableNames::new("qryn", Some("c")))
            .to_sql();
        assert!(sql.starts_with("SELECT DISTINCT key FROM qryn.profiles_series_keys_dist WHERE"));
    }

    #[test]
    fn test_label_values_sql_escapes_name() {
        let sql = LabelValuesQuery {
            name: "x' OR '1'='1".to_string(),
            window: window(),
        }
        .to_select(&TableNames::new("qryn", None))
        .to_sql();
        assert!(sql.contains("(key = 'x\\' OR \\'1\\'=\\'1')"));
    }
}
