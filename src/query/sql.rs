//! Minimal SELECT builder for the column store dialect
//!
//! Only what the planners need: CTEs, DISTINCT, ARRAY JOIN, one extra join,
//! AND-ed conditions, GROUP BY / HAVING, ORDER BY and LIMIT. Expressions are
//! passed as text; every value that comes from a request must go through
//! [`quote_str`] (or be a number formatted by Rust) before it gets here.

use std::fmt;

/// Quote a string literal, escaping backslashes and single quotes
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Comma separated list of quoted literals
pub fn quote_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote_str(v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Named sub-query
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// Name the outer query refers to
    pub name: String,
    /// Body
    pub query: Select,
}

/// SELECT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    ctes: Vec<Cte>,
    distinct: bool,
    columns: Vec<String>,
    from: Option<String>,
    array_join: Option<String>,
    join: Option<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    having: Option<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

impl Select {
    /// Empty statement
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a CTE
    pub fn with(mut self, name: impl Into<String>, query: Select) -> Self {
        self.ctes.push(Cte {
            name: name.into(),
            query,
        });
        self
    }

    /// SELECT DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a projected expression
    pub fn column(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(expr.into());
        self
    }

    /// Add `expr AS alias`
    pub fn column_as(self, expr: impl AsRef<str>, alias: &str) -> Self {
        self.column(format!("{} AS {}", expr.as_ref(), alias))
    }

    /// FROM source (table, CTE name, or `table AS alias`)
    pub fn from(mut self, source: impl Into<String>) -> Self {
        self.from = Some(source.into());
        self
    }

    /// ARRAY JOIN clause body
    pub fn array_join(mut self, expr: impl Into<String>) -> Self {
        self.array_join = Some(expr.into());
        self
    }

    /// Full join clause, e.g. `ANY LEFT JOIN labels ON ...`
    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.join = Some(clause.into());
        self
    }

    /// AND a condition into WHERE
    pub fn and_where(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// GROUP BY expression
    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    /// HAVING condition
    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having = Some(condition.into());
        self
    }

    /// ORDER BY expression (with direction)
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    /// LIMIT
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of WHERE conditions
    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// True if the statement groups rows
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Render
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ctes.is_empty() {
            write!(f, "WITH ")?;
            for (i, cte) in self.ctes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} AS ({})", cte.name, cte.query)?;
            }
            write!(f, " ")?;
        }

        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.columns.is_empty() {
            write!(f, "*")?;
        } else {
            write!(f, "{}", self.columns.join(", "))?;
        }

        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(expr) = &self.array_join {
            write!(f, " ARRAY JOIN {}", expr)?;
        }
        if let Some(clause) = &self.join {
            write!(f, " {}", clause)?;
        }

        match self.conditions.len() {
            0 => {},
            1 => write!(f, " WHERE {}", self.conditions[0])?,
            _ => {
                let parts: Vec<String> = self
                    .conditions
                    .iter()
                    .map(|c| format!("({})", c))
                    .collect();
                write!(f, " WHERE {}", parts.join(" AND "))?;
            },
        }

        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", self.order_by.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}
