//! Selector predicate compiler
//!
//! The label index stores one row per (fingerprint, label key, label value).
//! A selector is a conjunction over labels, but no single row can satisfy
//! more than one term, so a plain WHERE cannot express it. Instead:
//!
//! 1. Each term `i` becomes a row predicate `key = label AND <value test>`.
//! 2. WHERE keeps rows matching any term.
//! 3. Rows are grouped by fingerprint and every row contributes the bits of
//!    the terms it satisfies: `Σ toUInt64(rowMatches(i)) << i`.
//! 4. HAVING requires the OR of those contributions to equal the full mask.
//!
//! A fingerprint is selected iff every term is satisfied by at least one of
//! its rows. Negative operators are therefore existential: `env != "dev"`
//! needs a row with key `env` whose value is not `dev`, so a series without
//! an `env` label never matches it.
//!
//! [`SelectorCondition::matching_fingerprints`] evaluates the same condition
//! in process; it backs the in-memory store and the property tests.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::query::ast::{LabelSelector, MatchOp, SelectorTerm, MAX_TERMS};
use crate::query::error::{QueryError, QueryResult};
use crate::query::sql::{quote_str, Select};
use crate::types::Fingerprint;

/// A compiled term
#[derive(Debug, Clone)]
struct CompiledTerm {
    term: SelectorTerm,
    regex: Option<Regex>,
}

impl CompiledTerm {
    fn compile(term: &SelectorTerm) -> QueryResult<Self> {
        term.validate()?;
        let regex = if term.op.is_regex() {
            Some(Regex::new(&term.value).map_err(|e| {
                QueryError::invalid_request(format!("invalid regex pattern '{}': {}", term.value, e))
            })?)
        } else {
            None
        };
        Ok(Self {
            term: term.clone(),
            regex,
        })
    }

    fn matches(&self, key: &str, val: &str) -> bool {
        if key != self.term.label {
            return false;
        }
        match (self.term.op, &self.regex) {
            (MatchOp::Eq, _) => val == self.term.value,
            (MatchOp::Neq, _) => val != self.term.value,
            (MatchOp::MatchRegex, Some(re)) => re.is_match(val),
            (MatchOp::NotMatchRegex, Some(re)) => !re.is_match(val),
            _ => false,
        }
    }

    fn to_sql(&self) -> String {
        let value_test = match self.term.op {
            MatchOp::Eq => format!("val = {}", quote_str(&self.term.value)),
            MatchOp::Neq => format!("val != {}", quote_str(&self.term.value)),
            MatchOp::MatchRegex => format!("match(val, {})", quote_str(&self.term.value)),
            MatchOp::NotMatchRegex => format!("NOT match(val, {})", quote_str(&self.term.value)),
        };
        format!("(key = {} AND {})", quote_str(&self.term.label), value_test)
    }
}

/// Compiled selector condition over label index rows
#[derive(Debug, Clone, Default)]
pub struct SelectorCondition {
    terms: Vec<CompiledTerm>,
}

impl SelectorCondition {
    /// Compile a selector
    pub fn compile(selector: &LabelSelector) -> QueryResult<Self> {
        if selector.len() > MAX_TERMS {
            return Err(QueryError::invalid_request(format!(
                "selector has {} terms, at most {} are supported",
                selector.len(),
                MAX_TERMS
            )));
        }
        let terms = selector
            .terms
            .iter()
            .map(CompiledTerm::compile)
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// Condition that selects every fingerprint
    pub fn match_all() -> Self {
        Self::default()
    }

    /// True if the condition selects every fingerprint
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of terms
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Mask with one bit set per term
    pub fn full_mask(&self) -> u64 {
        full_mask(self.terms.len())
    }

    /// Row predicate of term `i`
    pub fn row_predicate(&self, i: usize) -> Option<String> {
        self.terms.get(i).map(CompiledTerm::to_sql)
    }

    /// OR of all row predicates, `None` for the empty selector
    pub fn where_sql(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        Some(
            self.terms
                .iter()
                .map(CompiledTerm::to_sql)
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }

    /// Bitmask HAVING condition, `None` for the empty selector
    pub fn having_sql(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        let bits = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| format!("bitShiftLeft(toUInt64({}), {})", t.to_sql(), i))
            .collect::<Vec<_>>()
            .join(" + ");
        Some(format!("groupBitOr({}) = {}", bits, self.full_mask()))
    }

    /// Add WHERE / GROUP BY / HAVING to an index scan
    ///
    /// The empty selector leaves the statement untouched.
    pub fn apply(&self, select: Select) -> Select {
        match (self.where_sql(), self.having_sql()) {
            (Some(cond), Some(having)) => select
                .and_where(cond)
                .group_by("fingerprint")
                .having(having),
            _ => select,
        }
    }

    /// Bits contributed by a single index row
    pub fn row_mask(&self, key: &str, val: &str) -> u64 {
        self.terms
            .iter()
            .enumerate()
            .filter(|(_, t)| t.matches(key, val))
            .fold(0u64, |mask, (i, _)| mask | (1u64 << i))
    }

    /// Evaluate against index rows `(fingerprint, key, val)`
    ///
    /// With no terms every fingerprint that has at least one row is selected.
    pub fn matching_fingerprints<'a, I>(&self, rows: I) -> BTreeSet<Fingerprint>
    where
        I: IntoIterator<Item = (Fingerprint, &'a str, &'a str)>,
    {
        if self.terms.is_empty() {
            return rows.into_iter().map(|(fp, _, _)| fp).collect();
        }

        let mut masks: BTreeMap<Fingerprint, u64> = BTreeMap::new();
        for (fp, key, val) in rows {
            let bits = self.row_mask(key, val);
            if bits != 0 {
                *masks.entry(fp).or_insert(0) |= bits;
            }
        }

        let full = self.full_mask();
        masks
            .into_iter()
            .filter(|(_, mask)| *mask == full)
            .map(|(fp, _)| fp)
            .collect()
    }
}

/// `(1 << n) - 1` without overflowing at 64 terms
pub fn full_mask(terms: usize) -> u64 {
    if terms >= 64 {
        u64::MAX
    } else {
        (1u64 << terms) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_selector;

    fn condition(text: &str) -> SelectorCondition {
        SelectorCondition::compile(&parse_selector(text).unwrap()).unwrap()
    }

    #[test]
    fn test_full_mask() {
        assert_eq!(full_mask(0), 0);
        assert_eq!(full_mask(1), 1);
        assert_eq!(full_mask(3), 0b111);
        assert_eq!(full_mask(63), u64::MAX >> 1);
        assert_eq!(full_mask(64), u64::MAX);
    }

    #[test]
    fn test_where_and_having_sql() {
        let cond = condition(r#"{a="x", b!="y"}"#);
        assert_eq!(
            cond.where_sql().unwrap(),
            "(key = 'a' AND val = 'x') OR (key = 'b' AND val != 'y')"
        );
        assert_eq!(
            cond.having_sql().unwrap(),
            "groupBitOr(bitShiftLeft(toUInt64((key = 'a' AND val = 'x')), 0) + \
             bitShiftLeft(toUInt64((key = 'b' AND val != 'y')), 1)) = 3"
        );
    }

    #[test]
    fn test_regex_sql() {
        let cond = condition(r#"{a=~"x.*", b!~"y"}"#);
        assert_eq!(
            cond.row_predicate(0).unwrap(),
            "(key = 'a' AND match(val, 'x.*'))"
        );
        assert_eq!(
            cond.row_predicate(1).unwrap(),
            "(key = 'b' AND NOT match(val, 'y'))"
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let cond = condition(r#"{a="x' OR 1=1 --"}"#);
        assert_eq!(
            cond.row_predicate(0).unwrap(),
            "(key = 'a' AND val = 'x\\' OR 1=1 --')"
        );
    }

    #[test]
    fn test_empty_selector_is_unconstrained() {
        let cond = condition("{}");
        assert!(cond.where_sql().is_none());
        assert!(cond.having_sql().is_none());
        let select = cond.apply(Select::new().column("fingerprint").from("gin"));
        assert!(!select.is_grouped());
        assert_eq!(select.condition_count(), 0);
    }

    #[test]
    fn test_apply_groups_by_fingerprint() {
        let cond = condition(r#"{a="x"}"#);
        let sql = cond
            .apply(Select::new().column("fingerprint").from("gin"))
            .to_sql();
        assert!(sql.contains("GROUP BY fingerprint HAVING groupBitOr("));
    }

    #[test]
    fn test_existential_matching() {
        // fp1: a=x, b=y  fp2: a=x, b=z  fp3: a=w
        let rows = vec![
            (1, "a", "x"),
            (1, "b", "y"),
            (2, "a", "x"),
            (2, "b", "z"),
            (3, "a", "w"),
        ];
        let cond = condition(r#"{a="x", b!="y"}"#);
        let selected: Vec<_> = cond.matching_fingerprints(rows.iter().copied()).into_iter().collect();
        assert_eq!(selected, vec![2]);

        let all = condition("{}");
        assert_eq!(all.matching_fingerprints(rows.iter().copied()).len(), 3);
    }

    #[test]
    fn test_negative_term_needs_label() {
        let rows = vec![(1, "a", "x"), (2, "env", "prod")];
        let cond = condition(r#"{env!="dev"}"#);
        let selected: Vec<_> = cond.matching_fingerprints(rows).into_iter().collect();
        assert_eq!(selected, vec![2]);
    }

    #[test]
    fn test_same_label_terms_independent() {
        // env!="dev" and env!="test": a series with env=prod satisfies both
        let rows = vec![(1, "env", "prod"), (2, "env", "dev")];
        let cond = condition(r#"{env!="dev", env!="test"}"#);
        let selected: Vec<_> = cond.matching_fingerprints(rows).into_iter().collect();
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn test_row_mask() {
        let cond = condition(r#"{env=~"pr.*", env!="dev"}"#);
        assert_eq!(cond.row_mask("env", "prod"), 0b11);
        assert_eq!(cond.row_mask("env", "dev"), 0);
        assert_eq!(cond.row_mask("env", "test"), 0b10);
        assert_eq!(cond.row_mask("other", "prod"), 0);
    }
}
