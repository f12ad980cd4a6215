//! Core data types shared by the planner, the stores and the result assembler
//!
//! # Key Types
//!
//! - **`Fingerprint`**: Opaque 64-bit series identifier
//! - **`LabelSet`**: Ordered label pairs identifying a series
//! - **`Series`** / **`SeriesPoint`**: Time-bucketed values of one label group
//! - **`ProfileType`**: A discovered profile type
//! - **`TreeNode`** / **`FunctionEntry`** / **`MergedTree`**: Aggregated call-stack tree
//!
//! # Example
//!
//! ```rust
//! use profile_querier::types::LabelSet;
//!
//! let mut labels = LabelSet::new();
//! labels.add("service_name", "api");
//! labels.add("env", "prod");
//! labels.sort();
//!
//! let reduced = labels.reduce(&["env".to_string()]);
//! assert_eq!(reduced.len(), 1);
//! assert_ne!(reduced.fingerprint(), labels.fingerprint());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Series identifier
///
/// Either the stored identity of a series or a value derived by hashing a
/// reduced label set. Callers must treat it as opaque.
pub type Fingerprint = u64;

/// Ordered label pairs
///
/// The canonical form is sorted by name (then value). Duplicated names are
/// kept as-is; the store never produces them for a single series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet {
    /// (name, value) pairs
    pub pairs: Vec<(String, String)>,
}

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Build from pairs, keeping the given order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Append a pair
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Value of the first pair with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sort into canonical order
    pub fn sort(&mut self) {
        self.pairs.sort();
    }

    /// Sorted copy
    pub fn sorted(&self) -> Self {
        let mut copy = self.clone();
        copy.sort();
        copy
    }

    /// Keep only pairs whose name is in `names`, in canonical order
    pub fn reduce(&self, names: &[String]) -> Self {
        let mut reduced = Self {
            pairs: self
                .pairs
                .iter()
                .filter(|(k, _)| names.iter().any(|n| n == k))
                .cloned()
                .collect(),
        };
        reduced.sort();
        reduced
    }

    /// Deterministic hash of the canonical form
    ///
    /// XXH3-64 over the sorted pairs, each string prefixed with its byte
    /// length as a little-endian `u32`. Insertion order does not matter and
    /// the value is stable across builds and platforms. It is not the
    /// store's `cityHash64(tags)`: ids derived in process and ids derived by
    /// the store are never mixed in one result.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Xxh3::new();
        for (name, value) in &self.sorted().pairs {
            for part in [name, value] {
                hasher.update(&(part.len() as u32).to_le_bytes());
                hasher.update(part.as_bytes());
            }
        }
        hasher.digest()
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when there are no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate pairs as string slices
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// One time bucket of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket start in epoch milliseconds
    pub timestamp_ms: i64,
    /// Aggregated value
    pub value: f64,
}

/// A label group and its points in ascending time order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    /// Labels of the group
    pub labels: LabelSet,
    /// Points in ascending bucket order
    pub points: Vec<SeriesPoint>,
}

/// A profile type found in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileType {
    /// Full five-part identifier
    pub id: String,
    /// Profile kind, e.g. `process_cpu`
    pub name: String,
    /// Sample type, e.g. `cpu`
    pub sample_type: String,
    /// Sample unit, e.g. `nanoseconds`
    pub sample_unit: String,
    /// Period type
    pub period_type: String,
    /// Period unit; may be empty for legacy rows
    pub period_unit: String,
}

/// One node of an aggregated call-stack tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeNode {
    /// Parent node id (0 for roots)
    pub parent_id: u64,
    /// Node id
    pub node_id: u64,
    /// Function id, resolved via the function table
    pub function_id: u64,
    /// Self value for the requested sample type
    pub self_value: i64,
    /// Total value for the requested sample type
    pub total_value: i64,
}

impl TreeNode {
    /// Identity used when merging nodes across samples
    pub fn key(&self) -> (u64, u64, u64) {
        (self.parent_id, self.node_id, self.function_id)
    }
}

/// Function table entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// Function id
    pub id: u64,
    /// Symbol name
    pub name: String,
}

/// Merged call-stack tree
///
/// `nodes` are sorted by (parent_id, node_id, function_id) and unique on
/// that key. `functions` is an unordered, deduplicated table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedTree {
    /// Merged nodes
    pub nodes: Vec<TreeNode>,
    /// Function table
    pub functions: Vec<FunctionEntry>,
}

impl MergedTree {
    /// True when no samples matched
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of self values over all nodes
    pub fn total_self(&self) -> i64 {
        self.nodes.iter().map(|n| n.self_value).sum()
    }

    /// Look up a node by its merge key
    pub fn node(&self, parent_id: u64, node_id: u64, function_id: u64) -> Option<&TreeNode> {
        self.nodes
            .iter()
            .find(|n| n.key() == (parent_id, node_id, function_id))
    }
}
