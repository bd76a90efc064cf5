//! Domain entities: core data structures

use std::fmt;

use regex::Regex;

/// Prefix marking a child reference as a pattern instead of an exact label.
pub const PATTERN_PREFIX: &str = "regex::";

/// Separator used when children are serialized into a single field.
pub const CHILDREN_SEPARATOR: char = ';';

/// Declarative description of one bucket, as produced by a loader.
///
/// Children are kept as raw references here; the builder turns them into
/// [`ChildRef`]s and resolves them against the full set of labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BucketSpec {
    pub label: String,
    pub current_value: f64,
    pub optimal_ratio: f64,
    pub amount_to_add: f64,
    pub children: Vec<String>,
}

impl BucketSpec {
    pub fn new(label: impl Into<String>, current_value: f64, optimal_ratio: f64) -> Self {
        Self {
            label: label.into(),
            current_value,
            optimal_ratio,
            ..Default::default()
        }
    }

    pub fn with_pool(mut self, amount_to_add: f64) -> Self {
        self.amount_to_add = amount_to_add;
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }
}

/// Split a serialized children field (`A;B;C`) into its references.
///
/// Whitespace around each reference is trimmed and empty parts are dropped.
pub fn split_children(value: &str) -> Vec<String> {
    value
        .split(CHILDREN_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reference from a parent to one or more children.
#[derive(Debug, Clone)]
pub enum ChildRef {
    /// Exactly one bucket with this label.
    Exact(String),
    /// Every other bucket whose label matches, anchored at the start.
    Pattern(Regex),
}

impl ChildRef {
    /// Parse a raw reference. `regex::<pattern>` becomes a pattern, anything
    /// else an exact label.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        match raw.strip_prefix(PATTERN_PREFIX) {
            Some(pattern) => Ok(Self::Pattern(Regex::new(&format!("^(?:{})", pattern))?)),
            None => Ok(Self::Exact(raw.to_string())),
        }
    }
}

impl PartialEq for ChildRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Data payload for a node of the bucket tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: String,
    /// Amount already held
    pub current_value: f64,
    /// Target share of the parent's post-allocation total
    pub optimal_ratio: f64,
    /// Pool before solving (roots only), own contribution after solving
    pub amount_to_add: f64,
    /// `current_value + amount_to_add`, set by a solver
    pub results_value: Option<f64>,
    /// `results_value / parent.results_value`, set by a solver
    pub results_ratio: Option<f64>,
}

impl Bucket {
    pub fn is_solved(&self) -> bool {
        self.results_value.is_some()
    }
}

impl From<&BucketSpec> for Bucket {
    fn from(spec: &BucketSpec) -> Self {
        Self {
            label: spec.label.clone(),
            current_value: spec.current_value,
            optimal_ratio: spec.optimal_ratio,
            amount_to_add: spec.amount_to_add,
            results_value: None,
            results_ratio: None,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}
