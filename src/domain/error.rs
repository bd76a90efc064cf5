//! Domain-level errors and warnings

use thiserror::Error;

/// Malformed input tree. Raised once, at build time, before any solving.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("no buckets given")]
    Empty,

    #[error("empty label")]
    EmptyLabel,

    #[error("duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("unknown child '{child}' referenced by {parent}")]
    UnknownChild { parent: String, child: String },

    #[error("pattern '{pattern}' of {parent} matches no bucket")]
    PatternMatchesNothing { parent: String, pattern: String },

    #[error("invalid pattern '{pattern}' of {parent}: {message}")]
    InvalidPattern {
        parent: String,
        pattern: String,
        message: String,
    },

    #[error("bucket {0} lists itself as a child")]
    SelfReference(String),

    #[error("bucket {child} has more than one parent: {first} and {second}")]
    MultipleParents {
        child: String,
        first: String,
        second: String,
    },

    #[error("cycle detected in hierarchy: {0}")]
    CycleDetected(String),

    #[error("negative or non-finite current_value for {label}: {value}")]
    InvalidCurrentValue { label: String, value: f64 },

    #[error("optimal_ratio for {label} outside [0, 1]: {value}")]
    InvalidRatio { label: String, value: f64 },

    #[error("optimal_ratio of the children of {parent} sums to {sum}, expected 1")]
    RatiosDoNotSum { parent: String, sum: f64 },

    #[error("current_value of {label} is {declared} but its children hold {children}")]
    InnerValueMismatch {
        label: String,
        declared: f64,
        children: f64,
    },

    #[error("amount_to_add given on inner bucket {label}: {value} (only roots take a pool)")]
    SeedOnInnerNode { label: String, value: f64 },

    #[error("pool override is ambiguous for a forest with {0} roots")]
    AmbiguousPool(usize),
}

/// A strategy cannot satisfy its constraints for the given pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InfeasibleError {
    #[error("negative pool {pool} at {label}: withdrawals are not permitted")]
    NegativePool { label: String, pool: f64 },

    #[error("pool {pool} at {label} is smaller than one step of {step_size}")]
    PoolBelowStep {
        label: String,
        pool: f64,
        step_size: f64,
    },

    #[error("invalid step size: {0}")]
    InvalidStepSize(f64),
}

/// Domain errors represent business logic violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("invalid bucket tree: {0}")]
    Validation(#[from] ValidationError),

    #[error("infeasible allocation: {0}")]
    Infeasible(#[from] InfeasibleError),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Non-fatal: the Monte Carlo search ran out of budget before placing every
/// step by sampling. The remaining steps were placed greedily, so the
/// allocation is usable but approximate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceWarning {
    /// Parent of the sibling set
    pub label: String,
    /// Steps placed by sampling before the budget ran out
    pub placed: u64,
    /// Steps to place
    pub steps: u64,
    /// Iterations spent
    pub iterations: u64,
    /// Squared ratio deviation of the returned allocation
    pub objective: f64,
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: iteration budget exhausted after {} iterations ({} of {} steps sampled), objective {:.3e}",
            self.label, self.iterations, self.placed, self.steps, self.objective
        )
    }
}
