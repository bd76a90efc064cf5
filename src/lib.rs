//! Hierarchical bucket allocation.
//!
//! A pool of money is split over a forest of labelled buckets so that every
//! bucket ends up as close as possible to its target share of its parent.
//! Three strategies are available: a closed form that may withdraw, a
//! non-negative water-filling variant and a discrete Monte Carlo search.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
