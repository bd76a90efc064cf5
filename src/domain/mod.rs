//! Domain layer: bucket tree, allocation math and solvers
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod entities;
pub mod error;
pub mod propagate;
pub mod render;
pub mod solver;

pub use arena::{BucketArena, BucketNode};
pub use builder::TreeBuilder;
pub use entities::*;
pub use error::{ConvergenceWarning, DomainError, DomainResult, InfeasibleError, ValidationError};
pub use render::{report_rows, ReportRow, TreeRender, View};
pub use solver::{solve, solve_with, SolveParams, SolveReport, Strategy};
