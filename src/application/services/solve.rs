//! Solve service
//!
//! Loads a bucket file, builds the tree and runs one solver pass over it.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::loader::{self, Format};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{
    solve, BucketArena, BucketSpec, DomainError, SolveParams, SolveReport, Strategy, TreeBuilder,
};
use crate::infrastructure::traits::FileSystem;

/// Everything a solve needs besides the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveRequest {
    pub strategy: Strategy,
    pub params: SolveParams,
    pub ratio_tolerance: f64,
    pub normalize_ratios: bool,
}

impl From<&Settings> for SolveRequest {
    fn from(settings: &Settings) -> Self {
        Self {
            strategy: settings.strategy,
            params: SolveParams {
                pool: None,
                step_size: settings.step_size,
                max_iterations: settings.max_iterations,
                seed: settings.seed,
            },
            ratio_tolerance: settings.ratio_tolerance,
            normalize_ratios: settings.normalize_ratios,
        }
    }
}

impl SolveRequest {
    fn builder(&self) -> TreeBuilder {
        TreeBuilder::new()
            .with_tolerance(self.ratio_tolerance)
            .with_normalized_ratios(self.normalize_ratios)
    }
}

/// Input tree and its solved counterpart.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub input: BucketArena,
    pub solved: BucketArena,
    pub report: SolveReport,
}

/// Service for loading and solving bucket trees.
pub struct SolveService {
    fs: Arc<dyn FileSystem>,
}

impl SolveService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read and parse a bucket file; the format follows the extension.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> ApplicationResult<Vec<BucketSpec>> {
        if !self.fs.exists(path) {
            return Err(ApplicationError::InputNotFound(path.to_path_buf()));
        }
        let format = Format::from_path(path)?;
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read input", path)?;
        loader::load_source(&content, format, &path.display().to_string())
    }

    /// Load and validate without solving.
    pub fn load_tree(&self, path: &Path, request: &SolveRequest) -> ApplicationResult<BucketArena> {
        let specs = self.load(path)?;
        debug!("building tree from {} records", specs.len());
        let arena = request.builder().build(&specs).map_err(DomainError::from)?;
        Ok(arena)
    }

    pub fn solve(&self, path: &Path, request: &SolveRequest) -> ApplicationResult<SolveOutcome> {
        let input = self.load_tree(path, request)?;
        self.solve_tree(input, request)
    }

    /// Solve an already built tree; `input` is kept unchanged in the outcome.
    pub fn solve_tree(&self, input: BucketArena, request: &SolveRequest) -> ApplicationResult<SolveOutcome> {
        let mut solved = input.clone();
        let report = solve(&mut solved, request.strategy, &request.params)?;
        info!(
            "{}: allocated {:.2}, unallocated {:.2}",
            request.strategy, report.allocated, report.unallocated
        );
        Ok(SolveOutcome {
            input,
            solved,
            report,
        })
    }
}
