//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::domain::Strategy;

/// Allocate money across a hierarchy of buckets so every bucket lands on its target ratio
#[derive(Parser, Debug)]
#[command(name = "bucketsolve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Config file (replaces ./.bucketsolve.toml)
    #[arg(
        short,
        long,
        global = true,
        env = "BUCKETSOLVE_CONFIG",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve a bucket file and print the result
    Solve(SolveArgs),

    /// Check a bucket file without solving
    Validate {
        /// Bucket file (.yaml, .yml, .csv); falls back to the configured input
        #[arg(value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
    },

    /// Print the bucket tree as loaded
    Show {
        /// Bucket file (.yaml, .yml, .csv); falls back to the configured input
        #[arg(value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct SolveArgs {
    /// Bucket file (.yaml, .yml, .csv); falls back to the configured input
    #[arg(value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// unconstrained | constrained | montecarlo
    #[arg(short, long)]
    pub strategy: Option<Strategy>,

    /// Monte Carlo step, the smallest amount that can be added
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Amount to distribute; overrides the root's amount_to_add
    #[arg(short, long, allow_negative_numbers = true)]
    pub pool: Option<f64>,

    /// Monte Carlo seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Monte Carlo iteration budget per sibling set
    #[arg(long)]
    pub max_iterations: Option<u64>,

    /// Rescale sibling ratios to sum to 1
    #[arg(long)]
    pub normalize: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Create config file with template
    Init {
        /// Create global config instead of ./.bucketsolve.toml
        #[arg(short, long)]
        global: bool,
    },
    /// Show config file locations
    Path,
}
