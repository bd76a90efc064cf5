//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;
use tracing::{debug, instrument};

use crate::application::services::SolveRequest;
use crate::application::{ApplicationError, IoResultExt};
use crate::cli::args::{Cli, Commands, ConfigCommands, SolveArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{report_rows, BucketArena, TreeRender, View};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Solve(args)) => cmd_solve(&container(cli)?, args),
        Some(Commands::Validate { input }) => cmd_validate(&container(cli)?, input.as_deref()),
        Some(Commands::Show { input }) => cmd_show(&container(cli)?, input.as_deref()),
        Some(Commands::Config { command }) => cmd_config(cli, command),
        Some(Commands::Completion { shell }) => cmd_completion(*shell),
        None => Cli::command()
            .print_help()
            .map_err(|e| InfraError::io("print help", e).into()),
    }
}

fn container(cli: &Cli) -> CliResult<ServiceContainer> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!("settings: {:?}", settings);
    Ok(ServiceContainer::new(settings))
}

fn resolve_input(container: &ServiceContainer, input: Option<&Path>) -> CliResult<PathBuf> {
    input
        .map(Path::to_path_buf)
        .or_else(|| container.settings.input.clone())
        .ok_or_else(|| ApplicationError::NoInput.into())
}

/// Settings first, flags on top.
fn solve_request(container: &ServiceContainer, args: &SolveArgs) -> CliResult<SolveRequest> {
    let mut request = container.solve_request();
    if let Some(strategy) = args.strategy {
        request.strategy = strategy;
    }
    if let Some(step_size) = args.step_size {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(CliError::InvalidArgs(format!(
                "--step-size must be positive, got {}",
                step_size
            )));
        }
        request.params.step_size = step_size;
    }
    if let Some(pool) = args.pool {
        request.params.pool = Some(pool);
    }
    if let Some(seed) = args.seed {
        request.params.seed = Some(seed);
    }
    if let Some(max_iterations) = args.max_iterations {
        request.params.max_iterations = Some(max_iterations);
    }
    if args.normalize {
        request.normalize_ratios = true;
    }
    Ok(request)
}

fn print_tree(arena: &BucketArena, view: View) {
    output::info(&arena.to_tree(view));
}

#[instrument(level = "debug", skip(container))]
fn cmd_solve(container: &ServiceContainer, args: &SolveArgs) -> CliResult<()> {
    let path = resolve_input(container, args.input.as_deref())?;
    let request = solve_request(container, args)?;
    let outcome = container.solve.solve(&path, &request)?;

    output::header("Input");
    print_tree(&outcome.input, View::Input);
    output::info("");
    output::header(&format!("Result ({})", request.strategy));
    print_tree(&outcome.solved, View::Results);
    output::info("");

    let leaves: Vec<_> = report_rows(&outcome.solved)
        .into_iter()
        .filter(|row| row.is_leaf && row.level > 0)
        .collect();
    let width = leaves.iter().map(|r| r.label.len()).max().unwrap_or(0);
    output::header("Contributions");
    for row in &leaves {
        output::amount(&row.label, row.amount_to_add, width);
    }
    output::info("");
    output::action(
        "Allocated",
        &crate::domain::render::format_amount(outcome.report.allocated, 0),
    );
    if outcome.report.unallocated > 0.0 {
        output::action(
            "Unallocated",
            &crate::domain::render::format_amount(outcome.report.unallocated, 0),
        );
    }
    for warning in &outcome.report.warnings {
        output::warning(warning);
    }
    if outcome.report.is_approximate() {
        output::warning("result is approximate");
    }
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_validate(container: &ServiceContainer, input: Option<&Path>) -> CliResult<()> {
    let path = resolve_input(container, input)?;
    let arena = container.solve.load_tree(&path, &container.solve_request())?;
    output::success(&format!(
        "{}: {} buckets, {} tree(s), depth {}",
        path.display(),
        arena.len(),
        arena.roots().len(),
        arena.depth()
    ));
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_show(container: &ServiceContainer, input: Option<&Path>) -> CliResult<()> {
    let path = resolve_input(container, input)?;
    let arena = container.solve.load_tree(&path, &container.solve_request())?;
    print_tree(&arena, View::Input);
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(cli.config.as_deref())?;
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| ApplicationError::Config {
                    message: "cannot determine global config directory".into(),
                })?
            } else {
                local_config_path(Path::new("."))
            };
            let container = ServiceContainer::new(Settings::default());
            if container.fs.exists(&path) {
                return Err(ApplicationError::Config {
                    message: format!("config file already exists: {}", path.display()),
                }
                .into());
            }
            container
                .fs
                .ensure_parent(&path)
                .with_path_context("create config directory", &path)?;
            container
                .fs
                .write(&path, &Settings::template())
                .with_path_context("write config", &path)?;
            output::action("Created", &path.display());
            Ok(())
        }
        ConfigCommands::Path => {
            let describe = |path: &Path| {
                let state = if path.exists() { "exists" } else { "not found" };
                format!("{} ({})", path.display(), state)
            };
            match global_config_path() {
                Some(path) => output::action("Global", &describe(&path)),
                None => output::action("Global", "unavailable"),
            }
            let local = cli
                .config
                .clone()
                .unwrap_or_else(|| local_config_path(Path::new(".")));
            output::action("Local", &describe(&local));
            Ok(())
        }
    }
}

fn cmd_completion(shell: Shell) -> CliResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
