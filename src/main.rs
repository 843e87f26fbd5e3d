//! Deckhand CLI entrypoint.
//!
//! This is the main entrypoint for the deckhand command-line tool.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use deckhand::cli::{Cli, Commands, OutputFormatter, RunFlags, code_source};
use deckhand::config::{ConfigParser, ConfigValidator, DeckhandConfig, find_config_file};
use deckhand::error::{DeckhandError, Result};
use deckhand::orchestrator::{
    ApplicationBuilder, ApplicationDeployer, BuildRequest, CodeSource, DeployRequest,
    local_capabilities, local_runner,
};
use deckhand::planner::{PlanHasher, PlanKind, PlanNormalizer};
use deckhand::runner::StepRegistry;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan { kind } => cmd_plan(config_path, kind, &formatter),
        Commands::Build { build_id, run } => cmd_build(config_path, build_id, &run, &formatter).await,
        Commands::Deploy {
            build,
            repo,
            snapshot,
            refresh,
            allow_full_rollback,
            yes,
            run,
        } => {
            let request =
                run.deploy_request(code_source(build, repo, snapshot), refresh, allow_full_rollback);
            cmd_deploy(config_path, &request, yes, &formatter).await
        }
        Commands::Rollback {
            kind,
            build_id,
            allow_full_rollback,
            yes,
            options,
        } => {
            let extra: BTreeMap<String, String> = options.into_iter().collect();
            cmd_rollback(config_path, kind, build_id, allow_full_rollback, extra, yes, &formatter)
                .await
        }
    }
}

/// Initialize a new configuration.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing Deckhand configuration in: {}", path.display());

    let config_path = path.join("deckhand.yaml");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let template = include_str!("../templates/deckhand.yaml");
    std::fs::write(&config_path, template)?;
    eprintln!("Created: {}", config_path.display());

    eprintln!("\nNext steps:");
    eprintln!("  1. Edit deckhand.yaml with your application and plans");
    eprintln!("  2. Run 'deckhand validate' to check your configuration");
    eprintln!("  3. Run 'deckhand plan' to see the normalized deploy plan");
    eprintln!("  4. Run 'deckhand deploy' to deploy");

    Ok(())
}

/// Validate configuration and plans.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = Arc::new(StepRegistry::with_builtins());

    let result = ConfigValidator::new()
        .with_registry(Arc::clone(&registry))
        .with_capabilities(local_capabilities(&config).available())
        .check(&config);

    let hasher = PlanHasher::new();
    let fingerprints: Vec<(String, String)> = [PlanKind::Build, PlanKind::Deploy]
        .into_iter()
        .filter_map(|kind| {
            let raw = config.plan(kind)?;
            let plan = PlanNormalizer::new(&registry, kind).normalize(raw).ok()?;
            Some((kind.to_string(), hasher.hash_plan(&plan)))
        })
        .collect();

    eprintln!(
        "{}",
        formatter.format_validation(&result, &fingerprints, show_warnings)
    );

    eprintln!("Application: {}", config.application.name);
    eprintln!("  Environment: {}", config.application.environment);
    eprintln!("  Code root: {}", config.application.code_root.display());
    eprintln!("  Strategy: {}", config.application.strategy);

    if result.is_valid() {
        Ok(())
    } else {
        Err(DeckhandError::internal(format!(
            "{} validation error(s)",
            result.error_count()
        )))
    }
}

/// Show a normalized plan.
fn cmd_plan(config_path: Option<&PathBuf>, kind: PlanKind, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let raw = config
        .plan(kind)
        .ok_or_else(|| DeckhandError::internal(format!("No {kind} plan configured")))?;

    let registry = StepRegistry::with_builtins();
    let plan = PlanNormalizer::new(&registry, kind).normalize(raw)?;

    eprintln!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Run the build plan.
async fn cmd_build(
    config_path: Option<&PathBuf>,
    build_id: Option<String>,
    flags: &RunFlags,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_validated_config(config_path)?;
    let runner = local_runner(&config, Arc::new(StepRegistry::with_builtins()));
    let builder = ApplicationBuilder::from_config(&config, runner)?;

    let report = builder.build(&flags.build_request(build_id)).await?;

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

/// Run the deploy plan.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    request: &DeployRequest,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_validated_config(config_path)?;
    let runner = local_runner(&config, Arc::new(StepRegistry::with_builtins()));
    let deployer = ApplicationDeployer::from_config(&config, runner)?;

    let prompt = format!(
        "Deploy {} ({}) with {}? [y/N]: ",
        config.application.name,
        config.application.environment,
        ApplicationDeployer::conditions(request)
    );
    if !auto_approve && !confirm(&prompt)? {
        eprintln!("Deploy cancelled.");
        return Ok(());
    }

    let report = deployer.deploy(request).await?;

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

/// Run only the rollback lists of a plan.
async fn cmd_rollback(
    config_path: Option<&PathBuf>,
    kind: PlanKind,
    build_id: Option<String>,
    allow_full_rollback: bool,
    extra: BTreeMap<String, String>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_validated_config(config_path)?;

    let prompt = format!(
        "Run the {kind} rollback steps of {}? [y/N]: ",
        config.application.name
    );
    if !auto_approve && !confirm(&prompt)? {
        eprintln!("Rollback cancelled.");
        return Ok(());
    }

    let runner = local_runner(&config, Arc::new(StepRegistry::with_builtins()));
    let report = match kind {
        PlanKind::Build => {
            let build_id = build_id
                .ok_or_else(|| DeckhandError::internal("Rolling back a build needs --build-id"))?;
            let builder = ApplicationBuilder::from_config(&config, runner)?;
            let request = BuildRequest {
                build_id: Some(build_id.clone()),
                extra,
                ..BuildRequest::default()
            };
            builder.rollback(&request, &build_id).await?
        }
        PlanKind::Deploy => {
            let deployer = ApplicationDeployer::from_config(&config, runner)?;
            let request = DeployRequest {
                source: build_id.map_or(CodeSource::None, |build_id| CodeSource::Build { build_id }),
                allow_full_rollback,
                extra,
                ..DeployRequest::default()
            };
            deployer.rollback(&request).await?
        }
    };

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads configuration with `.env` and environment overrides applied.
fn load_config(config_path: Option<&PathBuf>) -> Result<DeckhandConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;

    parser.load_with_env(&config_file)
}

/// Loads configuration and fails on the first validation error.
fn load_validated_config(config_path: Option<&PathBuf>) -> Result<DeckhandConfig> {
    let config = load_config(config_path)?;
    ConfigValidator::new()
        .with_registry(Arc::new(StepRegistry::with_builtins()))
        .with_capabilities(local_capabilities(&config).available())
        .validate(&config)?;
    Ok(config)
}

/// Asks a yes/no question on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
