//! Siteplan CLI entrypoint.
//!
//! This is the main entrypoint for the siteplan command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use siteplan::cli::{Cli, Commands, OutputFormatter};
use siteplan::config::{
    ConfigParser, ConfigValidator, SiteplanConfig, ValidationResult, find_config_file, load_sites,
};
use siteplan::error::{Result, SiteplanError};
use siteplan::executor::{ExecutionEngine, ExecutionStatus, HandlerRegistry, RollbackEngine};
use siteplan::naming::NamingProfile;
use siteplan::planner::{Blueprint, PlanBuilder};
use siteplan::remote::InventoryRemote;
use siteplan::state::{LocalSnapshotStore, SnapshotStore, STATE_DIR};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

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
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate {
            sites,
            warnings,
            remote,
        } => cmd_validate(config, sites.as_deref(), warnings, remote, &formatter).await,
        Commands::Plan {
            sites,
            no_lookup,
            detailed,
        } => cmd_plan(config, &sites, no_lookup, detailed, &formatter).await,
        Commands::Show { plan_id, detailed } => {
            cmd_show(config, plan_id, detailed, &formatter).await
        }
        Commands::Apply { plan_id, dry_run, yes } => {
            cmd_apply(config, plan_id, dry_run, yes, &formatter).await
        }
        Commands::Executions => cmd_executions(config, &formatter).await,
        Commands::Status { plan_id } => cmd_status(config, plan_id, &formatter).await,
        Commands::Rollback {
            plan_id,
            dry_run,
            yes,
        } => cmd_rollback(config, &plan_id, dry_run, yes, &formatter).await,
        Commands::Unlock { plan_id, force } => cmd_unlock(config, &plan_id, force, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new siteplan project in: {}", path.display());

    let config_path = path.join("siteplan.yaml");
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let files: [(&str, &str); 5] = [
        ("siteplan.yaml", include_str!("../templates/siteplan.yaml")),
        ("naming.yaml", include_str!("../templates/naming.yaml")),
        ("dialplan.yaml", include_str!("../templates/dialplan.yaml")),
        ("sites.yaml", include_str!("../templates/sites.yaml")),
        (".env.example", include_str!("../templates/env.example")),
    ];
    for (name, content) in files {
        let target = path.join(name);
        std::fs::write(&target, content)?;
        eprintln!("Created: {}", target.display());
    }

    let gitignore_path = path.join(".gitignore");
    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# siteplan")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit naming.yaml and sites.yaml for your sites");
    eprintln!("  2. Run 'siteplan validate --sites sites.yaml' to check them");
    eprintln!("  3. Run 'siteplan plan' to see what will be provisioned");
    eprintln!("  4. Run 'siteplan apply --dry-run' to rehearse the plan");

    Ok(())
}

/// Validate configuration, templates and optionally site records.
async fn cmd_validate(
    config_path: Option<&Path>,
    sites: Option<&Path>,
    show_warnings: bool,
    check_remote: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = read_config(config_path)?;
    let validator = ConfigValidator::new();
    let mut result = validator.check(&config);

    let profile = match NamingProfile::load(config.naming_path()) {
        Ok(profile) => {
            validator.check_naming(&profile, &mut result);
            Some(profile)
        }
        Err(e) => {
            result.add_error("templates.naming", e.to_string());
            None
        }
    };

    let blueprint = match load_blueprint(&config) {
        Ok(blueprint) => {
            if let Some(blueprint) = &blueprint {
                validator.check_blueprint(blueprint, &mut result);
            }
            blueprint
        }
        Err(e) => {
            result.add_error("templates.dialplan", e.to_string());
            None
        }
    };

    if let (Some(sites), Some(profile)) = (sites, &profile) {
        check_sites(&config, sites, profile, blueprint.as_ref(), &mut result);
    }

    if check_remote {
        match &blueprint {
            Some(blueprint) => match open_inventory(&config).await {
                Ok(inventory) => {
                    let report = blueprint.verify_globals(&inventory.snapshot().await);
                    validator.check_globals(&report, &mut result);
                }
                Err(e) => result.add_error("remote.inventory", e.to_string()),
            },
            None => result
                .warnings
                .push(String::from("No dialplan blueprint configured; global partitions not checked")),
        }
    }

    println!("{}", formatter.format_validation(&result, show_warnings));
    result.into_result().map(|_| ())
}

/// Plans site records offline and reports rejected rows as errors.
fn check_sites(
    config: &SiteplanConfig,
    sites: &Path,
    profile: &NamingProfile,
    blueprint: Option<&Blueprint>,
    result: &mut ValidationResult,
) {
    let rows = match load_sites(config.resolve(sites)) {
        Ok(rows) => rows,
        Err(e) => {
            result.add_error("sites", e.to_string());
            return;
        }
    };

    let mut builder = PlanBuilder::new(profile, &config.project.org, &config.project.environment);
    if let Some(blueprint) = blueprint {
        builder = builder.with_blueprint(blueprint);
    }
    let outcome = builder.build(&rows);

    for error in &outcome.errors {
        result.add_error("sites", error.to_string());
    }
    debug!(
        "{} of {} site records plan cleanly",
        outcome.plan.site_count,
        rows.len()
    );
}

/// Build and save a plan.
async fn cmd_plan(
    config_path: Option<&Path>,
    sites: &Path,
    no_lookup: bool,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);

    let profile = NamingProfile::load(config.naming_path())?;
    let blueprint = load_blueprint(&config)?;
    let rows = load_sites(config.resolve(sites))?;

    let snapshot = if no_lookup {
        None
    } else {
        Some(open_inventory(&config).await?.snapshot().await)
    };

    let mut builder = PlanBuilder::new(&profile, &config.project.org, &config.project.environment);
    if let Some(blueprint) = &blueprint {
        builder = builder.with_blueprint(blueprint);
    }
    if let Some(snapshot) = &snapshot {
        builder = builder.with_lookup(snapshot);
    }
    let outcome = builder.build(&rows);

    store.save_plan(&outcome.plan).await?;

    println!("{}", formatter.format_plan(&outcome.plan, detailed));
    if !outcome.is_clean() {
        println!(
            "{}",
            formatter.format_plan_problems(&outcome.errors, &outcome.warnings)
        );
    }
    eprintln!("Saved plan {}. Run 'siteplan apply {}' to execute it.", outcome.plan.plan_id, outcome.plan.plan_id);

    Ok(())
}

/// Show a saved plan.
async fn cmd_show(
    config_path: Option<&Path>,
    plan_id: Option<String>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);
    let plan_id = resolve_plan_id(&store, plan_id).await?;

    let plan = store
        .load_plan(&plan_id)
        .await?
        .ok_or(SiteplanError::PlanNotFound { plan_id })?;

    println!("{}", formatter.format_plan(&plan, detailed));
    Ok(())
}

/// Execute a saved plan.
async fn cmd_apply(
    config_path: Option<&Path>,
    plan_id: Option<String>,
    dry_run: bool,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);
    let plan_id = resolve_plan_id(&store, plan_id).await?;

    let plan = store
        .load_plan(&plan_id)
        .await?
        .ok_or(SiteplanError::PlanNotFound { plan_id })?;

    if plan.is_empty() {
        eprintln!("Plan {} creates nothing; recording execution anyway.", plan.plan_id);
    }

    let apply = !dry_run;
    if apply && !auto_approve && !confirm(&format!("Apply plan {}?", plan.plan_id))? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let remote = open_inventory(&config).await?;
    let registry = HandlerRegistry::with_defaults();
    let engine = ExecutionEngine::new(&store, &registry)
        .with_executable_types(config.execution.executable_types.iter().copied())
        .with_dependency_policy(config.execution.on_dependency_failure);

    let record = engine.execute(&plan, &remote, apply).await?;
    println!("{}", formatter.format_execution(&record));

    if record.status == ExecutionStatus::Failed {
        return Err(SiteplanError::internal(format!(
            "Execution of plan {} failed",
            record.plan_id
        )));
    }
    Ok(())
}

/// List recorded executions.
async fn cmd_executions(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);

    let executions = store.list_executions().await?;
    print!("{}", formatter.format_executions(&executions));
    Ok(())
}

/// Show execution and rollback progress.
async fn cmd_status(
    config_path: Option<&Path>,
    plan_id: Option<String>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);
    let plan_id = resolve_plan_id(&store, plan_id).await?;

    match store.load_execution(&plan_id).await? {
        Some(record) => {
            if let Some(plan) = store.load_plan(&plan_id).await?
                && !record.matches_plan(&plan)
            {
                warn!("Plan {plan_id} has changed since it was executed");
            }
            println!("{}", formatter.format_execution(&record));
        }
        None => eprintln!("Plan {plan_id} has not been executed."),
    }

    if let Some(record) = store.load_rollback(&plan_id).await? {
        println!("{}", formatter.format_rollback(&record));
    }

    if let Some(lock) = store.get_lock_info(&plan_id).await? {
        println!("{}", formatter.format_lock(&plan_id, Some(&lock)));
    }

    Ok(())
}

/// Roll back an execution.
async fn cmd_rollback(
    config_path: Option<&Path>,
    plan_id: &str,
    dry_run: bool,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);

    let apply = !dry_run;
    if apply
        && !auto_approve
        && !confirm(&format!("Remove every object created by plan {plan_id}?"))?
    {
        eprintln!("Rollback cancelled.");
        return Ok(());
    }

    let remote = open_inventory(&config).await?;
    let record = RollbackEngine::new(&store)
        .rollback(plan_id, &remote, apply)
        .await?;

    println!("{}", formatter.format_rollback(&record));
    Ok(())
}

/// Show or remove a plan lock.
async fn cmd_unlock(
    config_path: Option<&Path>,
    plan_id: &str,
    force: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config);

    let Some(lock) = store.get_lock_info(plan_id).await? else {
        println!("{}", formatter.format_lock(plan_id, None));
        return Ok(());
    };

    if force || lock.is_expired() {
        if !lock.is_expired() {
            warn!("Forcefully removing active {} lock held by {}", lock.operation, lock.holder);
        }
        store.force_unlock(plan_id).await?;
        eprintln!("Plan {plan_id} unlocked.");
    } else {
        println!("{}", formatter.format_lock(plan_id, Some(&lock)));
        eprintln!("Use --force to remove an active lock.");
    }

    Ok(())
}

/// Asks for confirmation on stderr.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => find_config_file(std::env::current_dir()?),
    }
}

/// Loads and validates configuration.
fn load_config(config_path: Option<&Path>) -> Result<SiteplanConfig> {
    let config = read_config(config_path)?;
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Reads configuration, applying `.env` and environment overrides.
fn read_config(config_path: Option<&Path>) -> Result<SiteplanConfig> {
    let config_file = resolve_config_path(config_path)?;
    let base = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    parser.load_with_env(&config_file)
}

fn load_blueprint(config: &SiteplanConfig) -> Result<Option<Blueprint>> {
    config.dialplan_path().map(Blueprint::load).transpose()
}

fn open_store(config: &SiteplanConfig) -> LocalSnapshotStore {
    LocalSnapshotStore::with_base_dir(config.state_dir())
}

async fn open_inventory(config: &SiteplanConfig) -> Result<InventoryRemote> {
    InventoryRemote::open(
        config.inventory_path(),
        config.remote.supported_types.iter().copied(),
    )
    .await
}

/// Uses the given plan id or falls back to the most recent plan.
async fn resolve_plan_id(store: &LocalSnapshotStore, plan_id: Option<String>) -> Result<String> {
    if let Some(id) = plan_id {
        return Ok(id);
    }

    store
        .list_plans()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SiteplanError::internal("No saved plans. Run 'siteplan plan' first."))
}
