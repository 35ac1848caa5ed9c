use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recipe_forge::backend::registry::BackendRegistry;
use recipe_forge::engine::{Engine, EngineConfig, EngineError, RunOutcome};
use recipe_forge::model::{ModelTier, Recipe, Transition};
use recipe_forge::recipe::{validate_recipe, RecipeCatalog};
use recipe_forge::session::SessionRegistry;
use recipe_forge::RecipeForgeConfig;

/// Drives a recipe-defined agent workflow to completion.
#[derive(Parser, Debug)]
#[command(name = "recipe-forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Recipe id to run. Required unless --list is given.
    recipe_id: Option<String>,

    /// Name of the agent backend to drive.
    #[arg(long)]
    backend: Option<String>,

    /// Default model tier for the run (haiku, sonnet, opus). Overrides the
    /// recipe default but not a per-step override.
    #[arg(long)]
    model: Option<String>,

    /// Overrides the recipe's maxTotalSteps guardrail.
    #[arg(long = "max-steps")]
    max_steps: Option<u32>,

    /// Overrides the recipe's maxStepVisits guardrail.
    #[arg(long = "max-visits")]
    max_visits: Option<u32>,

    /// Working directory passed to the agent process.
    #[arg(long = "working-dir")]
    working_dir: Option<PathBuf>,

    /// Text appended to the agent's system prompt.
    #[arg(long = "system-prompt")]
    system_prompt: Option<String>,

    /// Caps the number of RestartNewSession transitions taken in this run.
    /// Unlimited if omitted.
    #[arg(long = "max-restarts")]
    max_restarts: Option<u32>,

    /// Directory to discover recipe files from.
    #[arg(long = "recipes-dir")]
    recipes_dir: Option<PathBuf>,

    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit structured per-event log lines to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Validate the recipe and print its state-machine structure, then exit
    /// without invoking the agent.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Enumerate the recipes discovered under the recipes directory, then
    /// exit without running anything.
    #[arg(long)]
    list: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn parse_model_tier(raw: &str) -> Result<ModelTier, String> {
    ModelTier::parse(raw)
        .ok_or_else(|| format!("unknown model tier {raw:?} (expected haiku, sonnet, or opus)"))
}

fn print_dry_run(recipe: &Recipe) {
    println!("recipe: {} ({})", recipe.id, recipe.label);
    if !recipe.description.is_empty() {
        println!("  {}", recipe.description.trim());
    }
    println!("initial step: {}", recipe.initial_step);
    println!(
        "guardrails: maxStepVisits={} maxTotalSteps={} exitOnOther={}",
        recipe.guardrails.max_step_visits,
        recipe.guardrails.max_total_steps,
        recipe.guardrails.exit_on_other
    );
    println!("steps:");
    for name in &recipe.step_order {
        let Some(step) = recipe.steps.get(name) else {
            continue;
        };
        println!("  {name}:");
        for outcome in &step.outcomes {
            let transition = step.on_outcome.get(outcome);
            let rendered = match transition {
                Some(Transition::NextStep(next)) => format!("-> {next}"),
                Some(Transition::Exit { reason }) => format!("exit ({reason:?})"),
                Some(Transition::RestartNewSession { recipe_id }) => {
                    format!("restart new session -> {recipe_id}")
                }
                None => "<no transition>".to_string(),
            };
            println!("    {outcome} => {rendered}");
        }
    }
}

fn print_run_outcome(outcome: &RunOutcome) {
    println!("final status: {}", outcome.final_status);
    println!("steps taken: {}", outcome.step_count);
    println!("restarts: {}", outcome.restarts);
}

/// Runs the CLI end to end, mapping every failure to the exit code
/// SPEC_FULL.md §6 assigns it.
async fn run(cli: Cli) -> ExitCode {
    let config = match RecipeForgeConfig::load_with_env(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(5);
        }
    };

    let recipes_dir = cli.recipes_dir.clone().unwrap_or(config.recipes_dir.clone());
    let catalog = match RecipeCatalog::load_from_dir(&recipes_dir) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(5);
        }
    };

    if cli.list {
        for key in catalog.keys() {
            println!("{key}");
        }
        return ExitCode::SUCCESS;
    }

    let Some(recipe_id) = cli.recipe_id.clone() else {
        eprintln!("error: a recipe id is required (or pass --list to enumerate recipes)");
        return ExitCode::from(1);
    };

    if cli.dry_run {
        let recipe = match catalog.get(&recipe_id) {
            Ok(recipe) => recipe,
            Err(err) => {
                eprintln!("configuration error: {err}");
                return ExitCode::from(5);
            }
        };
        let errors = validate_recipe(recipe);
        if !errors.is_empty() {
            eprintln!("recipe {recipe_id:?} failed validation:");
            for error in &errors {
                eprintln!("  - {error}");
            }
            return ExitCode::from(1);
        }
        print_dry_run(recipe);
        return ExitCode::SUCCESS;
    }

    let backend_name = cli.backend.clone().unwrap_or(config.backend.clone());
    let registry = BackendRegistry::with_default();
    let backend = match registry.resolve(&backend_name) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(5);
        }
    };

    let model_override = match &cli.model {
        Some(raw) => match parse_model_tier(raw) {
            Ok(tier) => Some(tier),
            Err(message) => {
                eprintln!("configuration error: {message}");
                return ExitCode::from(5);
            }
        },
        None => config.model,
    };

    let working_dir = cli
        .working_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let engine_config = EngineConfig {
        working_dir,
        model_override,
        system_prompt: cli.system_prompt.clone(),
        env_overrides: Vec::new(),
        max_restarts: cli.max_restarts.or(config.max_restarts),
        max_step_visits_override: cli.max_visits.or(config.guardrails.max_step_visits),
        max_total_steps_override: cli.max_steps.or(config.guardrails.max_total_steps),
    };

    info!(recipe = %recipe_id, backend = %backend_name, "starting run");

    let sessions = SessionRegistry::new();
    let engine = Engine::new(&catalog, Arc::clone(&backend), sessions, engine_config);

    match engine.run(&recipe_id).await {
        Ok(outcome) => {
            print_run_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &EngineError) -> ExitCode {
    let code: i32 = err.exit_code();
    ExitCode::from(code as u8)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli).await
}
