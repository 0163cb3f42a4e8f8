use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use brand_pipeline::config::{self, BrandPipelineConfig};
use brand_pipeline::flow;
use brand_pipeline::guard;
use brand_pipeline::invalidate;
use brand_pipeline::log::parse_log_level;
use brand_pipeline::migration;
use brand_pipeline::report;
use brand_pipeline::routes;
use brand_pipeline::step_result::{self, StepResultUpdate};
use brand_pipeline::storage::{FileStorage, Scope};
use brand_pipeline::store::PipelineStore;
use brand_pipeline::types::{parse_step, BrandId, Candidate};
use brand_pipeline::{log_debug, log_info};

#[derive(Parser)]
#[command(name = "brand-pipeline", about = "Brand consulting pipeline state tool")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/brand-pipeline.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User whose records are accessed (defaults to scope.default_user)
    #[arg(long)]
    user: Option<String>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the pipeline, flow state, and completed stages
    Status,
    /// Check whether a stage may be viewed now
    Access {
        /// Stage to check (naming, concept, story, logo)
        step: String,
        /// Also enforce the active flow's no-backward rule
        #[arg(long)]
        strict: bool,
    },
    /// Record candidates and/or a selection for a stage
    Select {
        /// Stage to update
        step: String,
        /// Selected candidate id
        #[arg(long)]
        id: Option<String>,
        /// Candidate list as a JSON array of objects with an `id`
        #[arg(long)]
        candidates: Option<String>,
        /// Denormalized selected candidate as a JSON object
        #[arg(long)]
        selected: Option<String>,
    },
    /// Clear a stage and every stage after it
    ClearFrom {
        /// First stage to clear
        step: String,
    },
    /// Drive the strict brand flow
    Flow {
        #[command(subcommand)]
        action: FlowAction,
    },
    /// Fold legacy records into the pipeline
    Migrate,
    /// List report history
    History {
        /// Record a snapshot first if the pipeline is complete
        #[arg(long)]
        seed: bool,
    },
    /// Resolve a route to its stage
    Route {
        /// Path to resolve
        path: String,
    },
    /// Discard the pipeline, stage records, and diagnosis records
    Reset,
}

#[derive(Subcommand)]
enum FlowAction {
    /// Start a fresh run, wiping stage data
    Start {
        /// External brand identifier
        #[arg(long)]
        brand_id: Option<String>,
    },
    /// Point the run at a stage
    Set {
        step: String,
    },
    /// Move to the next stage, completing after logo
    Advance,
    /// Abort the run, wiping stage data
    Abort {
        #[arg(long, default_value = "user_abort")]
        reason: String,
    },
    /// Mark the run complete, keeping stage data
    Complete,
    /// Request a deferred abort
    RequestAbort {
        #[arg(long, default_value = "external_event")]
        reason: String,
    },
    /// Check and clear a deferred abort request
    ConsumeAbort,
}

fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => brand_pipeline::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = config::load_config_from(cli.config.as_deref(), &cli.root)?;
    let store = open_store(&cli.root, &config, cli.user.as_deref());
    log_debug!("[cli] scope {}", store.scope());

    match cli.command {
        Commands::Status => handle_status(&store),
        Commands::Access { step, strict } => handle_access(&store, &step, strict),
        Commands::Select {
            step,
            id,
            candidates,
            selected,
        } => handle_select(&store, &step, id, candidates, selected),
        Commands::ClearFrom { step } => {
            let step = parse_step(&step)?;
            print_json(&invalidate::clear_steps_from(&store, step))
        }
        Commands::Flow { action } => handle_flow(&store, action),
        Commands::Migrate => print_json(&migration::migrate_legacy_to_pipeline_if_needed(&store)),
        Commands::History { seed } => handle_history(&store, &config, seed),
        Commands::Route { path } => print_json(&json!({
            "path": &path,
            "isFlowRoute": routes::is_flow_route(&path),
            "step": routes::step_for_route(&path),
        })),
        Commands::Reset => {
            invalidate::reset_all(&store);
            println!("Reset {}", store.scope());
            Ok(())
        }
    }
}

fn open_store(root: &Path, config: &BrandPipelineConfig, user: Option<&str>) -> PipelineStore {
    let data_dir = root.join(&config.storage.data_dir);
    let scope = Scope::new(user.unwrap_or(&config.scope.default_user));
    PipelineStore::new(Arc::new(FileStorage::new(data_dir)), scope)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to encode output: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn handle_status(store: &PipelineStore) -> Result<(), String> {
    let pipeline = migration::migrate_legacy_to_pipeline_if_needed(store);
    print_json(&json!({
        "scope": store.scope().as_str(),
        "flow": flow::status(&pipeline),
        "completed": step_result::completed_steps(&pipeline),
        "allComplete": step_result::is_all_complete(&pipeline),
        "pipeline": pipeline,
    }))
}

/// Mirrors a guarded render: reconcile legacy data, apply any pending abort,
/// then ask the guard.
fn handle_access(store: &PipelineStore, step: &str, strict: bool) -> Result<(), String> {
    let step = parse_step(step)?;
    migration::migrate_legacy_to_pipeline_if_needed(store);

    if strict {
        let reason = store
            .read()
            .brand_flow
            .and_then(|f| f.pending_reason)
            .unwrap_or_else(|| "pending_abort".to_string());
        if flow::consume_pending_abort(store) {
            log_info!("[cli] applying pending abort: {}", reason);
            flow::abort(store, &reason);
        }
        print_json(&guard::check_strict_step_access(store, step))
    } else {
        print_json(&guard::check_step_access(store, step))
    }
}

fn handle_select(
    store: &PipelineStore,
    step: &str,
    id: Option<String>,
    candidates: Option<String>,
    selected: Option<String>,
) -> Result<(), String> {
    let step = parse_step(step)?;

    let candidates = candidates
        .map(|raw| {
            serde_json::from_str::<Vec<Candidate>>(&raw)
                .map_err(|e| format!("Invalid --candidates JSON: {}", e))
        })
        .transpose()?;
    let selected = selected
        .map(|raw| {
            serde_json::from_str::<Candidate>(&raw)
                .map_err(|e| format!("Invalid --selected JSON: {}", e))
        })
        .transpose()?;

    if candidates.is_none() && id.is_none() && selected.is_none() {
        return Err("Nothing to record: pass --candidates, --id, or --selected".to_string());
    }

    let is_selection = id.is_some() || selected.is_some();
    let update = StepResultUpdate {
        candidates,
        selected_id: id,
        selected,
    };

    let pipeline = if is_selection {
        step_result::select_and_invalidate(store, step, update)
    } else {
        step_result::set_step_result(store, step, update)
    };
    print_json(&pipeline)
}

fn handle_flow(store: &PipelineStore, action: FlowAction) -> Result<(), String> {
    match action {
        FlowAction::Start { brand_id } => {
            let brand_id = brand_id.as_deref().map(BrandId::from);
            print_json(&flow::start(store, brand_id))
        }
        FlowAction::Set { step } => print_json(&flow::set_current(store, &step)),
        FlowAction::Advance => print_json(&flow::advance(store)),
        FlowAction::Abort { reason } => print_json(&flow::abort(store, &reason)),
        FlowAction::Complete => print_json(&flow::complete(store)),
        FlowAction::RequestAbort { reason } => print_json(&json!({
            "recorded": flow::mark_pending_abort(store, &reason),
        })),
        FlowAction::ConsumeAbort => print_json(&json!({
            "pending": flow::consume_pending_abort(store),
        })),
    }
}

fn handle_history(
    store: &PipelineStore,
    config: &BrandPipelineConfig,
    seed: bool,
) -> Result<(), String> {
    if seed {
        migration::migrate_legacy_to_pipeline_if_needed(store);
        if report::ensure_history_seeded(store, config.history.max_entries).is_none() {
            log_info!("[cli] no new history entry");
        }
    }
    print_json(&report::list_history(store))
}
