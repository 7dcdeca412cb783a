//! Investigation lifecycle engine.
//!
//! Cases live in `.caseflow/cases/<case_id>.json`. Each `apply` feeds one
//! proposed update (JSON) through the engine and commits the next case state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use caseflow::apply::TurnService;
use caseflow::core::engine::Engine;
use caseflow::core::error::EngineError;
use caseflow::core::escalation::{pending_escalation, route_target};
use caseflow::core::types::CaseStatus;
use caseflow::core::update::ProposedUpdate;
use caseflow::exit_codes;
use caseflow::io::case_store::{CaseStore, FileCaseStore};
use caseflow::io::config::{CaseflowConfig, load_config};
use caseflow::io::content::FileContentResolver;
use caseflow::io::init::{CaseflowPaths, InitOptions, init_workspace};
use caseflow::io::update_schema::parse_update;
use caseflow::lanes::LanePool;
use caseflow::logging;
use caseflow::report::render_case_report;

#[derive(Parser)]
#[command(
    name = "caseflow",
    version,
    about = "Investigation lifecycle engine for troubleshooting cases"
)]
struct Cli {
    /// Project root holding `.caseflow/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.caseflow/` with a default config.
    Init {
        /// Overwrite caseflow-owned files; stored cases are kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Open a new case in `consulting`.
    Open {
        case_id: String,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Apply one proposed update (JSON file) to a case.
    Apply { case_id: String, update: PathBuf },
    /// Request an explicit status change.
    Transition {
        case_id: String,
        status: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Print a Markdown report of a case.
    Show { case_id: String },
    /// Print the escalation state or recommendation for a case.
    Escalation { case_id: String },
    /// Apply every update under `dir/<case_id>/*.json`, cases in parallel.
    Replay { dir: PathBuf },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<EngineError>().is_some())
    {
        exit_codes::REJECTED
    } else {
        exit_codes::INVALID
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Open { case_id, title } => cmd_open(&cli.root, &case_id, &title),
        Command::Apply { case_id, update } => cmd_apply(&cli.root, &case_id, &update),
        Command::Transition {
            case_id,
            status,
            reason,
        } => cmd_transition(&cli.root, &case_id, &status, reason.as_deref()),
        Command::Show { case_id } => cmd_show(&cli.root, &case_id),
        Command::Escalation { case_id } => cmd_escalation(&cli.root, &case_id),
        Command::Replay { dir } => cmd_replay(&cli.root, &dir),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.caseflow_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_open(root: &Path, case_id: &str, title: &str) -> Result<i32> {
    let (_, service) = open_service(root)?;
    let case = service.open_case(case_id, title)?;
    print_json(&case)?;
    Ok(exit_codes::OK)
}

fn cmd_apply(root: &Path, case_id: &str, update_path: &Path) -> Result<i32> {
    let (_, service) = open_service(root)?;
    let raw = fs::read_to_string(update_path)
        .with_context(|| format!("read update {}", update_path.display()))?;
    let result = service
        .apply_raw(case_id, &raw)
        .with_context(|| format!("apply {} to case '{case_id}'", update_path.display()))?;
    print_json(&result)?;
    if result.escalation.is_some() {
        return Ok(exit_codes::ESCALATION);
    }
    Ok(exit_codes::OK)
}

fn cmd_transition(root: &Path, case_id: &str, status: &str, reason: Option<&str>) -> Result<i32> {
    let to: CaseStatus = status.parse().map_err(|err: String| anyhow!(err))?;
    let (_, service) = open_service(root)?;
    let (_, transition) = service
        .transition(case_id, to, reason)
        .with_context(|| format!("transition case '{case_id}' to {to}"))?;
    print_json(&transition)?;
    Ok(exit_codes::OK)
}

fn cmd_show(root: &Path, case_id: &str) -> Result<i32> {
    let (_, service) = open_service(root)?;
    let case = service.load(case_id)?;
    print!("{}", render_case_report(&case)?);
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct EscalationView<'a> {
    case_id: &'a str,
    active: bool,
    trigger: Option<String>,
    reason: Option<String>,
    target: Option<String>,
}

fn cmd_escalation(root: &Path, case_id: &str) -> Result<i32> {
    let (_, service) = open_service(root)?;
    let case = service.load(case_id)?;
    let engine = service.engine();

    let view = if let Some(state) = case.escalation_state.as_ref().filter(|s| s.is_active()) {
        EscalationView {
            case_id,
            active: true,
            trigger: Some(serde_label(&state.trigger)?),
            reason: Some(state.reason.clone()),
            target: Some(state.target.clone()),
        }
    } else if let Some(decision) = pending_escalation(&case, engine.thresholds())
        .filter(|_| !case.is_terminal())
    {
        EscalationView {
            case_id,
            active: false,
            trigger: Some(serde_label(&decision.trigger)?),
            reason: Some(decision.reason),
            target: Some(route_target(&case, engine.routing())),
        }
    } else {
        EscalationView {
            case_id,
            active: false,
            trigger: None,
            reason: None,
            target: None,
        }
    };
    print_json(&view)?;
    if view.trigger.is_some() {
        return Ok(exit_codes::ESCALATION);
    }
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct ReplaySummary {
    case_id: String,
    turns_applied: usize,
    status: CaseStatus,
    escalated: bool,
}

/// One case's replay input, opened and parsed before any turn runs.
struct ReplayCase {
    case_id: String,
    status: CaseStatus,
    updates: Vec<(PathBuf, ProposedUpdate)>,
}

fn cmd_replay(root: &Path, dir: &Path) -> Result<i32> {
    let (cfg, service) = open_service(root)?;
    let mut cases = Vec::new();
    for (case_id, files) in replay_plan(dir)? {
        cases.push(prepare_replay(&service, case_id, &files)?);
    }
    let service = Arc::new(service);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .build()
        .context("start replay runtime")?;
    let summaries = runtime.block_on(async move {
        let pool = Arc::new(LanePool::new(service, cfg.lanes));
        let mut tasks = Vec::new();
        for case in cases {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move { replay_case(&pool, case).await }));
        }
        let mut summaries = Vec::new();
        for task in tasks {
            summaries.push(task.await.context("replay task failed")??);
        }
        if let Ok(pool) = Arc::try_unwrap(pool) {
            pool.shutdown().await;
        }
        Ok::<_, anyhow::Error>(summaries)
    })?;

    let escalated = summaries.iter().any(|s| s.escalated);
    print_json(&summaries)?;
    if escalated {
        return Ok(exit_codes::ESCALATION);
    }
    Ok(exit_codes::OK)
}

/// Open the case if it is new and parse its update files.
fn prepare_replay(
    service: &TurnService,
    case_id: String,
    files: &[PathBuf],
) -> Result<ReplayCase> {
    let status = if service.store().exists(&case_id)? {
        service.load(&case_id)?.status
    } else {
        service.open_case(&case_id, &case_id)?.status
    };
    let mut updates = Vec::with_capacity(files.len());
    for file in files {
        let raw =
            fs::read_to_string(file).with_context(|| format!("read update {}", file.display()))?;
        let update = parse_update(&raw).with_context(|| format!("parse {}", file.display()))?;
        updates.push((file.clone(), update));
    }
    Ok(ReplayCase {
        case_id,
        status,
        updates,
    })
}

async fn replay_case(pool: &LanePool, case: ReplayCase) -> Result<ReplaySummary> {
    let ReplayCase {
        case_id,
        mut status,
        updates,
    } = case;
    let mut escalated = false;
    let turns_applied = updates.len();
    for (file, update) in updates {
        let result = pool
            .submit(&case_id, update)
            .await
            .with_context(|| format!("apply {} to case '{case_id}'", file.display()))?;
        escalated |= result.escalation.is_some();
        status = result.case.status;
    }
    Ok(ReplaySummary {
        case_id,
        turns_applied,
        status,
        escalated,
    })
}

/// Case directories under `dir` and their update files, both in name order.
fn replay_plan(dir: &Path) -> Result<Vec<(String, Vec<PathBuf>)>> {
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read replay dir {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(case_id) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let mut files = Vec::new();
        for file in fs::read_dir(&path).with_context(|| format!("read {}", path.display()))? {
            let file = file?.path();
            if file.extension().and_then(|ext| ext.to_str()) == Some("json") {
                files.push(file);
            }
        }
        files.sort();
        cases.push((case_id.to_string(), files));
    }
    cases.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(cases)
}

fn open_service(root: &Path) -> Result<(CaseflowConfig, TurnService)> {
    let paths = CaseflowPaths::new(root);
    paths.ensure_initialized()?;
    let cfg = load_config(&paths.config_path)?;
    let store: Arc<dyn CaseStore> = Arc::new(FileCaseStore::new(&paths.cases_dir));
    let resolver = Arc::new(FileContentResolver::new(
        &paths.root,
        cfg.content_limit_bytes,
    ));
    let service = TurnService::new(
        Engine::new(cfg.thresholds.clone(), cfg.routing.clone()),
        store,
    )
    .with_resolver(resolver)
    .with_turn_log(&paths.turns_dir);
    Ok((cfg, service))
}

fn serde_label<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(label) => Ok(label),
        other => Ok(other.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}
