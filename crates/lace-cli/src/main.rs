//! `lace`: the non-interactive CLI entry point over the conversation
//! engine core (§4.M, §6). Argument parsing, logging sinks, and provider
//! name resolution live here as external collaborators of the core; the
//! turn loop itself is entirely `lace-agent`'s.

mod cli_args;
mod error;
mod logging;
mod provider;
mod tools;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use lace_agent::{Agent, DelegateCoordinator, DelegateTool, EngineConfig, NonInteractiveRunner, RunnerOptions};
use lace_core::store::{InMemoryThreadStore, SqliteThreadStore};
use lace_core::{ThreadManager, ThreadStore};
use lace_tools::{ApprovalGate, Tool, ToolExecutor, ToolRegistry};

use cli_args::CliArgs;
use clap::Parser;
use error::CliError;
use provider::CliProviderFactory;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    if let Err(err) = logging::init(&args.log_level, args.log_file.as_deref()) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: CliArgs) -> Result<(), CliError> {
    let options: RunnerOptions = (&args).into();

    if let Some(har_file) = &options.har_file {
        tracing::debug!(
            path = %har_file.display(),
            "--har-file accepted but unused: no vendor HTTP adapter is linked into this build"
        );
    }

    let mut registry = tools::build_registry(&args);

    if options.list_tools {
        print_tool_list(&registry);
        return Ok(());
    }

    let store = build_store().await?;
    let manager = Arc::new(ThreadManager::new(store.clone()));
    let resume = resolve_thread(&manager, &store, &options).await?;
    if let Some(resume_error) = &resume.resume_error {
        tracing::warn!(error = %resume_error, "could not resume requested thread; starting a new one");
    }

    let provider_name = options.provider.clone().unwrap_or_else(|| "echo".to_string());
    let factory = CliProviderFactory;
    let provider = factory.resolve_cli(&provider_name, options.model.as_deref())?;

    if !args.disable_all_tools {
        let coordinator = Arc::new(DelegateCoordinator::new(
            manager.clone(),
            resume.thread_id.clone(),
            provider.clone(),
            Arc::new(CliProviderFactory),
            &registry,
            EngineConfig::default(),
        ));
        registry.register(Arc::new(DelegateTool::new(coordinator)));
    }

    let approval = Arc::new(ApprovalGate::new(store.clone()));
    tools::apply_approval_policy(&args, &registry, &approval);

    let config = EngineConfig::default();
    let temp_root = lace_agent::get_session_temp_dir(
        &config.temp_dir_root,
        resume.thread_id.root().as_str(),
        "lace-cli",
    );
    let executor = Arc::new(ToolExecutor::new(registry, approval, temp_root));

    let agent = Agent::new(resume.thread_id, store, provider, executor, config);

    let Some(prompt) = options.prompt else {
        println!(
            "No --prompt given; the interactive terminal UI is an external \
             collaborator not built into this core. Pass --prompt \"...\" for \
             a single-turn run, or --list-tools to inspect the tool registry."
        );
        return Ok(());
    };

    let runner = NonInteractiveRunner::new(&agent);
    runner.run(prompt, std::io::stdout()).await?;
    Ok(())
}

struct ResolvedThread {
    thread_id: lace_core::ThreadId,
    resume_error: Option<String>,
}

async fn resolve_thread(
    manager: &ThreadManager,
    store: &Arc<dyn ThreadStore>,
    options: &RunnerOptions,
) -> Result<ResolvedThread, CliError> {
    let outcome = match &options.continue_thread {
        None => manager.resume_or_create(None).await?,
        Some(None) => {
            let latest = store.get_latest_thread_id().await?;
            manager.resume_or_create(latest.as_ref().map(|id| id.as_str())).await?
        }
        Some(Some(id)) => manager.resume_or_create(Some(id.as_str())).await?,
    };
    Ok(ResolvedThread { thread_id: outcome.thread_id, resume_error: outcome.resume_error })
}

/// `--list-tools` (§6): prints each registered tool's name, description,
/// and advisory annotations, then exits without starting an agent.
fn print_tool_list(registry: &ToolRegistry) {
    let mut names = registry.names();
    names.sort();
    for name in &names {
        let Some(tool) = registry.find(name) else { continue };
        let a = tool.annotations();
        println!("{name}: {}", tool.description());
        println!(
            "  destructive={:?} read_only={:?} idempotent={:?} open_world={:?}",
            a.destructive_hint, a.read_only_hint, a.idempotent_hint, a.open_world_hint
        );
    }
    if names.is_empty() {
        println!("(no tools registered)");
    }
}

/// `$LACE_DIR` (default `~/.lace`), used both for the default sqlite path
/// and as the temp-dir root's conceptual home (§6 "Environment variables").
fn lace_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LACE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".lace")
}

/// Builds the persistence backend per `$LACE_TEST_MODE` / `$LACE_DB_PATH`
/// (§6). A sqlite connection failure degrades to in-memory rather than
/// aborting the run (§7 `PersistenceUnavailable`: "warn; continue
/// in-memory so the user never loses the current session").
async fn build_store() -> Result<Arc<dyn ThreadStore>, CliError> {
    if std::env::var("LACE_TEST_MODE").is_ok() {
        return Ok(Arc::new(InMemoryThreadStore::new()));
    }

    let db_path = match std::env::var("LACE_DB_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => lace_dir().join("lace.db"),
    };
    if let Some(parent) = db_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }

    match SqliteThreadStore::connect(&db_path).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %db_path.display(),
                "persistence backend unavailable; continuing in-memory for this run"
            );
            Ok(Arc::new(InMemoryThreadStore::new()))
        }
    }
}
