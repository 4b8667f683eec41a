use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ralph_core::paths::ProjectPaths;
use ralph_core::EventBus;
use ralph_quota::manager::QuotaManager;
use ralph_tracking::{CostTracker, LearningRecorder};
use ralph_types::ExecutionMode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ralph-ultra")]
#[command(about = "Local control plane that drives autonomous coding agents through acceptance-criteria verification")]
struct Cli {
    /// Project directory holding prd.json (defaults to the current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the next open story, or a specific one with --story.
    Run {
        #[arg(long)]
        story: Option<String>,
        #[arg(long, default_value = "balanced")]
        mode: String,
    },
    /// Retries the in-progress story from its paused state.
    Retry {
        #[arg(long, default_value = "balanced")]
        mode: String,
    },
    /// Stops the running story and persists pause state.
    Stop,
    /// Prints the engine's current process state.
    Status,
    /// Regenerates and prints the execution plan without launching anything.
    Plan {
        #[arg(long, default_value = "balanced")]
        mode: String,
    },
    /// Prints the current per-provider quota snapshot.
    Quota {
        /// Forces a fresh probe instead of serving the cached snapshot.
        #[arg(long)]
        refresh: bool,
    },
}

fn parse_mode(raw: &str) -> anyhow::Result<ExecutionMode> {
    match raw {
        "balanced" => Ok(ExecutionMode::Balanced),
        "super-saver" | "supersaver" => Ok(ExecutionMode::SuperSaver),
        "fast-delivery" | "fastdelivery" => Ok(ExecutionMode::FastDelivery),
        other => anyhow::bail!("unknown execution mode {other:?}; expected balanced, super-saver, or fast-delivery"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_root = cli.project.unwrap_or_else(|| PathBuf::from("."));
    let paths = ProjectPaths::new(project_root.clone());

    let _log_guard = ralph_observability::init_process_logging(&paths.logs_dir())?;
    info!(project = %project_root.display(), "ralph-ultra starting");

    let bus = EventBus::new();
    let quota_manager = Arc::new(QuotaManager::new(bus.clone()));
    let cost_tracker = Arc::new(CostTracker::load(ralph_core::paths::cost_history_path()).await);
    let learning_recorder = Arc::new(LearningRecorder::load(ralph_core::paths::learning_path(), bus.clone()).await);

    let engine = ralph_engine::Engine::new(
        project_root,
        bus,
        quota_manager.clone(),
        cost_tracker.clone(),
        learning_recorder.clone(),
    );

    match cli.command {
        Command::Run { story, mode } => {
            engine.run(story, parse_mode(&mode)?).await?;
            println!("run started; use `status` to poll progress");
        }
        Command::Retry { mode } => {
            engine.retry_current(parse_mode(&mode)?).await?;
            println!("retry started");
        }
        Command::Stop => {
            engine.stop().await?;
            println!("stop signaled");
        }
        Command::Status => {
            let status = engine.get_status().await;
            println!(
                "process_state={} current_story_id={:?} current_session_id={:?} iterations_this_story={} retries_this_story={}",
                status.process_state,
                status.current_story_id,
                status.current_session_id,
                status.iterations_this_story,
                status.retries_this_story,
            );
        }
        Command::Plan { mode } => {
            let prd: ralph_types::Prd = ralph_core::read_json(&paths.prd())
                .await
                .map_err(|e| anyhow::anyhow!("missing or invalid PRD at {:?}: {e}", paths.prd()))?;
            let plan = ralph_planner::execution_planner::generate_plan_with_manager(
                &prd,
                &quota_manager,
                parse_mode(&mode)?,
                Some(learning_recorder.as_ref()),
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Quota { refresh } => {
            let quotas = if refresh {
                quota_manager.refresh(true).await
            } else {
                quota_manager.snapshot().await
            };
            println!("{}", serde_json::to_string_pretty(&quotas)?);
        }
    }

    Ok(())
}
