//! Thin driver binary over the orchestrator library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::error;
use tracing_subscriber::EnvFilter;

use promethean::checkpoint::CheckpointManager;
use promethean::cycle::{ArchitectSet, CycleConfig, CycleEvent, CycleRunner};
use promethean::session::{Methodology, Session, Status};
use promethean::{ArchitectId, PrometheanError, UiLang};

#[derive(Parser)]
#[command(
    name = "promethean",
    version,
    about = "Unattended multi-iteration code generation",
    long_about = "Drives an external architect CLI (claude or gemini) through \
                  repeated development cycles until the project plan is done, \
                  checkpointing along the way so interrupted runs can resume."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new session and run it until it stops
    Run {
        /// Project working directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// The project plan text
        #[arg(short, long, conflicts_with = "plan_file")]
        plan: Option<String>,

        /// Read the project plan from a file
        #[arg(long)]
        plan_file: Option<PathBuf>,

        /// UI language for notices
        #[arg(short, long, value_enum, default_value_t = UiLang::En)]
        lang: UiLang,

        /// Architect to start with
        #[arg(short, long, value_enum, default_value_t = ArchitectId::Claude)]
        architect: ArchitectId,

        /// Development methodology
        #[arg(short, long, value_enum, default_value_t = Methodology::Tdd)]
        methodology: Methodology,

        /// Failsafe ceiling on cycles
        #[arg(long, default_value_t = promethean::cycle::MAX_CYCLES)]
        max_cycles: u32,
    },

    /// Resume a checkpointed session
    Resume {
        /// Session id (see `promethean status`)
        session_id: String,

        /// Re-supply the plan text (checkpoints do not carry it)
        #[arg(short, long)]
        plan: Option<String>,

        /// Failsafe ceiling on cycles
        #[arg(long, default_value_t = promethean::cycle::MAX_CYCLES)]
        max_cycles: u32,
    },

    /// List resumable sessions
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Run {
            dir,
            plan,
            plan_file,
            lang,
            architect,
            methodology,
            max_cycles,
        } => run(dir, plan, plan_file, lang, architect, methodology, max_cycles).await,
        Command::Resume {
            session_id,
            plan,
            max_cycles,
        } => resume(&session_id, plan, max_cycles).await,
        Command::Status => status(),
    };

    if let Err(e) = outcome {
        error!(error = %e, "fatal");
        eprintln!("{} {e}", "error:".red().bold());
        let code = e
            .downcast_ref::<PrometheanError>()
            .map_or(1, PrometheanError::exit_code);
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "promethean=info",
        1 => "promethean=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[allow(clippy::too_many_arguments)]
async fn run(
    dir: PathBuf,
    plan: Option<String>,
    plan_file: Option<PathBuf>,
    lang: UiLang,
    architect: ArchitectId,
    methodology: Methodology,
    max_cycles: u32,
) -> Result<()> {
    let plan_text = match (plan, plan_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading plan file {}", path.display()))?,
        (None, None) => anyhow::bail!("a plan is required: pass --plan or --plan-file"),
    };

    let dir = dir
        .canonicalize()
        .with_context(|| format!("resolving working directory {}", dir.display()))?;

    let mut session = Session::new(&dir)
        .with_lang(lang)
        .with_architect(architect)
        .with_methodology(methodology);
    session.set_plan(plan_text)?;
    session.handle_user_message("START THE ENGINES")?;

    println!(
        "{} session {} in {}",
        "starting".green().bold(),
        session.id.cyan(),
        dir.display()
    );

    let architects = ArchitectSet::for_dir(&dir);
    drive(session, architects, max_cycles).await
}

async fn resume(session_id: &str, plan: Option<String>, max_cycles: u32) -> Result<()> {
    let checkpoints = CheckpointManager::new()?;
    let checkpoint = checkpoints
        .load(session_id)?
        .ok_or_else(|| PrometheanError::checkpoint(session_id, "no checkpoint on disk"))?;

    let mut session = Session::new(&checkpoint.working_dir);
    session.id = checkpoint.session_id.clone();
    if let Some(text) = plan {
        session.set_plan(text)?;
    }

    println!(
        "{} session {} at cycle {}",
        "resuming".green().bold(),
        session_id.cyan(),
        checkpoint.cycle_count
    );

    let architects = ArchitectSet::for_dir(&checkpoint.working_dir);
    let checkpoints = CheckpointManager::new()?;
    let mut runner = CycleRunner::new(session, architects, checkpoints).with_config(CycleConfig {
        max_cycles,
        ..CycleConfig::default()
    });
    runner.resume_from(&checkpoint);
    finish(run_runner(runner).await?)
}

async fn drive(mut session: Session, architects: ArchitectSet, max_cycles: u32) -> Result<()> {
    session.set_status(Status::Running);
    let checkpoints = CheckpointManager::new()?;
    let runner = CycleRunner::new(session, architects, checkpoints).with_config(CycleConfig {
        max_cycles,
        ..CycleConfig::default()
    });
    finish(run_runner(runner).await?)
}

/// Run the loop with an event printer and a ctrl-c handler attached.
async fn run_runner(mut runner: CycleRunner) -> Result<Status> {
    let mut events = runner
        .take_events()
        .context("event stream already taken")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
            if event == CycleEvent::StreamEnd {
                break;
            }
        }
    });

    let stop = runner.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "stop requested; finishing the current cycle".yellow());
            stop.store(true, Ordering::SeqCst);
        }
    });

    // The loop runs on its own worker task; this task just follows along
    let worker = tokio::spawn(async move { runner.run().await });
    let result = worker.await.context("development loop panicked")?;
    let _ = printer.await;
    Ok(result?)
}

fn finish(status: Status) -> Result<()> {
    match status {
        Status::Completed => println!("{}", "project complete".green().bold()),
        Status::Paused => println!(
            "{}",
            "session paused; answer the architect and `promethean resume` to continue".yellow()
        ),
        other => println!("loop ended with status {other:?}"),
    }
    Ok(())
}

fn status() -> Result<()> {
    let checkpoints = CheckpointManager::new()?;
    let ids = checkpoints.list()?;
    if ids.is_empty() {
        println!("no resumable sessions");
        return Ok(());
    }
    for id in ids {
        if let Some(cp) = checkpoints.load(&id)? {
            println!(
                "{}  cycle {:>3}  {:?}  {}",
                id.cyan(),
                cp.cycle_count,
                cp.status,
                cp.working_dir.display()
            );
        }
    }
    Ok(())
}

fn print_event(event: &CycleEvent) {
    match event {
        CycleEvent::Thinking => println!("{}", "· thinking".dimmed()),
        CycleEvent::PhaseTransition(phase) => {
            println!("{} {}", "phase:".blue().bold(), phase);
        }
        CycleEvent::ArchitectPrompt(_) => {
            // Full prompts go to the debug log, not the terminal
        }
        CycleEvent::Output(text) => println!("{text}"),
        CycleEvent::ArchitectChange(architect) => {
            println!("{} {}", "architect:".magenta().bold(), architect);
        }
        CycleEvent::Notice(notice) => println!("{} {notice}", "notice:".yellow().bold()),
        CycleEvent::StreamEnd => {}
    }
}
