use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tripweave_agent::{render_markdown, WorkflowEngine};
use tripweave_core::config::AppConfig;
use tripweave_core::traits::SessionStore;
use tripweave_core::types::{Session, SessionId, TaskStatus, TravelRequest, WorkflowEvent};
use tripweave_store::SqliteSessionStore;

#[derive(Parser)]
#[command(name = "tripweave", version, about = "Multi-agent travel planning workflow")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tripweave.toml", env = "TRIPWEAVE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip from a JSON travel request
    Run {
        /// Path to the travel request JSON
        #[arg(short, long)]
        request: PathBuf,
        /// Print the session id as soon as the run is created
        #[arg(long)]
        detach: bool,
    },
    /// Continue a session that was interrupted before it finished
    Resume {
        /// Session ID
        id: String,
    },
    /// Show task and negotiation state of a session
    Status {
        /// Session ID
        id: String,
    },
    /// Render the itinerary of a finished session as Markdown
    Show {
        /// Session ID
        id: String,
        /// Print the raw itinerary JSON instead
        #[arg(long)]
        json: bool,
    },
    /// List recent sessions
    List {
        /// Maximum number of sessions
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tripweave=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let store_path = config.store_path();
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&store_path)?);
    let engine = WorkflowEngine::from_config(&config, store);

    match cli.command {
        Commands::Run { request, detach } => run(&engine, &request, detach).await,
        Commands::Resume { id } => {
            let printer = spawn_printer(&engine);
            let session = engine.resume(&SessionId::from_str(&id)).await?;
            printer.await.ok();
            report(&session);
            Ok(())
        }
        Commands::Status { id } => {
            let session = engine.session(&SessionId::from_str(&id)).await?;
            print_status(&session);
            Ok(())
        }
        Commands::Show { id, json } => {
            let session = engine.session(&SessionId::from_str(&id)).await?;
            let Some(itinerary) = &session.itinerary else {
                anyhow::bail!("Session {} has no itinerary yet (status: {})", id, session.status);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(itinerary)?);
            } else {
                print!("{}", render_markdown(itinerary));
            }
            Ok(())
        }
        Commands::List { limit } => {
            let sessions = engine.list(limit).await?;
            if sessions.is_empty() {
                println!("No sessions.");
            }
            for s in sessions {
                println!(
                    "{}  {:<20}  {:<20}  {}",
                    s.id,
                    s.status.as_str(),
                    truncate(&s.destination, 20),
                    s.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
    }
}

async fn run(engine: &WorkflowEngine, path: &Path, detach: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read request {}: {}", path.display(), e))?;
    let request: TravelRequest = serde_json::from_str(&content)?;

    if detach {
        let mut rx = engine.event_bus().subscribe();
        let sid = engine.start(request).await?;
        println!("{}", sid);
        // The run lives on this process; wait for it so the session gets sealed.
        loop {
            match rx.recv().await {
                Ok(WorkflowEvent::RunFinished { session_id, .. })
                | Ok(WorkflowEvent::RunError { session_id, .. })
                    if session_id == sid =>
                {
                    break
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        return Ok(());
    }

    let printer = spawn_printer(engine);
    let session = engine.run(request).await?;
    printer.await.ok();
    report(&session);
    Ok(())
}

/// Print progress events until the run finishes.
fn spawn_printer(engine: &WorkflowEngine) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.event_bus().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if print_event(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn report(session: &Session) {
    info!(session_id = %session.id, status = %session.status, "Run complete");
    if let Some(itinerary) = &session.itinerary {
        print!("{}", render_markdown(itinerary));
    }
    eprintln!("\nSession: {} ({})", session.id, session.status);
}

/// Print one progress line. Returns true once the run is over.
fn print_event(event: &WorkflowEvent) -> bool {
    match event {
        WorkflowEvent::RunStarted { session_id } => eprintln!("[run] started {}", session_id),
        WorkflowEvent::TaskStarted { role, attempt, .. } => {
            eprintln!("[{}] started (attempt {})", role, attempt)
        }
        WorkflowEvent::TaskRetrying {
            role,
            backoff_ms,
            error,
            ..
        } => eprintln!(
            "[{}] retrying in {}ms: {}",
            role,
            backoff_ms,
            truncate(error, 200)
        ),
        WorkflowEvent::TaskSucceeded { role, elapsed_ms, .. } => {
            eprintln!("[{}: ok] {}ms", role, elapsed_ms)
        }
        WorkflowEvent::TaskFailed { role, reason, .. } => {
            eprintln!("[{}: FAILED] {}", role, truncate(reason, 200))
        }
        WorkflowEvent::Negotiation { round, .. } => eprintln!(
            "[negotiation] round {} {}: {} -> {:?}",
            round.seq, round.role, round.proposed, round.verdict
        ),
        WorkflowEvent::AllocationSealed { allocation, .. } => eprintln!(
            "[budget] {:?}: {} of {} after {} round(s)",
            allocation.status, allocation.total, allocation.requested, allocation.rounds
        ),
        WorkflowEvent::RunFinished { status, .. } => {
            eprintln!("[run] finished: {}", status);
            return true;
        }
        WorkflowEvent::RunError { error, .. } => {
            eprintln!("[run] ERROR: {}", error);
            return true;
        }
    }
    false
}

fn print_status(session: &Session) {
    println!("Session:     {}", session.id);
    println!("Destination: {}", session.request.destination);
    println!("Status:      {}", session.status);
    println!("Created:     {}", session.created_at.to_rfc3339());
    if let Some(at) = session.finalized_at {
        println!("Finalized:   {}", at.to_rfc3339());
    }

    println!("\nTasks:");
    for task in session.tasks.values() {
        let status = match task.status {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        let error = task
            .error
            .as_deref()
            .map(|e| format!("  {}", truncate(e, 80)))
            .unwrap_or_default();
        println!(
            "  {:<16} {:<10} attempts={}{}",
            task.role.to_string(),
            status,
            task.attempts,
            error
        );
    }

    if let Some(allocation) = &session.allocation {
        println!(
            "\nBudget: {:?}, {} of {} (ceiling {}), {} round(s)",
            allocation.status,
            allocation.total,
            allocation.requested,
            allocation.ceiling,
            allocation.rounds
        );
        for (role, rounds) in &session.negotiations {
            for r in rounds {
                println!("  #{} {:<14} {} {:?}", r.seq, role.to_string(), r.proposed, r.verdict);
            }
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".tripweave").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    eprintln!("Warning: No config file found, using defaults. See tripweave.toml.example.");
    Ok(AppConfig::default())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
