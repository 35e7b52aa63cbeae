#![forbid(unsafe_code)]

//! `skillforge`: resumable skill-building pipeline driver.
//!
//! Each invocation loads configuration, opens the session database, and
//! performs one operation against a skill. Ctrl-C or SIGTERM cancels any
//! running agents and releases this instance's locks before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use skillforge::agent::{spawn_event_logger, AgentManager, EVENT_CHANNEL_CAPACITY};
use skillforge::persistence::db;
use skillforge::workflow::{DispatchOutcome, DispatchRequest, Router};
use skillforge::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "skillforge", about = "Skill-building pipeline orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a signal and advance the skill by one step.
    Dispatch {
        /// Skill name.
        #[arg(long)]
        skill: String,
        /// Free-text signal, e.g. "continue" or "start fresh".
        #[arg(default_value = "")]
        signal: String,
        /// Skill type recorded on a new session.
        #[arg(long)]
        skill_type: Option<String>,
        /// Domain recorded on a new session.
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show detected phase, steps and agent runs.
    Status {
        /// Skill name; all sessions when omitted.
        #[arg(long)]
        skill: Option<String>,
    },
    /// Evaluate clarification answers without changing anything.
    Evaluate {
        /// Skill name.
        #[arg(long)]
        skill: String,
    },
    /// Fill unanswered clarifications from their recommendations.
    Autofill {
        /// Skill name.
        #[arg(long)]
        skill: String,
    },
    /// List held skill locks.
    Locks,
    /// Remove locks whose holder process is gone.
    ReclaimLocks,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(skills_root = %config.skills_root.display(), "configuration loaded");

    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let event_logger = spawn_event_logger(event_rx);
    let agents = AgentManager::new(config.sidecar.clone(), event_tx);
    let router = Router::new(&config, Arc::clone(&db), agents);

    let result = tokio::select! {
        result = execute(&router, args.command) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Err(AppError::Agent("interrupted".into()))
        }
    };

    graceful_shutdown(&router).await;
    drop(router);
    let _ = event_logger.await;
    result
}

async fn execute(router: &Router, command: Command) -> Result<()> {
    match command {
        Command::Dispatch {
            skill,
            signal,
            skill_type,
            domain,
        } => {
            let reclaimed = router.locks().reclaim_stale().await?;
            if !reclaimed.is_empty() {
                info!(?reclaimed, "reclaimed stale locks on startup");
            }
            let mut request = DispatchRequest::new(skill, signal);
            request.skill_type = skill_type;
            request.domain = domain;
            let outcome = router.dispatch(request).await?;
            print_json(&outcome_json(&outcome));
        }
        Command::Status { skill: Some(skill) } => {
            let status = router.status(&skill).await?;
            print_json(&json!({
                "skill_name": skill,
                "phase": status.detection.phase,
                "persisted_phase": status.detection.persisted,
                "corrected": status.detection.corrected,
                "session": status.session,
                "steps": status.steps,
                "runs": status.runs,
            }));
        }
        Command::Status { skill: None } => {
            let sessions = router.store().list_all().await?;
            let rows: Vec<_> = sessions
                .iter()
                .map(|s| {
                    json!({
                        "skill_name": s.skill_name,
                        "phase": s.current_phase,
                        "mode": s.mode,
                        "last_activity": s.last_activity.to_rfc3339(),
                    })
                })
                .collect();
            print_json(&json!(rows));
        }
        Command::Evaluate { skill } => {
            let report = router.evaluate(&skill)?;
            print_json(&json!(report));
        }
        Command::Autofill { skill } => {
            let filled = router.auto_fill(&skill).await?;
            print_json(&json!({ "skill_name": skill, "filled": filled }));
        }
        Command::Locks => {
            let locks = router.locks().list_locked().await?;
            print_json(&json!(locks));
        }
        Command::ReclaimLocks => {
            let reclaimed = router.locks().reclaim_stale().await?;
            print_json(&json!({ "reclaimed": reclaimed }));
        }
    }
    Ok(())
}

fn outcome_json(outcome: &DispatchOutcome) -> serde_json::Value {
    let agents: Vec<_> = outcome
        .agents
        .iter()
        .map(|agent| {
            json!({
                "agent_id": agent.agent_id,
                "status": agent.status,
                "exit_code": agent.exit_code,
                "total_cost": agent.total_cost(),
                "usage": agent.usage(),
                "session_id": agent.session_id,
                "reason": agent.reason,
            })
        })
        .collect();
    json!({
        "intent": outcome.intent,
        "phase_before": outcome.phase_before,
        "phase_after": outcome.phase_after,
        "action": outcome.action,
        "agents": agents,
        "report": outcome.report,
        "message": outcome.message,
    })
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => error!(%err, "failed to render output"),
    }
}

/// Cancel running agents and release every lock held by this instance.
async fn graceful_shutdown(router: &Router) {
    let cancelled = router.agents().cancel_all().await;
    match router.locks().release_all().await {
        Ok(released) => info!(cancelled, released, "shutdown complete"),
        Err(err) => warn!(%err, cancelled, "failed to release locks on shutdown"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
