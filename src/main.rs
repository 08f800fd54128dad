use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use agent_jobs::config::Config;
use agent_jobs::job::{JobStatus, SubmitRequest};
use agent_jobs::runner::JobService;

#[derive(Parser, Debug)]
#[command(name = "agent-jobs", version, about = "Run a coding agent against git repositories as tracked jobs")]
struct Cli {
    /// Configuration file (defaults to ~/.agent-jobs/config.yml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a task
    Run {
        task: String,
        /// Repository to clone and work in
        #[arg(long, default_value = "")]
        repo: String,
        /// Profile name (unknown or empty uses the default)
        #[arg(long, default_value = "")]
        profile: String,
        #[arg(long, default_value = "main")]
        base_ref: String,
        /// Agent session to resume
        #[arg(long)]
        session: Option<String>,
        /// Print the finished job instead of the queued one
        #[arg(long)]
        wait: bool,
    },
    /// Show one job
    Get { id: String },
    /// Most recent jobs first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        status: Option<JobStatus>,
    },
    /// Cancel a queued or running job
    Cancel { id: String },
    /// Show available profiles
    Profiles,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr, plus a daily rolling file when `AGENT_JOBS_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("AGENT_JOBS_LOG_DIR").ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "agent-jobs.log"));
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry().with(filter).with(stderr).with(file).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let service = JobService::from_config(&config).context("initializing job service")?;

    match cli.command {
        Command::Run {
            task,
            repo,
            profile,
            base_ref,
            session,
            wait,
        } => {
            let req = SubmitRequest {
                task,
                repo_url: repo,
                profile,
                base_ref,
                wait,
                session_id: session,
            };
            let response = service.submit(req).await;
            print_json(&response)?;
            // A background job still needs this process to live.
            service.shutdown().await;
        }
        Command::Get { id } => print_json(&service.get(&id).await)?,
        Command::List { limit, status } => print_json(&service.list(limit, status).await)?,
        Command::Cancel { id } => print_json(&service.cancel(&id).await)?,
        Command::Profiles => print_json(&service.profiles().await)?,
    }

    Ok(())
}
