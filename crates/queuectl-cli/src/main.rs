// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! queuectl - persistent shell-command job queue
//!
//! Jobs are enqueued into a SQLite database shared by any number of worker
//! processes. Workers claim jobs by priority, run them through the shell with
//! a timeout, retry failures with exponential backoff and move exhausted jobs
//! to a dead-letter queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
	fmt::{self, MakeWriter},
	layer::SubscriberExt,
	util::SubscriberInitExt,
	EnvFilter,
};

use queuectl_config::{load_config, load_config_with_file, LogFormat, LoggingConfig, QueuectlConfig};
use queuectl_jobs::{JobQueue, JobState, ShellExecutor, ShutdownToken, Worker, WorkerContext};

mod commands;
mod dashboard;
mod output;
mod shutdown;
mod supervisor;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "queuectl", version, about, long_about = None)]
struct Args {
	/// Path to a TOML config file (default: ./queuectl.toml)
	#[arg(long, global = true, env = "QUEUECTL_CONFIG")]
	config: Option<PathBuf>,

	/// Log filter directive, overrides the configured level
	#[arg(long, global = true)]
	log_level: Option<String>,

	/// Emit logs as JSON
	#[arg(long, global = true)]
	json_logs: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Add a job to the queue
	Enqueue {
		/// Unique job id
		#[arg(long)]
		id: String,

		/// Shell command to run
		#[arg(long)]
		command: String,

		/// Execution timeout in milliseconds
		#[arg(long, value_name = "MS")]
		timeout: Option<u64>,

		/// Higher runs first
		#[arg(long, default_value_t = 0, allow_negative_numbers = true)]
		priority: i64,

		/// Do not run before this time (RFC 3339)
		#[arg(long, value_parser = commands::parse_run_at)]
		run_at: Option<DateTime<Utc>>,
	},

	/// List jobs in one state
	List {
		#[arg(long, default_value = "pending")]
		state: JobState,

		#[arg(long)]
		json: bool,
	},

	/// Job counts by state and active workers
	Status {
		#[arg(long)]
		json: bool,
	},

	/// Job counts and execution durations
	Stats {
		#[arg(long)]
		json: bool,
	},

	/// Inspect or requeue dead jobs
	Dlq {
		#[command(subcommand)]
		command: DlqCommand,
	},

	/// Read or change queue settings
	Config {
		#[command(subcommand)]
		command: ConfigCommand,
	},

	/// Run or manage worker processes
	Worker {
		#[command(subcommand)]
		command: WorkerCommand,
	},

	/// Serve the read-only web dashboard
	Dashboard,

	/// Print version information
	Version,
}

#[derive(Subcommand, Debug)]
enum DlqCommand {
	/// List dead jobs
	List {
		#[arg(long)]
		json: bool,
	},
	/// Move a dead job back to pending with a fresh retry budget
	Retry { id: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
	/// Set a queue setting such as max-retries or backoff-base
	Set { key: String, value: String },
	/// Show queue settings and the resolved process configuration
	Show,
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
	/// Run one worker in the foreground until SIGTERM or ctrl-c
	Run,
	/// Start detached worker processes
	Start {
		#[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
		count: u32,
	},
	/// Stop all detached worker processes
	Stop,
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

/// Resolve configuration under a provisional subscriber so the loader's own
/// events are visible before the configured one is installed.
fn resolve_config_logged<W>(args: &Args, writer: W) -> Result<QueuectlConfig>
where
	W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
	let level = args.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let registry = tracing_subscriber::registry().with(filter);

	if args.json_logs {
		let subscriber = registry.with(fmt::layer().json().with_writer(writer));
		tracing::subscriber::with_default(subscriber, || resolve_config(args))
	} else {
		let subscriber = registry.with(fmt::layer().with_ansi(false).with_writer(writer));
		tracing::subscriber::with_default(subscriber, || resolve_config(args))
	}
}

fn resolve_config(args: &Args) -> Result<QueuectlConfig> {
	let mut config = match &args.config {
		Some(path) => load_config_with_file(path),
		None => load_config(),
	}
	.context("failed to load configuration")?;

	if let Some(level) = &args.log_level {
		config.logging.level = level.clone();
	}
	if args.json_logs {
		config.logging.format = LogFormat::Json;
	}
	Ok(config)
}

async fn open_queue(config: &QueuectlConfig) -> Result<JobQueue> {
	let pool = queuectl_db::create_pool(&config.database.url)
		.await
		.with_context(|| format!("failed to open database {}", config.database.url))?;
	queuectl_db::run_migrations(&pool)
		.await
		.context("failed to run database migrations")?;
	Ok(JobQueue::from_pool(pool))
}

async fn run_worker(queue: JobQueue, config: &QueuectlConfig) -> Result<()> {
	let token = ShutdownToken::new();
	shutdown::install_shutdown_handler(token.clone());

	let worker = Worker::new(
		queue,
		Arc::new(ShellExecutor::new()),
		WorkerContext::new(token),
	)
	.with_poll_interval(config.worker.poll_interval());

	info!(
		worker_id = worker.worker_id(),
		pid = std::process::id(),
		"starting worker"
	);
	worker.run().await.context("worker stopped on a store error")
}

async fn run_dashboard(queue: JobQueue, config: &QueuectlConfig) -> Result<()> {
	let router = dashboard::create_router(dashboard::DashboardState {
		queue,
		recent_limit: config.dashboard.recent_limit,
	});

	let addr = config.dashboard.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	info!(address = %addr, "dashboard listening");
	println!("Dashboard running at http://{addr}");

	axum::serve(listener, router)
		.with_graceful_shutdown(shutdown::shutdown_signal())
		.await
		.context("dashboard server error")?;

	info!("dashboard shut down");
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("queuectl {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	let config = resolve_config_logged(&args, std::io::stderr)?;
	init_tracing(&config.logging);

	match &args.command {
		Command::Worker {
			command: WorkerCommand::Start { count },
		} => {
			let pids = supervisor::start_workers(
				*count,
				&config.worker.pid_dir,
				args.config.as_deref(),
			)?;
			for pid in &pids {
				println!("Started worker pid {pid}");
			}
			return Ok(());
		}
		Command::Worker {
			command: WorkerCommand::Stop,
		} => {
			let report = supervisor::stop_workers(&config.worker.pid_dir)?;
			for pid in &report.signalled {
				println!("Sent SIGTERM to worker pid {pid}");
			}
			for pid in &report.stale {
				println!("Removed stale pid file for {pid}");
			}
			if report.signalled.is_empty() && report.stale.is_empty() {
				println!("No workers running.");
			}
			return Ok(());
		}
		_ => {}
	}

	let queue = open_queue(&config).await?;

	match args.command {
		Command::Enqueue {
			id,
			command,
			timeout,
			priority,
			run_at,
		} => {
			commands::enqueue(
				&queue,
				&config,
				commands::EnqueueArgs {
					id,
					command,
					timeout_ms: timeout,
					priority,
					run_at,
				},
			)
			.await
		}
		Command::List { state, json } => commands::list(&queue, state, json).await,
		Command::Status { json } => commands::status(&queue, &config, json).await,
		Command::Stats { json } => commands::stats(&queue, &config, json).await,
		Command::Dlq { command } => match command {
			DlqCommand::List { json } => commands::dlq_list(&queue, json).await,
			DlqCommand::Retry { id } => commands::dlq_retry(&queue, &id).await,
		},
		Command::Config { command } => match command {
			ConfigCommand::Set { key, value } => commands::config_set(&queue, &key, &value).await,
			ConfigCommand::Show => {
				commands::config_show(&queue, &config, args.config.as_deref()).await
			}
		},
		Command::Worker {
			command: WorkerCommand::Run,
		} => run_worker(queue, &config).await,
		Command::Dashboard => run_dashboard(queue, &config).await,
		Command::Worker { .. } | Command::Version => Ok(()),
	}
}
