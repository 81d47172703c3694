// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator commands that read or change the queue.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use queuectl_config::QueuectlConfig;
use queuectl_jobs::{DeadLetterQueue, JobError, JobQueue, JobState, JobSubmission};
use serde::Serialize;

use crate::output;
use crate::supervisor;

#[derive(Debug, Clone)]
pub struct EnqueueArgs {
	pub id: String,
	pub command: String,
	pub timeout_ms: Option<u64>,
	pub priority: i64,
	pub run_at: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DDTHH:MM:SS`, read as UTC.
pub fn parse_run_at(s: &str) -> Result<DateTime<Utc>, String> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
		return Ok(dt.with_timezone(&Utc));
	}
	for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
			return Ok(naive.and_utc());
		}
	}
	Err(format!(
		"invalid timestamp '{s}', expected RFC 3339 such as 2025-06-01T12:00:00Z"
	))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!(
		"{}",
		serde_json::to_string_pretty(value).context("failed to encode JSON output")?
	);
	Ok(())
}

pub async fn enqueue(queue: &JobQueue, config: &QueuectlConfig, args: EnqueueArgs) -> Result<()> {
	let timeout = args
		.timeout_ms
		.map(Duration::from_millis)
		.unwrap_or_else(|| config.worker.default_timeout());
	let mut submission = JobSubmission::new(args.id, args.command)
		.with_timeout(timeout)
		.with_priority(args.priority);
	if let Some(run_at) = args.run_at {
		submission = submission.with_run_at(run_at);
	}

	match queue.submit(submission, Utc::now()).await {
		Ok(job) => {
			println!("Enqueued job '{}'", job.id);
			if let Some(run_at) = job.run_at {
				println!("Scheduled for {}", output::format_time(run_at));
			}
			Ok(())
		}
		Err(JobError::DuplicateJob(id)) => {
			bail!("job '{id}' already exists; choose a different --id")
		}
		Err(e) => Err(e).context("failed to enqueue job"),
	}
}

pub async fn list(queue: &JobQueue, state: JobState, json: bool) -> Result<()> {
	let jobs = queue.list(state).await.context("failed to list jobs")?;
	if json {
		return print_json(&jobs);
	}
	print!("{}", output::jobs_table(&jobs));
	Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
	counts: &'a [queuectl_jobs::StateCount],
	workers: Vec<u32>,
}

pub async fn status(queue: &JobQueue, config: &QueuectlConfig, json: bool) -> Result<()> {
	let snapshot = queue.snapshot(0).await.context("failed to read queue status")?;
	let workers: Vec<u32> = supervisor::running_workers(&config.worker.pid_dir)?
		.into_iter()
		.map(|f| f.pid)
		.collect();

	if json {
		return print_json(&StatusReport {
			counts: &snapshot.counts,
			workers,
		});
	}

	print!("{}", output::counts_table(&snapshot));
	println!();
	if workers.is_empty() {
		println!("No active workers.");
	} else {
		let pids: Vec<String> = workers.iter().map(u32::to_string).collect();
		println!("Active workers ({}): {}", workers.len(), pids.join(", "));
	}
	Ok(())
}

pub async fn stats(queue: &JobQueue, config: &QueuectlConfig, json: bool) -> Result<()> {
	let snapshot = queue
		.snapshot(config.dashboard.recent_limit)
		.await
		.context("failed to read queue statistics")?;
	if json {
		return print_json(&snapshot);
	}

	print!("{}", output::counts_table(&snapshot));
	println!();
	print!("{}", output::execution_summary(snapshot.execution.as_ref()));
	Ok(())
}

pub async fn dlq_list(queue: &JobQueue, json: bool) -> Result<()> {
	let dead = DeadLetterQueue::new(queue.clone())
		.list()
		.await
		.context("failed to list dead-letter queue")?;
	if json {
		return print_json(&dead);
	}
	print!("{}", output::jobs_table(&dead));
	Ok(())
}

pub async fn dlq_retry(queue: &JobQueue, id: &str) -> Result<()> {
	match DeadLetterQueue::new(queue.clone())
		.requeue(id, Utc::now())
		.await
	{
		Ok(job) => {
			println!("Job '{}' moved back to pending", job.id);
			Ok(())
		}
		Err(JobError::NotFound(_)) => bail!("job '{id}' not found in the dead-letter queue"),
		Err(e) => Err(e).context("failed to requeue job"),
	}
}

pub async fn config_set(queue: &JobQueue, key: &str, value: &str) -> Result<()> {
	queue
		.set_setting(key, value, Utc::now())
		.await
		.with_context(|| format!("failed to set '{key}'"))?;
	println!("Set {} = {}", queuectl_db::normalize_key(key), value);
	Ok(())
}

pub async fn config_show(
	queue: &JobQueue,
	config: &QueuectlConfig,
	config_path: Option<&Path>,
) -> Result<()> {
	let settings = queue.settings().await.context("failed to load queue settings")?;
	let entries = queue.setting_entries().await?;

	println!("Queue settings:");
	println!("  max_retries  = {}", settings.max_retries);
	println!("  backoff_base = {}", settings.backoff_base);
	let extra: Vec<_> = entries
		.iter()
		.filter(|(k, _)| {
			k.as_str() != queuectl_db::MAX_RETRIES_KEY && k.as_str() != queuectl_db::BACKOFF_BASE_KEY
		})
		.collect();
	for (key, value) in extra {
		println!("  {key} = {value}");
	}

	println!();
	println!("Process configuration:");
	if let Some(path) = config_path {
		println!("  file               = {}", path.display());
	}
	println!("  database.url       = {}", config.database.url);
	println!("  worker.poll_ms     = {}", config.worker.poll_interval_ms);
	println!("  worker.timeout_ms  = {}", config.worker.default_timeout_ms);
	println!("  worker.pid_dir     = {}", config.worker.pid_dir.display());
	println!("  logging.level      = {}", config.logging.level);
	println!("  logging.format     = {}", config.logging.format);
	println!("  dashboard.address  = {}", config.dashboard.socket_addr());
	Ok(())
}
