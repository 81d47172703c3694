// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Human-readable rendering for command output.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use queuectl_jobs::{ExecutionStats, Job, JobState, QueueSnapshot};

const OUTPUT_PREVIEW_CHARS: usize = 60;

pub fn format_time(ts: DateTime<Utc>) -> String {
	ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// First line of a job's output, shortened for tables.
fn preview(output: Option<&str>) -> String {
	let line = output.and_then(|o| o.lines().next()).unwrap_or("");
	if line.chars().count() > OUTPUT_PREVIEW_CHARS {
		let mut s: String = line.chars().take(OUTPUT_PREVIEW_CHARS - 3).collect();
		s.push_str("...");
		s
	} else {
		line.to_string()
	}
}

pub fn jobs_table(jobs: &[Job]) -> String {
	if jobs.is_empty() {
		return "No jobs.\n".to_string();
	}

	let id_width = jobs.iter().map(|j| j.id.len()).max().unwrap_or(2).max(2);
	let mut out = String::new();
	let _ = writeln!(
		out,
		"{:<id_width$}  {:<10}  {:>8}  {:>8}  {:<19}  {:<19}  OUTPUT",
		"ID", "STATE", "PRIORITY", "ATTEMPTS", "UPDATED", "RUN AT"
	);
	for job in jobs {
		let _ = writeln!(
			out,
			"{:<id_width$}  {:<10}  {:>8}  {:>8}  {:<19}  {:<19}  {}",
			job.id,
			job.state.as_str(),
			job.priority,
			format!("{}/{}", job.attempts, job.max_retries),
			format_time(job.updated_at),
			job.run_at.map(format_time).unwrap_or_else(|| "-".to_string()),
			preview(job.output.as_deref()),
		);
	}
	out
}

pub fn counts_table(snapshot: &QueueSnapshot) -> String {
	let mut out = String::new();
	for state in JobState::ALL {
		let _ = writeln!(out, "{:<12}{:>8}", state.as_str(), snapshot.count(state));
	}
	let _ = writeln!(out, "{:<12}{:>8}", "total", snapshot.total());
	out
}

pub fn execution_summary(stats: Option<&ExecutionStats>) -> String {
	match stats {
		Some(s) => format!(
			"completed jobs: {}\nmin duration: {} ms\navg duration: {:.1} ms\nmax duration: {} ms\n",
			s.completed, s.min_ms, s.avg_ms, s.max_ms
		),
		None => "No completed jobs yet.\n".to_string(),
	}
}
