// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use queuectl_db::{ExecutionStats, Job, JobState, QueueSettings, StateCount};

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_millis(30_000);

/// A job as submitted by a client.
#[derive(Debug, Clone)]
pub struct JobSubmission {
	pub id: String,
	pub command: String,
	pub timeout: Duration,
	pub priority: i64,
	pub run_at: Option<DateTime<Utc>>,
}

impl JobSubmission {
	pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			command: command.into(),
			timeout: DEFAULT_JOB_TIMEOUT,
			priority: 0,
			run_at: None,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_priority(mut self, priority: i64) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
		self.run_at = Some(run_at);
		self
	}
}

/// Result of running one job command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
	Succeeded { stdout: String },
	Failed { detail: String },
}

impl ExecutionOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, ExecutionOutcome::Succeeded { .. })
	}
}
