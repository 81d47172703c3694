// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Serialize;

use crate::types::{ExecutionStats, Job, JobState, StateCount};

/// Point-in-time view of the queue for `status`, `stats` and the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
	pub counts: Vec<StateCount>,
	pub execution: Option<ExecutionStats>,
	pub recent: Vec<Job>,
}

impl QueueSnapshot {
	pub fn count(&self, state: JobState) -> u64 {
		self.counts
			.iter()
			.find(|c| c.state == state)
			.map(|c| c.count)
			.unwrap_or(0)
	}

	pub fn total(&self) -> u64 {
		self.counts.iter().map(|c| c.count).sum()
	}
}
