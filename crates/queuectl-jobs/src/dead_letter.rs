// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use queuectl_db::DbError;
use tracing::{info, instrument};

use crate::error::{JobError, Result};
use crate::queue::JobQueue;
use crate::types::{Job, JobState};

/// Operator view of jobs that exhausted their retries.
#[derive(Clone)]
pub struct DeadLetterQueue {
	queue: JobQueue,
}

impl DeadLetterQueue {
	pub fn new(queue: JobQueue) -> Self {
		Self { queue }
	}

	pub async fn list(&self) -> Result<Vec<Job>> {
		self.queue.list(JobState::Dead).await
	}

	/// Give a dead job a fresh retry budget by moving it back to `pending`
	/// with `attempts` reset. Its last output is kept for reference.
	#[instrument(skip(self))]
	pub async fn requeue(&self, id: &str, now: DateTime<Utc>) -> Result<Job> {
		match self.queue.store().requeue_dead(id, now).await {
			Ok(job) => {
				info!(job_id = %job.id, "Dead job requeued");
				Ok(job)
			}
			Err(DbError::NotFound(_)) => Err(JobError::NotFound(id.to_string())),
			Err(e) => Err(e.into()),
		}
	}
}
