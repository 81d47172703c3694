// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exponential backoff for failed jobs.
//!
//! A failed job becomes eligible again once `base ^ attempts` seconds have
//! passed since its last update. The sweep only moves `failed` jobs back to
//! `pending`; whether a job is dead was already decided when it failed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::queue::JobQueue;
use crate::types::Job;

/// `base ^ attempts` seconds, saturating instead of overflowing.
pub fn backoff_delay(base: u32, attempts: u32) -> Duration {
	let secs = u64::from(base).checked_pow(attempts).unwrap_or(u64::MAX);
	Duration::from_secs(secs)
}

/// When a failed job may be retried. `None` if the delay is beyond any
/// representable instant.
pub fn eligible_at(job: &Job, base: u32) -> Option<DateTime<Utc>> {
	let delay = chrono::Duration::from_std(backoff_delay(base, job.attempts)).ok()?;
	job.updated_at.checked_add_signed(delay)
}

pub fn is_retry_due(job: &Job, base: u32, now: DateTime<Utc>) -> bool {
	eligible_at(job, base).is_some_and(|at| now >= at)
}

/// Returns failed jobs whose backoff has elapsed to `pending`.
#[derive(Clone)]
pub struct RetrySweeper {
	queue: JobQueue,
}

impl RetrySweeper {
	pub fn new(queue: JobQueue) -> Self {
		Self { queue }
	}

	/// Requeue every due failed job and return their ids.
	///
	/// `backoff_base` is re-read on each sweep so configuration changes apply
	/// to jobs that are already waiting.
	#[instrument(skip(self))]
	pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
		let base = self.queue.settings().await?.backoff_base;
		let failed = self.queue.store().list_failed().await?;

		let mut requeued = Vec::new();
		for job in failed {
			if job.attempts >= job.max_retries {
				continue;
			}
			if !is_retry_due(&job, base, now) {
				debug!(job_id = %job.id, eligible_at = ?eligible_at(&job, base), "Backoff not elapsed");
				continue;
			}
			// A concurrent sweeper may have taken it first.
			if self.queue.store().requeue_failed(&job.id, now).await? {
				info!(
					job_id = %job.id,
					attempts = job.attempts,
					max_retries = job.max_retries,
					"Job requeued for retry"
				);
				requeued.push(job.id);
			}
		}

		Ok(requeued)
	}
}
