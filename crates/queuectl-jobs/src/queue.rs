// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use queuectl_db::{
	DbError, JobRepository, JobStore, NewJob, SettingsRepository, SettingsStore, SqlitePool,
};
use tracing::{info, instrument, warn};

use crate::error::{JobError, Result};
use crate::status::QueueSnapshot;
use crate::types::{ExecutionOutcome, Job, JobState, JobSubmission, QueueSettings};

/// Shared handle to the job store and the settings store.
///
/// Every component of the engine goes through this handle; cloning it is
/// cheap and all clones observe the same stores.
#[derive(Clone)]
pub struct JobQueue {
	jobs: Arc<dyn JobStore>,
	settings: Arc<dyn SettingsStore>,
}

impl JobQueue {
	pub fn new(jobs: Arc<dyn JobStore>, settings: Arc<dyn SettingsStore>) -> Self {
		Self { jobs, settings }
	}

	pub fn from_pool(pool: SqlitePool) -> Self {
		Self::new(
			Arc::new(JobRepository::new(pool.clone())),
			Arc::new(SettingsRepository::new(pool)),
		)
	}

	pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
		&self.jobs
	}

	/// Accept a new job in `pending`, snapshotting the current retry budget.
	#[instrument(skip(self, submission), fields(job_id = %submission.id))]
	pub async fn submit(&self, submission: JobSubmission, now: DateTime<Utc>) -> Result<Job> {
		if submission.id.trim().is_empty() {
			return Err(JobError::InvalidSubmission("id must not be empty".to_string()));
		}
		if submission.command.trim().is_empty() {
			return Err(JobError::InvalidSubmission(
				"command must not be empty".to_string(),
			));
		}

		let settings = self.settings.load().await?;
		let new_job = NewJob {
			id: submission.id,
			command: submission.command,
			priority: submission.priority,
			run_at: submission.run_at,
			max_retries: settings.max_retries,
			timeout_ms: u64::try_from(submission.timeout.as_millis()).unwrap_or(u64::MAX),
		};

		match self.jobs.insert(&new_job, now).await {
			Ok(job) => {
				info!(
					job_id = %job.id,
					priority = job.priority,
					run_at = ?job.run_at,
					max_retries = job.max_retries,
					"Job enqueued"
				);
				Ok(job)
			}
			Err(DbError::Conflict(_)) => Err(JobError::DuplicateJob(new_job.id)),
			Err(e) => Err(e.into()),
		}
	}

	/// Claim the next eligible job for exclusive processing.
	///
	/// Eligible means `pending` with no `run_at` or `run_at <= now`; the
	/// highest priority wins, then the oldest. `None` when nothing is
	/// eligible or a concurrent worker won the race.
	#[instrument(skip(self))]
	pub async fn claim(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
		Ok(self.jobs.claim_next(now).await?)
	}

	/// Persist the result of executing a claimed job.
	///
	/// Success completes the job. Failure increments `attempts` and decides
	/// between `failed` and `dead` in one store update.
	#[instrument(skip(self, job, outcome), fields(job_id = %job.id))]
	pub async fn record_outcome(
		&self,
		job: &Job,
		outcome: &ExecutionOutcome,
		now: DateTime<Utc>,
	) -> Result<Job> {
		match outcome {
			ExecutionOutcome::Succeeded { stdout } => {
				let done = self.jobs.complete(&job.id, stdout, now).await?;
				info!(job_id = %done.id, duration_ms = ?done.duration_ms(), "Job completed");
				Ok(done)
			}
			ExecutionOutcome::Failed { detail } => {
				let failed = self.jobs.record_failure(&job.id, detail, now).await?;
				if failed.state == JobState::Dead {
					warn!(
						job_id = %failed.id,
						attempts = failed.attempts,
						max_retries = failed.max_retries,
						error = %detail,
						"Job exhausted its retries, moved to dead-letter queue"
					);
				} else {
					warn!(
						job_id = %failed.id,
						attempts = failed.attempts,
						max_retries = failed.max_retries,
						error = %detail,
						"Job failed, will retry"
					);
				}
				Ok(failed)
			}
		}
	}

	#[instrument(skip(self))]
	pub async fn get(&self, id: &str) -> Result<Option<Job>> {
		Ok(self.jobs.get(id).await?)
	}

	#[instrument(skip(self))]
	pub async fn list(&self, state: JobState) -> Result<Vec<Job>> {
		Ok(self.jobs.list_by_state(state).await?)
	}

	/// Current tunables, read fresh from the settings store.
	pub async fn settings(&self) -> Result<QueueSettings> {
		Ok(self.settings.load().await?)
	}

	pub async fn setting_entries(&self) -> Result<BTreeMap<String, String>> {
		Ok(self.settings.all().await?)
	}

	#[instrument(skip(self, value))]
	pub async fn set_setting(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
		self.settings.set(key, value, now).await?;
		info!(key, value, "Setting updated");
		Ok(())
	}

	/// Aggregates for status displays: counts by state, execution durations
	/// and the `recent_limit` most recently updated jobs.
	#[instrument(skip(self))]
	pub async fn snapshot(&self, recent_limit: u32) -> Result<QueueSnapshot> {
		Ok(QueueSnapshot {
			counts: self.jobs.count_by_state().await?,
			execution: self.jobs.execution_stats().await?,
			recent: self.jobs.recent(recent_limit).await?,
		})
	}
}
