// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};

macro_rules! job_columns {
	() => {
		"id, command, state, priority, run_at, attempts, max_retries, timeout_ms, output, \
		 created_at, updated_at, processing_at, completed_at"
	};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
	Pending,
	Processing,
	Completed,
	Failed,
	Dead,
}

impl JobState {
	pub const ALL: [JobState; 5] = [
		JobState::Pending,
		JobState::Processing,
		JobState::Completed,
		JobState::Failed,
		JobState::Dead,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			JobState::Pending => "pending",
			JobState::Processing => "processing",
			JobState::Completed => "completed",
			JobState::Failed => "failed",
			JobState::Dead => "dead",
		}
	}

	/// `Completed` and `Dead` are never picked up again by a worker.
	pub fn is_terminal(&self) -> bool {
		matches!(self, JobState::Completed | JobState::Dead)
	}
}

impl std::fmt::Display for JobState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for JobState {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"pending" => Ok(JobState::Pending),
			"processing" => Ok(JobState::Processing),
			"completed" => Ok(JobState::Completed),
			"failed" => Ok(JobState::Failed),
			"dead" => Ok(JobState::Dead),
			_ => Err(format!("unknown job state: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: String,
	pub command: String,
	pub state: JobState,
	pub priority: i64,
	pub run_at: Option<DateTime<Utc>>,
	pub attempts: u32,
	pub max_retries: u32,
	pub timeout_ms: u64,
	pub output: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub processing_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	/// Wall-clock time between claim and completion, for completed jobs.
	pub fn duration_ms(&self) -> Option<i64> {
		match (self.processing_at, self.completed_at) {
			(Some(start), Some(end)) => Some((end - start).num_milliseconds()),
			_ => None,
		}
	}
}

/// A job as accepted at submission, before the store assigns timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
	pub id: String,
	pub command: String,
	pub priority: i64,
	pub run_at: Option<DateTime<Utc>>,
	pub max_retries: u32,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateCount {
	pub state: JobState,
	pub count: u64,
}

/// Execution duration (`completed_at - processing_at`) over completed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExecutionStats {
	pub completed: u64,
	pub min_ms: i64,
	pub avg_ms: f64,
	pub max_ms: i64,
}

/// Timestamps are stored as fixed-width UTC strings so that string
/// comparison in SQL orders them chronologically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|ts| ts.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid {column} '{raw}': {e}")))
}

fn parse_optional_timestamp(column: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
	raw.map(|s| parse_timestamp(column, &s)).transpose()
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
	u32::try_from(value).map_err(|_| DbError::Internal(format!("{column} out of range: {value}")))
}

#[derive(sqlx::FromRow)]
struct JobRow {
	id: String,
	command: String,
	state: String,
	priority: i64,
	run_at: Option<String>,
	attempts: i64,
	max_retries: i64,
	timeout_ms: i64,
	output: Option<String>,
	created_at: String,
	updated_at: String,
	processing_at: Option<String>,
	completed_at: Option<String>,
}

impl TryFrom<JobRow> for Job {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Self> {
		Ok(Job {
			state: row.state.parse().map_err(DbError::Internal)?,
			priority: row.priority,
			run_at: parse_optional_timestamp("run_at", row.run_at)?,
			attempts: to_u32("attempts", row.attempts)?,
			max_retries: to_u32("max_retries", row.max_retries)?,
			timeout_ms: u64::try_from(row.timeout_ms)
				.map_err(|_| DbError::Internal(format!("timeout_ms out of range: {}", row.timeout_ms)))?,
			output: row.output,
			created_at: parse_timestamp("created_at", &row.created_at)?,
			updated_at: parse_timestamp("updated_at", &row.updated_at)?,
			processing_at: parse_optional_timestamp("processing_at", row.processing_at)?,
			completed_at: parse_optional_timestamp("completed_at", row.completed_at)?,
			id: row.id,
			command: row.command,
		})
	}
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>> {
	rows.into_iter().map(Job::try_from).collect()
}

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a new `pending` job. A duplicate id is `DbError::Conflict`.
	#[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
	pub async fn insert(&self, job: &NewJob, now: DateTime<Utc>) -> Result<Job> {
		let now = format_timestamp(now);
		let row = sqlx::query_as::<_, JobRow>(concat!(
			"INSERT INTO jobs (id, command, state, priority, run_at, attempts, max_retries, timeout_ms, created_at, updated_at) ",
			"VALUES (?, ?, 'pending', ?, ?, 0, ?, ?, ?, ?) ",
			"RETURNING ",
			job_columns!()
		))
		.bind(&job.id)
		.bind(&job.command)
		.bind(job.priority)
		.bind(job.run_at.map(format_timestamp))
		.bind(i64::from(job.max_retries))
		.bind(i64::try_from(job.timeout_ms).unwrap_or(i64::MAX))
		.bind(&now)
		.bind(&now)
		.fetch_one(&self.pool)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::Conflict(format!("job {} already exists", job.id))
			}
			_ => DbError::Sqlx(e),
		})?;

		row.try_into()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, id: &str) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(concat!(
			"SELECT ",
			job_columns!(),
			" FROM jobs WHERE id = ?"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Job::try_from).transpose()
	}

	/// Atomically pick the highest-ranked eligible pending job and move it
	/// to `processing`.
	///
	/// The selection and the state change are one statement, so two callers
	/// can never both receive the same job. Losing a write-lock race to
	/// another claimer is reported as `Ok(None)`.
	#[tracing::instrument(skip(self))]
	pub async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
		let now = format_timestamp(now);
		let result = sqlx::query_as::<_, JobRow>(concat!(
			"UPDATE jobs SET state = 'processing', processing_at = ?, updated_at = ? ",
			"WHERE id = (",
			"SELECT id FROM jobs ",
			"WHERE state = 'pending' AND (run_at IS NULL OR run_at <= ?) ",
			"ORDER BY priority DESC, created_at ASC, rowid ASC ",
			"LIMIT 1",
			") AND state = 'pending' ",
			"RETURNING ",
			job_columns!()
		))
		.bind(&now)
		.bind(&now)
		.bind(&now)
		.fetch_optional(&self.pool)
		.await;

		match result {
			Ok(row) => row.map(Job::try_from).transpose(),
			Err(e) => {
				let err = DbError::from(e);
				if err.is_contention() {
					tracing::debug!(error = %err, "claim lost to a concurrent claimer");
					Ok(None)
				} else {
					Err(err)
				}
			}
		}
	}

	/// `processing -> completed`.
	#[tracing::instrument(skip(self, output))]
	pub async fn complete(&self, id: &str, output: &str, now: DateTime<Utc>) -> Result<Job> {
		let now = format_timestamp(now);
		let row = sqlx::query_as::<_, JobRow>(concat!(
			"UPDATE jobs SET state = 'completed', output = ?, completed_at = ?, updated_at = ? ",
			"WHERE id = ? AND state = 'processing' ",
			"RETURNING ",
			job_columns!()
		))
		.bind(output)
		.bind(&now)
		.bind(&now)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row
			.ok_or_else(|| DbError::NotFound(format!("processing job {id}")))?
			.try_into()
	}

	/// `processing -> failed | dead`.
	///
	/// Increments `attempts` and decides dead-lettering in the same
	/// statement: the job becomes `dead` once the new attempt count reaches
	/// its `max_retries`. SQLite evaluates every `SET` expression against the
	/// row as it was before the update.
	#[tracing::instrument(skip(self, detail))]
	pub async fn record_failure(&self, id: &str, detail: &str, now: DateTime<Utc>) -> Result<Job> {
		let now = format_timestamp(now);
		let row = sqlx::query_as::<_, JobRow>(concat!(
			"UPDATE jobs SET ",
			"attempts = attempts + 1, ",
			"state = CASE WHEN attempts + 1 >= max_retries THEN 'dead' ELSE 'failed' END, ",
			"output = ?, updated_at = ? ",
			"WHERE id = ? AND state = 'processing' ",
			"RETURNING ",
			job_columns!()
		))
		.bind(detail)
		.bind(&now)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row
			.ok_or_else(|| DbError::NotFound(format!("processing job {id}")))?
			.try_into()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_failed(&self) -> Result<Vec<Job>> {
		self.list_by_state(JobState::Failed).await
	}

	/// `failed -> pending`. Returns false when another worker already moved
	/// the job or its retry budget is spent.
	#[tracing::instrument(skip(self))]
	pub async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE jobs SET state = 'pending', updated_at = ?
			WHERE id = ? AND state = 'failed' AND attempts < max_retries
			"#,
		)
		.bind(format_timestamp(now))
		.bind(id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// `dead -> pending` with the attempt counter reset.
	#[tracing::instrument(skip(self))]
	pub async fn requeue_dead(&self, id: &str, now: DateTime<Utc>) -> Result<Job> {
		let row = sqlx::query_as::<_, JobRow>(concat!(
			"UPDATE jobs SET state = 'pending', attempts = 0, updated_at = ? ",
			"WHERE id = ? AND state = 'dead' ",
			"RETURNING ",
			job_columns!()
		))
		.bind(format_timestamp(now))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row
			.ok_or_else(|| DbError::NotFound(format!("dead job {id}")))?
			.try_into()
	}

	/// Jobs in `state`, in claim order.
	#[tracing::instrument(skip(self))]
	pub async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(concat!(
			"SELECT ",
			job_columns!(),
			" FROM jobs WHERE state = ? ORDER BY priority DESC, created_at ASC, rowid ASC"
		))
		.bind(state.as_str())
		.fetch_all(&self.pool)
		.await?;

		into_jobs(rows)
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_by_state(&self) -> Result<Vec<StateCount>> {
		let rows = sqlx::query_as::<_, (String, i64)>(
			"SELECT state, COUNT(*) FROM jobs GROUP BY state ORDER BY state",
		)
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|(state, count)| {
				Ok(StateCount {
					state: state.parse().map_err(DbError::Internal)?,
					count: count.max(0) as u64,
				})
			})
			.collect()
	}

	/// Min/avg/max execution duration over completed jobs, or `None` when no
	/// job has completed yet.
	#[tracing::instrument(skip(self))]
	pub async fn execution_stats(&self) -> Result<Option<ExecutionStats>> {
		let (completed, min_ms, avg_ms, max_ms) =
			sqlx::query_as::<_, (i64, Option<i64>, Option<f64>, Option<i64>)>(
				r#"
				SELECT COUNT(*), MIN(duration_ms), AVG(duration_ms), MAX(duration_ms)
				FROM (
					SELECT CAST(ROUND((julianday(completed_at) - julianday(processing_at)) * 86400000.0) AS INTEGER) AS duration_ms
					FROM jobs
					WHERE state = 'completed'
					  AND processing_at IS NOT NULL
					  AND completed_at IS NOT NULL
				)
				"#,
			)
			.fetch_one(&self.pool)
			.await?;

		Ok(match (min_ms, avg_ms, max_ms) {
			(Some(min_ms), Some(avg_ms), Some(max_ms)) if completed > 0 => Some(ExecutionStats {
				completed: completed as u64,
				min_ms,
				avg_ms,
				max_ms,
			}),
			_ => None,
		})
	}

	/// The `limit` most recently updated jobs, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn recent(&self, limit: u32) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(concat!(
			"SELECT ",
			job_columns!(),
			" FROM jobs ORDER BY updated_at DESC, rowid DESC LIMIT ?"
		))
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		into_jobs(rows)
	}
}

/// The store contract the lifecycle engine depends on.
#[async_trait]
pub trait JobStore: Send + Sync {
	async fn insert(&self, job: &NewJob, now: DateTime<Utc>) -> Result<Job>;
	async fn get(&self, id: &str) -> Result<Option<Job>>;
	async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>>;
	async fn complete(&self, id: &str, output: &str, now: DateTime<Utc>) -> Result<Job>;
	async fn record_failure(&self, id: &str, detail: &str, now: DateTime<Utc>) -> Result<Job>;
	async fn list_failed(&self) -> Result<Vec<Job>>;
	async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
	async fn requeue_dead(&self, id: &str, now: DateTime<Utc>) -> Result<Job>;
	async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>>;
	async fn count_by_state(&self) -> Result<Vec<StateCount>>;
	async fn execution_stats(&self) -> Result<Option<ExecutionStats>>;
	async fn recent(&self, limit: u32) -> Result<Vec<Job>>;
}

#[async_trait]
impl JobStore for JobRepository {
	async fn insert(&self, job: &NewJob, now: DateTime<Utc>) -> Result<Job> {
		self.insert(job, now).await
	}

	async fn get(&self, id: &str) -> Result<Option<Job>> {
		self.get(id).await
	}

	async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
		self.claim_next(now).await
	}

	async fn complete(&self, id: &str, output: &str, now: DateTime<Utc>) -> Result<Job> {
		self.complete(id, output, now).await
	}

	async fn record_failure(&self, id: &str, detail: &str, now: DateTime<Utc>) -> Result<Job> {
		self.record_failure(id, detail, now).await
	}

	async fn list_failed(&self) -> Result<Vec<Job>> {
		self.list_failed().await
	}

	async fn requeue_failed(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
		self.requeue_failed(id, now).await
	}

	async fn requeue_dead(&self, id: &str, now: DateTime<Utc>) -> Result<Job> {
		self.requeue_dead(id, now).await
	}

	async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>> {
		self.list_by_state(state).await
	}

	async fn count_by_state(&self) -> Result<Vec<StateCount>> {
		self.count_by_state().await
	}

	async fn execution_stats(&self) -> Result<Option<ExecutionStats>> {
		self.execution_stats().await
	}

	async fn recent(&self, limit: u32) -> Result<Vec<Job>> {
		self.recent(limit).await
	}
}
