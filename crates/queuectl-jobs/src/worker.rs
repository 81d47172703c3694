// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use crate::context::WorkerContext;
use crate::error::Result;
use crate::executor::Executor;
use crate::queue::JobQueue;
use crate::retry::RetrySweeper;
use crate::types::JobState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// What one pass of the worker loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
	/// A job was claimed, executed and its result persisted.
	Executed { job_id: String, state: JobState },
	/// Nothing was claimable; lists jobs the retry sweep moved to `pending`.
	Idle { requeued: Vec<String> },
}

/// Claims and runs one job at a time until shutdown is requested.
pub struct Worker {
	queue: JobQueue,
	sweeper: RetrySweeper,
	executor: Arc<dyn Executor>,
	ctx: WorkerContext,
	poll_interval: Duration,
}

impl Worker {
	pub fn new(queue: JobQueue, executor: Arc<dyn Executor>, ctx: WorkerContext) -> Self {
		Self {
			sweeper: RetrySweeper::new(queue.clone()),
			queue,
			executor,
			ctx,
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn worker_id(&self) -> &str {
		&self.ctx.worker_id
	}

	/// Claim and execute one job, or run the retry sweep when none is
	/// eligible.
	///
	/// Completion timestamps are `now` plus the measured execution time, so
	/// callers that inject `now` get a consistent timeline.
	#[instrument(skip(self), fields(worker_id = %self.ctx.worker_id))]
	pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
		let Some(job) = self.queue.claim(now).await? else {
			let requeued = self.sweeper.sweep(now).await?;
			return Ok(CycleOutcome::Idle { requeued });
		};

		info!(
			job_id = %job.id,
			command = %job.command,
			attempts = job.attempts,
			"Claimed job"
		);

		let started = Instant::now();
		let outcome = self.executor.execute(&job).await;
		let elapsed = chrono::Duration::from_std(started.elapsed()).unwrap_or_default();

		let finished = self
			.queue
			.record_outcome(&job, &outcome, now + elapsed)
			.await?;

		Ok(CycleOutcome::Executed {
			job_id: finished.id,
			state: finished.state,
		})
	}

	/// Loop until the shutdown token fires.
	///
	/// Cancellation is only observed between jobs; a running command is left
	/// to finish and its result is persisted before the loop exits. A store
	/// failure stops the worker.
	#[instrument(skip(self), fields(worker_id = %self.ctx.worker_id))]
	pub async fn run(&self) -> Result<()> {
		info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Worker started");

		while !self.ctx.shutdown.is_cancelled() {
			let outcome = match self.run_cycle(Utc::now()).await {
				Ok(outcome) => outcome,
				Err(e) => {
					error!(error = %e, "Worker stopping after store error");
					return Err(e);
				}
			};

			if let CycleOutcome::Idle { .. } = outcome {
				tokio::select! {
					_ = tokio::time::sleep(self.poll_interval) => {}
					_ = self.ctx.shutdown.cancelled() => {
						info!("Shutdown requested while idle");
					}
				}
			}
		}

		info!("Worker stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::ShutdownToken;
	use crate::types::{ExecutionOutcome, Job, JobSubmission};
	use async_trait::async_trait;
	use queuectl_db::testing::create_test_pool;
	use std::collections::VecDeque;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	fn base_time() -> DateTime<Utc> {
		"2025-06-01T12:00:00Z".parse().unwrap()
	}

	/// Replays scripted outcomes, succeeding once the script runs out.
	struct ScriptedExecutor {
		outcomes: Mutex<VecDeque<ExecutionOutcome>>,
		calls: AtomicUsize,
	}

	impl ScriptedExecutor {
		fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
			Self {
				outcomes: Mutex::new(outcomes.into()),
				calls: AtomicUsize::new(0),
			}
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl Executor for ScriptedExecutor {
		async fn execute(&self, _job: &Job) -> ExecutionOutcome {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.outcomes
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or(ExecutionOutcome::Succeeded {
					stdout: String::new(),
				})
		}
	}

	/// Cancels the shutdown token from inside a running job.
	struct CancellingExecutor {
		token: ShutdownToken,
	}

	#[async_trait]
	impl Executor for CancellingExecutor {
		async fn execute(&self, _job: &Job) -> ExecutionOutcome {
			self.token.cancel();
			tokio::time::sleep(Duration::from_millis(50)).await;
			ExecutionOutcome::Succeeded {
				stdout: "finished".to_string(),
			}
		}
	}

	fn failure() -> ExecutionOutcome {
		ExecutionOutcome::Failed {
			detail: "exit status: 1".to_string(),
		}
	}

	async fn worker_with(executor: Arc<dyn Executor>) -> (Worker, JobQueue) {
		let queue = JobQueue::from_pool(create_test_pool().await);
		let ctx = WorkerContext::with_id("worker-test", ShutdownToken::new());
		(Worker::new(queue.clone(), executor, ctx), queue)
	}

	#[tokio::test]
	async fn test_idle_cycle_on_empty_queue() {
		let executor = Arc::new(ScriptedExecutor::new(vec![]));
		let (worker, _queue) = worker_with(executor.clone()).await;

		let outcome = worker.run_cycle(base_time()).await.unwrap();
		assert_eq!(outcome, CycleOutcome::Idle { requeued: vec![] });
		assert_eq!(executor.calls(), 0);
	}

	#[tokio::test]
	async fn test_cycle_completes_job() {
		let executor = Arc::new(ScriptedExecutor::new(vec![ExecutionOutcome::Succeeded {
			stdout: "hello\n".to_string(),
		}]));
		let (worker, queue) = worker_with(executor.clone()).await;
		queue
			.submit(JobSubmission::new("job-1", "echo hello"), base_time())
			.await
			.unwrap();

		let outcome = worker.run_cycle(base_time()).await.unwrap();
		assert_eq!(
			outcome,
			CycleOutcome::Executed {
				job_id: "job-1".to_string(),
				state: JobState::Completed,
			}
		);

		let job = queue.get("job-1").await.unwrap().unwrap();
		assert_eq!(job.output.as_deref(), Some("hello\n"));
		assert!(job.completed_at.unwrap() >= job.processing_at.unwrap());
	}

	#[tokio::test]
	async fn test_failed_job_is_retried_after_backoff_then_dead() {
		let executor = Arc::new(ScriptedExecutor::new(vec![failure(), failure()]));
		let (worker, queue) = worker_with(executor.clone()).await;
		let t0 = base_time();
		queue.set_setting("max_retries", "2", t0).await.unwrap();
		queue
			.submit(JobSubmission::new("job-1", "false"), t0)
			.await
			.unwrap();

		let first = worker.run_cycle(t0).await.unwrap();
		assert_eq!(
			first,
			CycleOutcome::Executed {
				job_id: "job-1".to_string(),
				state: JobState::Failed,
			}
		);

		// Still inside the 2s backoff window.
		let t1 = t0 + chrono::Duration::seconds(1);
		assert_eq!(
			worker.run_cycle(t1).await.unwrap(),
			CycleOutcome::Idle { requeued: vec![] }
		);

		let t2 = t0 + chrono::Duration::seconds(3);
		assert_eq!(
			worker.run_cycle(t2).await.unwrap(),
			CycleOutcome::Idle {
				requeued: vec!["job-1".to_string()]
			}
		);

		let second = worker.run_cycle(t2).await.unwrap();
		assert_eq!(
			second,
			CycleOutcome::Executed {
				job_id: "job-1".to_string(),
				state: JobState::Dead,
			}
		);
		assert_eq!(executor.calls(), 2);

		let job = queue.get("job-1").await.unwrap().unwrap();
		assert_eq!(job.attempts, 2);
		assert_eq!(job.output.as_deref(), Some("exit status: 1"));

		let later = t2 + chrono::Duration::days(1);
		assert_eq!(
			worker.run_cycle(later).await.unwrap(),
			CycleOutcome::Idle { requeued: vec![] }
		);
	}

	#[tokio::test]
	async fn test_run_stops_when_cancelled_while_idle() {
		let executor = Arc::new(ScriptedExecutor::new(vec![]));
		let (worker, _queue) = worker_with(executor).await;
		let worker = worker.with_poll_interval(Duration::from_secs(60));
		let token = worker.ctx.shutdown.clone();

		let handle = tokio::spawn(async move { worker.run().await });
		tokio::time::sleep(Duration::from_millis(50)).await;
		token.cancel();

		tokio::time::timeout(Duration::from_secs(2), handle)
			.await
			.unwrap()
			.unwrap()
			.unwrap();
	}

	#[tokio::test]
	async fn test_run_finishes_in_flight_job_before_exiting() {
		let token = ShutdownToken::new();
		let queue = JobQueue::from_pool(create_test_pool().await);
		queue
			.submit(JobSubmission::new("job-1", "sleep 1"), Utc::now())
			.await
			.unwrap();
		queue
			.submit(JobSubmission::new("job-2", "true"), Utc::now())
			.await
			.unwrap();

		let executor = Arc::new(CancellingExecutor {
			token: token.clone(),
		});
		let worker = Worker::new(
			queue.clone(),
			executor,
			WorkerContext::with_id("worker-test", token),
		)
		.with_poll_interval(Duration::from_millis(10));

		tokio::time::timeout(Duration::from_secs(2), worker.run())
			.await
			.unwrap()
			.unwrap();

		let first = queue.get("job-1").await.unwrap().unwrap();
		assert_eq!(first.state, JobState::Completed);
		assert_eq!(first.output.as_deref(), Some("finished"));
		let second = queue.get("job-2").await.unwrap().unwrap();
		assert_eq!(second.state, JobState::Pending);
	}
}
