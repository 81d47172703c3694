// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the job lifecycle.
//!
//! Tests cover:
//! - Claim ordering by priority then age
//! - Scheduled jobs (`run_at`) becoming eligible only once due
//! - Retry budget exhaustion and dead-letter requeue
//! - Exclusive claims across independent pools on one database file
//! - End-to-end execution through the shell

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use queuectl_db::testing::{create_file_pool, create_test_pool};
use queuectl_jobs::{
	DeadLetterQueue, ExecutionOutcome, JobError, JobQueue, JobState, JobSubmission, RetrySweeper,
};
use tempfile::tempdir;

fn base_time() -> DateTime<Utc> {
	"2025-06-01T12:00:00Z".parse().unwrap()
}

fn failure() -> ExecutionOutcome {
	ExecutionOutcome::Failed {
		detail: "exit status: 1".to_string(),
	}
}

async fn memory_queue() -> JobQueue {
	JobQueue::from_pool(create_test_pool().await)
}

// ============================================================================
// Claim ordering
// ============================================================================

#[tokio::test]
async fn higher_priority_is_claimed_first() {
	let queue = memory_queue().await;
	let t0 = base_time();
	queue
		.submit(JobSubmission::new("A", "true").with_priority(5), t0)
		.await
		.unwrap();
	queue
		.submit(
			JobSubmission::new("B", "true").with_priority(1),
			t0 + Duration::milliseconds(1),
		)
		.await
		.unwrap();

	let first = queue.claim(t0 + Duration::seconds(1)).await.unwrap().unwrap();
	let second = queue.claim(t0 + Duration::seconds(1)).await.unwrap().unwrap();
	assert_eq!(first.id, "A");
	assert_eq!(second.id, "B");
	assert!(queue.claim(t0 + Duration::seconds(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn equal_priority_is_claimed_oldest_first() {
	let queue = memory_queue().await;
	let t0 = base_time();
	for (i, id) in ["c", "a", "b"].iter().enumerate() {
		queue
			.submit(
				JobSubmission::new(*id, "true"),
				t0 + Duration::seconds(i as i64),
			)
			.await
			.unwrap();
	}

	let now = t0 + Duration::minutes(1);
	let mut order = Vec::new();
	while let Some(job) = queue.claim(now).await.unwrap() {
		order.push(job.id);
	}
	assert_eq!(order, vec!["c", "a", "b"]);
}

// ============================================================================
// Scheduled jobs
// ============================================================================

#[tokio::test]
async fn scheduled_job_waits_for_run_at() {
	let queue = memory_queue().await;
	let t0 = base_time();
	queue
		.submit(
			JobSubmission::new("later", "true").with_run_at(t0 + Duration::seconds(10)),
			t0,
		)
		.await
		.unwrap();

	assert!(queue.claim(t0 + Duration::seconds(5)).await.unwrap().is_none());
	let job = queue
		.claim(t0 + Duration::seconds(11))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(job.id, "later");
	assert_eq!(job.state, JobState::Processing);
}

#[tokio::test]
async fn due_job_outranks_lower_priority_even_if_scheduled() {
	let queue = memory_queue().await;
	let t0 = base_time();
	queue
		.submit(JobSubmission::new("now", "true"), t0)
		.await
		.unwrap();
	queue
		.submit(
			JobSubmission::new("scheduled", "true")
				.with_priority(10)
				.with_run_at(t0 + Duration::seconds(30)),
			t0,
		)
		.await
		.unwrap();

	let first = queue.claim(t0 + Duration::seconds(1)).await.unwrap().unwrap();
	assert_eq!(first.id, "now");
	let second = queue.claim(t0 + Duration::seconds(31)).await.unwrap().unwrap();
	assert_eq!(second.id, "scheduled");
}

// ============================================================================
// Retries and dead-letter
// ============================================================================

#[tokio::test]
async fn job_with_two_retries_is_dead_after_second_failure() {
	let queue = memory_queue().await;
	let sweeper = RetrySweeper::new(queue.clone());
	let t0 = base_time();
	queue.set_setting("max_retries", "2", t0).await.unwrap();
	queue
		.submit(JobSubmission::new("flaky", "false"), t0)
		.await
		.unwrap();

	let job = queue.claim(t0).await.unwrap().unwrap();
	let job = queue.record_outcome(&job, &failure(), t0).await.unwrap();
	assert_eq!(job.state, JobState::Failed);
	assert_eq!(job.attempts, 1);

	// 2^1 seconds of backoff.
	let t1 = t0 + Duration::seconds(2);
	assert_eq!(sweeper.sweep(t1).await.unwrap(), vec!["flaky".to_string()]);

	let job = queue.claim(t1).await.unwrap().unwrap();
	assert_eq!(job.attempts, 1);
	let job = queue.record_outcome(&job, &failure(), t1).await.unwrap();
	assert_eq!(job.state, JobState::Dead);
	assert_eq!(job.attempts, 2);

	assert!(sweeper
		.sweep(t1 + Duration::days(7))
		.await
		.unwrap()
		.is_empty());
}

#[tokio::test]
async fn backoff_grows_with_attempts() {
	let queue = memory_queue().await;
	let sweeper = RetrySweeper::new(queue.clone());
	let t0 = base_time();
	queue.set_setting("max_retries", "5", t0).await.unwrap();
	queue
		.submit(JobSubmission::new("flaky", "false"), t0)
		.await
		.unwrap();

	let mut now = t0;
	for attempts in 1..=3u32 {
		let job = queue.claim(now).await.unwrap().unwrap();
		let job = queue.record_outcome(&job, &failure(), now).await.unwrap();
		assert_eq!(job.attempts, attempts);

		let delay = Duration::seconds(2i64.pow(attempts));
		let early = now + delay - Duration::milliseconds(1);
		assert!(sweeper.sweep(early).await.unwrap().is_empty());

		now += delay;
		assert_eq!(sweeper.sweep(now).await.unwrap().len(), 1);
	}
}

#[tokio::test]
async fn dead_job_requeue_resets_attempts() {
	let queue = memory_queue().await;
	let dlq = DeadLetterQueue::new(queue.clone());
	let t0 = base_time();
	queue.set_setting("max-retries", "1", t0).await.unwrap();
	queue
		.submit(JobSubmission::new("doomed", "false"), t0)
		.await
		.unwrap();
	let job = queue.claim(t0).await.unwrap().unwrap();
	queue.record_outcome(&job, &failure(), t0).await.unwrap();

	let dead = dlq.list().await.unwrap();
	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempts, 1);

	let t1 = t0 + Duration::minutes(1);
	let requeued = dlq.requeue("doomed", t1).await.unwrap();
	assert_eq!(requeued.attempts, 0);
	assert_eq!(requeued.state, JobState::Pending);

	let claimed = queue.claim(t1).await.unwrap().unwrap();
	assert_eq!(claimed.id, "doomed");

	let again = dlq.requeue("doomed", t1).await;
	assert!(matches!(again, Err(JobError::NotFound(_))));
}

// ============================================================================
// Concurrent claims
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pools_never_claim_the_same_job() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("queue.db");
	let setup = JobQueue::from_pool(create_file_pool(&path).await);
	let t0 = base_time();
	for i in 0..20 {
		setup
			.submit(JobSubmission::new(format!("job-{i}"), "true"), t0)
			.await
			.unwrap();
	}

	let mut handles = Vec::new();
	for _ in 0..4 {
		let queue = JobQueue::from_pool(create_file_pool(&path).await);
		handles.push(tokio::spawn(async move {
			let mut claimed = Vec::new();
			while let Some(job) = queue.claim(t0).await.unwrap() {
				claimed.push(job.id);
			}
			claimed
		}));
	}

	let mut all = Vec::new();
	for handle in handles {
		all.extend(handle.await.unwrap());
	}
	// A worker that lost a race stops early; drain whatever it left behind.
	while let Some(job) = setup.claim(t0).await.unwrap() {
		all.push(job.id);
	}

	let unique: HashSet<_> = all.iter().cloned().collect();
	assert_eq!(unique.len(), all.len(), "a job was claimed twice: {all:?}");
	assert_eq!(unique.len(), 20);

	let snapshot = setup.snapshot(5).await.unwrap();
	assert_eq!(snapshot.count(JobState::Processing), 20);
	assert_eq!(snapshot.count(JobState::Pending), 0);
}

// ============================================================================
// Shell execution
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn worker_runs_shell_commands_end_to_end() {
	use queuectl_jobs::{CycleOutcome, ShellExecutor, ShutdownToken, Worker, WorkerContext};

	let dir = tempdir().unwrap();
	let queue = JobQueue::from_pool(create_file_pool(&dir.path().join("queue.db")).await);
	let t0 = Utc::now();
	queue.set_setting("max_retries", "1", t0).await.unwrap();
	queue
		.submit(JobSubmission::new("ok", "echo done").with_priority(1), t0)
		.await
		.unwrap();
	queue
		.submit(
			JobSubmission::new("slow", "sleep 5").with_timeout(std::time::Duration::from_millis(100)),
			t0,
		)
		.await
		.unwrap();

	let worker = Worker::new(
		queue.clone(),
		Arc::new(ShellExecutor::new()),
		WorkerContext::new(ShutdownToken::new()),
	);

	assert_eq!(
		worker.run_cycle(Utc::now()).await.unwrap(),
		CycleOutcome::Executed {
			job_id: "ok".to_string(),
			state: JobState::Completed,
		}
	);
	assert_eq!(
		worker.run_cycle(Utc::now()).await.unwrap(),
		CycleOutcome::Executed {
			job_id: "slow".to_string(),
			state: JobState::Dead,
		}
	);

	let ok = queue.get("ok").await.unwrap().unwrap();
	assert_eq!(ok.output.as_deref(), Some("done\n"));
	let slow = queue.get("slow").await.unwrap().unwrap();
	assert_eq!(slow.output.as_deref(), Some("timed out after 100 ms"));

	let snapshot = queue.snapshot(10).await.unwrap();
	let stats = snapshot.execution.unwrap();
	assert_eq!(stats.completed, 1);
}
