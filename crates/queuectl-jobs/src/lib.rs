// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job lifecycle engine for queuectl.
//!
//! Jobs are shell commands persisted through `queuectl-db`. A [`Worker`]
//! claims the highest-priority eligible job, runs it through an
//! [`Executor`] under a timeout, and records the outcome. Failed jobs return
//! to `pending` after exponential backoff until their retry budget is spent,
//! at which point they land in the [`DeadLetterQueue`].

pub mod context;
pub mod dead_letter;
pub mod error;
pub mod executor;
pub mod queue;
pub mod retry;
pub mod status;
pub mod types;
pub mod worker;

pub use context::{ShutdownToken, WorkerContext};
pub use dead_letter::DeadLetterQueue;
pub use error::{JobError, Result};
pub use executor::{Executor, ShellExecutor, DEFAULT_MAX_OUTPUT_BYTES};
pub use queue::JobQueue;
pub use retry::{backoff_delay, eligible_at, is_retry_due, RetrySweeper};
pub use status::QueueSnapshot;
pub use types::{
	ExecutionOutcome, ExecutionStats, Job, JobState, JobSubmission, QueueSettings, StateCount,
	DEFAULT_JOB_TIMEOUT,
};
pub use worker::{CycleOutcome, Worker, DEFAULT_POLL_INTERVAL};
