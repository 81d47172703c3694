// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use queuectl_db::DbError;

/// Errors surfaced to callers of the engine.
///
/// Per-job execution failures never appear here; they are recorded on the
/// job itself. Only submission problems, operator lookups and store failures
/// propagate.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("A job with id \"{0}\" already exists")]
	DuplicateJob(String),

	#[error("Invalid job submission: {0}")]
	InvalidSubmission(String),

	#[error("Job not found: {0}")]
	NotFound(String),

	#[error("Store error: {0}")]
	Store(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, JobError>;
