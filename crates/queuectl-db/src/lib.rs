// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for queuectl.
//!
//! Two stores share one database file:
//! - [`JobRepository`]: job records and the single-statement state
//!   transitions (claim, complete, fail, requeue) the worker relies on.
//! - [`SettingsRepository`]: operator-tunable key/value settings such as
//!   `max_retries` and `backoff_base`.

pub mod error;
pub mod job;
pub mod pool;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DbError, Result};
pub use job::{
	format_timestamp, ExecutionStats, Job, JobRepository, JobState, JobStore, NewJob, StateCount,
};
pub use pool::{create_pool, run_migrations};
pub use sqlx::SqlitePool;
pub use settings::{
	normalize_key, QueueSettings, SettingsRepository, SettingsStore, BACKOFF_BASE_KEY,
	DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, MAX_RETRIES_KEY,
};
