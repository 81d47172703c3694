// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pools for tests. Enabled for dependents through the `testing` feature.

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::pool::{create_pool, run_migrations};

/// In-memory database with the queue schema applied. A single connection
/// keeps the database alive for the life of the pool.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect(":memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// File-backed database at `path`, for tests that need several independent
/// pools (one per simulated worker process) contending on the same file.
pub async fn create_file_pool(path: &Path) -> SqlitePool {
	let url = format!("sqlite:{}", path.display());
	let pool = create_pool(&url).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}
