// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
const CONTENTION_CODES: &[&str] = &["5", "6", "517"];

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Invalid setting {key}={value}: {message}")]
	InvalidSetting {
		key: String,
		value: String,
		message: String,
	},

	#[error("Internal: {0}")]
	Internal(String),
}

impl DbError {
	/// True when the underlying failure is another connection holding the
	/// write lock.
	pub fn is_contention(&self) -> bool {
		match self {
			DbError::Sqlx(sqlx::Error::Database(db_err)) => db_err
				.code()
				.map(|code| CONTENTION_CODES.contains(&code.as_ref()))
				.unwrap_or(false),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
