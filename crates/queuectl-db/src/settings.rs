// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator-tunable queue settings, stored as key/value rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::job::format_timestamp;

pub const MAX_RETRIES_KEY: &str = "max_retries";
pub const BACKOFF_BASE_KEY: &str = "backoff_base";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// `max-retries` and `max_retries` name the same setting.
pub fn normalize_key(key: &str) -> String {
	key.trim().to_ascii_lowercase().replace('-', "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSettings {
	pub max_retries: u32,
	pub backoff_base: u32,
}

impl Default for QueueSettings {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			backoff_base: DEFAULT_BACKOFF_BASE,
		}
	}
}

impl QueueSettings {
	/// Resolve the known tunables from raw entries, falling back to defaults
	/// for missing keys. Unknown keys are ignored.
	pub fn from_entries(entries: &BTreeMap<String, String>) -> Result<Self> {
		let mut settings = Self::default();
		if let Some(value) = entries.get(MAX_RETRIES_KEY) {
			settings.max_retries = parse_count(MAX_RETRIES_KEY, value)?;
		}
		if let Some(value) = entries.get(BACKOFF_BASE_KEY) {
			settings.backoff_base = parse_count(BACKOFF_BASE_KEY, value)?;
		}
		Ok(settings)
	}
}

fn parse_count(key: &str, value: &str) -> Result<u32> {
	value
		.trim()
		.parse::<u32>()
		.map_err(|_| DbError::InvalidSetting {
			key: key.to_string(),
			value: value.to_string(),
			message: "expected a non-negative integer".to_string(),
		})
}

/// Reject values for known keys that `QueueSettings` could not load later.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
	match normalize_key(key).as_str() {
		k @ (MAX_RETRIES_KEY | BACKOFF_BASE_KEY) => parse_count(k, value).map(|_| ()),
		_ => Ok(()),
	}
}

#[derive(Clone)]
pub struct SettingsRepository {
	pool: SqlitePool,
}

impl SettingsRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Upsert one entry; last write wins.
	#[tracing::instrument(skip(self, value))]
	pub async fn set(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
		let key = normalize_key(key);
		if key.is_empty() {
			return Err(DbError::InvalidSetting {
				key,
				value: value.to_string(),
				message: "key must not be empty".to_string(),
			});
		}
		validate_setting(&key, value)?;

		sqlx::query(
			r#"
			INSERT INTO queue_config (key, value, updated_at)
			VALUES (?, ?, ?)
			ON CONFLICT(key) DO UPDATE SET
				value = excluded.value,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&key)
		.bind(value)
		.bind(format_timestamp(now))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn all(&self) -> Result<BTreeMap<String, String>> {
		let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM queue_config")
			.fetch_all(&self.pool)
			.await?;

		Ok(rows.into_iter().collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn load(&self) -> Result<QueueSettings> {
		QueueSettings::from_entries(&self.all().await?)
	}
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
	async fn set(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()>;
	async fn all(&self) -> Result<BTreeMap<String, String>>;
	async fn load(&self) -> Result<QueueSettings>;
}

#[async_trait]
impl SettingsStore for SettingsRepository {
	async fn set(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
		self.set(key, value, now).await
	}

	async fn all(&self) -> Result<BTreeMap<String, String>> {
		self.all().await
	}

	async fn load(&self) -> Result<QueueSettings> {
		self.load().await
	}
}
