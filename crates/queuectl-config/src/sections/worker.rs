// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Worker process configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_PID_DIR: &str = "./.queuectl_pids";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WorkerConfigLayer {
	#[serde(default)]
	pub poll_interval_ms: Option<u64>,
	#[serde(default)]
	pub pid_dir: Option<PathBuf>,
	#[serde(default)]
	pub default_timeout_ms: Option<u64>,
}

impl WorkerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.poll_interval_ms.is_some() {
			self.poll_interval_ms = other.poll_interval_ms;
		}
		if other.pid_dir.is_some() {
			self.pid_dir = other.pid_dir;
		}
		if other.default_timeout_ms.is_some() {
			self.default_timeout_ms = other.default_timeout_ms;
		}
	}

	pub fn finalize(self) -> WorkerConfig {
		WorkerConfig {
			poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
			pid_dir: self
				.pid_dir
				.unwrap_or_else(|| PathBuf::from(DEFAULT_PID_DIR)),
			default_timeout_ms: self.default_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
	/// Sleep between idle poll cycles.
	pub poll_interval_ms: u64,
	/// Where `worker start` records the pids of detached workers.
	pub pid_dir: PathBuf,
	/// Timeout applied to `enqueue` when none is given.
	pub default_timeout_ms: u64,
}

impl WorkerConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn default_timeout(&self) -> Duration {
		Duration::from_millis(self.default_timeout_ms)
	}
}

impl Default for WorkerConfig {
	fn default() -> Self {
		WorkerConfigLayer::default().finalize()
	}
}
