// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dashboard HTTP configuration.

use serde::Deserialize;

/// Dashboard configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
	pub host: String,
	pub port: u16,
	/// Number of recently updated jobs shown.
	pub recent_limit: u32,
}

impl DashboardConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

impl Default for DashboardConfig {
	fn default() -> Self {
		DashboardConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DashboardConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub recent_limit: Option<u32>,
}

impl DashboardConfigLayer {
	pub fn merge(&mut self, other: DashboardConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.recent_limit.is_some() {
			self.recent_limit = other.recent_limit;
		}
	}

	pub fn finalize(self) -> DashboardConfig {
		DashboardConfig {
			host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
			port: self.port.unwrap_or(3000),
			recent_limit: self.recent_limit.unwrap_or(10),
		}
	}
}
