// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process configuration for queuectl.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`QUEUECTL_*`)
//!
//! Queue tunables such as `max_retries` live in the database and are managed
//! with `queuectl config set`; this crate covers only where the process finds
//! its database and how it runs.
//!
//! # Usage
//!
//! ```ignore
//! use queuectl_config::load_config;
//!
//! let config = load_config()?;
//! println!("Polling every {} ms", config.worker.poll_interval_ms);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

use std::path::PathBuf;

pub use error::ConfigError;
pub use layer::QueuectlConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, DEFAULT_CONFIG_FILE,
};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueuectlConfig {
	pub database: DatabaseConfig,
	pub worker: WorkerConfig,
	pub logging: LoggingConfig,
	pub dashboard: DashboardConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`QUEUECTL_*`)
/// 2. Config file (`./queuectl.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<QueuectlConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::local()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<PathBuf>,
) -> Result<QueuectlConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge the given sources in precedence order and finalize.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<QueuectlConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = QueuectlConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: QueuectlConfigLayer) -> Result<QueuectlConfig, ConfigError> {
	let config = QueuectlConfig {
		database: layer.database.unwrap_or_default().finalize(),
		worker: layer.worker.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		dashboard: layer.dashboard.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		poll_interval_ms = config.worker.poll_interval_ms,
		pid_dir = %config.worker.pid_dir.display(),
		log_level = %config.logging.level,
		log_format = %config.logging.format,
		dashboard = %config.dashboard.socket_addr(),
		"Configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
pub fn validate_config(config: &QueuectlConfig) -> Result<(), ConfigError> {
	if config.worker.poll_interval_ms == 0 {
		return Err(ConfigError::Validation(
			"worker.poll_interval_ms must be greater than zero".to_string(),
		));
	}
	if config.worker.default_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"worker.default_timeout_ms must be greater than zero".to_string(),
		));
	}
	if config.dashboard.port == 0 {
		return Err(ConfigError::Validation(
			"dashboard.port must be greater than zero".to_string(),
		));
	}
	Ok(())
}
