// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::QueuectlConfigLayer;
use crate::sections::{
	DashboardConfigLayer, DatabaseConfigLayer, LogFormat, LoggingConfigLayer, WorkerConfigLayer,
};

pub const DEFAULT_CONFIG_FILE: &str = "./queuectl.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<QueuectlConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<QueuectlConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(QueuectlConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `./queuectl.toml` in the working directory.
	pub fn local() -> Self {
		Self::new(DEFAULT_CONFIG_FILE)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<QueuectlConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(QueuectlConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: QueuectlConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: QUEUECTL_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<QueuectlConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(&|name: &str| std::env::var(name).ok())
	}
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn load_from(lookup: Lookup<'_>) -> Result<QueuectlConfigLayer, ConfigError> {
	Ok(QueuectlConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env_var(lookup, "QUEUECTL_DATABASE_URL"),
		}),
		worker: Some(WorkerConfigLayer {
			poll_interval_ms: env_parse(lookup, "QUEUECTL_WORKER_POLL_INTERVAL_MS")?,
			pid_dir: env_var(lookup, "QUEUECTL_WORKER_PID_DIR").map(PathBuf::from),
			default_timeout_ms: env_parse(lookup, "QUEUECTL_WORKER_DEFAULT_TIMEOUT_MS")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: env_var(lookup, "QUEUECTL_LOGGING_LEVEL"),
			format: env_parse::<LogFormat>(lookup, "QUEUECTL_LOGGING_FORMAT")?,
		}),
		dashboard: Some(DashboardConfigLayer {
			host: env_var(lookup, "QUEUECTL_DASHBOARD_HOST"),
			port: env_parse(lookup, "QUEUECTL_DASHBOARD_PORT")?,
			recent_limit: env_parse(lookup, "QUEUECTL_DASHBOARD_RECENT_LIMIT")?,
		}),
	})
}

fn env_var(lookup: Lookup<'_>, name: &str) -> Option<String> {
	lookup(name).filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(lookup: Lookup<'_>, name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(lookup, name) {
		Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid value '{v}'"),
		}),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name: &str| map.get(name).cloned()
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.worker.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/queuectl.toml").load().unwrap();
		assert_eq!(layer, QueuectlConfigLayer::default());
	}

	#[test]
	fn test_toml_source_reads_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[worker]\npoll_interval_ms = 50").unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.worker.unwrap().poll_interval_ms, Some(50));
	}

	#[test]
	fn test_toml_source_parse_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[worker]\npoll_interval_ms = \"fast\"").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_vars_map_to_sections() {
		let lookup = lookup_in(&[
			("QUEUECTL_DATABASE_URL", "sqlite:/tmp/env.db"),
			("QUEUECTL_WORKER_POLL_INTERVAL_MS", "250"),
			("QUEUECTL_LOGGING_FORMAT", "json"),
			("QUEUECTL_DASHBOARD_PORT", "8088"),
			("QUEUECTL_DASHBOARD_HOST", ""),
		]);
		let layer = load_from(&lookup).unwrap();

		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("sqlite:/tmp/env.db")
		);
		assert_eq!(layer.worker.unwrap().poll_interval_ms, Some(250));
		assert_eq!(layer.logging.unwrap().format, Some(LogFormat::Json));
		let dashboard = layer.dashboard.unwrap();
		assert_eq!(dashboard.port, Some(8088));
		assert!(dashboard.host.is_none());
	}

	#[test]
	fn test_env_invalid_number() {
		let lookup = lookup_in(&[("QUEUECTL_DASHBOARD_PORT", "70000")]);
		match load_from(&lookup).unwrap_err() {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, "QUEUECTL_DASHBOARD_PORT"),
			e => panic!("Expected InvalidValue, got: {e:?}"),
		}
	}
}
