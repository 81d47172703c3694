// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Detached worker processes tracked through pid files.
//!
//! `worker start` re-executes this binary as `queuectl worker run` and records
//! each child's pid as `<pid_dir>/worker-<pid>.pid`. `worker stop` signals
//! every recorded pid with SIGTERM and removes the files.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{info, warn};

const PID_PREFIX: &str = "worker-";
const PID_SUFFIX: &str = ".pid";
const LOG_FILE: &str = "workers.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
	pub pid: u32,
	pub path: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StopReport {
	pub signalled: Vec<u32>,
	pub stale: Vec<u32>,
}

pub fn pid_file_path(pid_dir: &Path, pid: u32) -> PathBuf {
	pid_dir.join(format!("{PID_PREFIX}{pid}{PID_SUFFIX}"))
}

/// Spawn `count` detached `worker run` processes. Their logs are appended to
/// `<pid_dir>/workers.log`.
pub fn start_workers(count: u32, pid_dir: &Path, config_path: Option<&Path>) -> Result<Vec<u32>> {
	fs::create_dir_all(pid_dir)
		.with_context(|| format!("failed to create pid directory {}", pid_dir.display()))?;
	let exe = std::env::current_exe().context("failed to locate the queuectl executable")?;
	let log_path = pid_dir.join(LOG_FILE);

	let mut pids = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let log = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&log_path)
			.with_context(|| format!("failed to open {}", log_path.display()))?;

		let mut cmd = Command::new(&exe);
		if let Some(path) = config_path {
			cmd.arg("--config").arg(path);
		}
		cmd.args(["worker", "run"])
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::from(log));
		detach(&mut cmd);

		let child = cmd.spawn().context("failed to spawn worker process")?;
		let pid = child.id();
		fs::write(pid_file_path(pid_dir, pid), pid.to_string())
			.with_context(|| format!("failed to write pid file for worker {pid}"))?;
		info!(pid, "Started worker process");
		pids.push(pid);
	}

	Ok(pids)
}

/// Pid files in `pid_dir`, sorted by pid. A missing directory has none.
pub fn list_pid_files(pid_dir: &Path) -> Result<Vec<PidFile>> {
	let entries = match fs::read_dir(pid_dir) {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => {
			return Err(e).with_context(|| format!("failed to read {}", pid_dir.display()))
		}
	};

	let mut files = Vec::new();
	for entry in entries {
		let path = entry?.path();
		let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
			continue;
		};
		if !name.starts_with(PID_PREFIX) || !name.ends_with(PID_SUFFIX) {
			continue;
		}
		let contents = fs::read_to_string(&path)
			.with_context(|| format!("failed to read {}", path.display()))?;
		match contents.trim().parse::<u32>() {
			Ok(pid) => files.push(PidFile { pid, path }),
			Err(_) => warn!(path = %path.display(), "Ignoring malformed pid file"),
		}
	}

	files.sort_by_key(|f| f.pid);
	Ok(files)
}

/// Pid files whose process is still running.
pub fn running_workers(pid_dir: &Path) -> Result<Vec<PidFile>> {
	Ok(list_pid_files(pid_dir)?
		.into_iter()
		.filter(|f| is_alive(f.pid))
		.collect())
}

/// SIGTERM every recorded worker and remove its pid file. Files for
/// processes that no longer exist are removed with a warning.
pub fn stop_workers(pid_dir: &Path) -> Result<StopReport> {
	let mut report = StopReport::default();

	for file in list_pid_files(pid_dir)? {
		if is_alive(file.pid) && terminate(file.pid)? {
			info!(pid = file.pid, "Sent SIGTERM to worker");
			report.signalled.push(file.pid);
		} else {
			warn!(pid = file.pid, "Removing stale pid file");
			report.stale.push(file.pid);
		}
		if let Err(e) = fs::remove_file(&file.path) {
			warn!(path = %file.path.display(), error = %e, "Failed to remove pid file");
		}
	}

	Ok(report)
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
	use std::os::unix::process::CommandExt;
	// Own process group so a ctrl-c in the launching terminal does not reach it.
	cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return false;
	};
	// Signal 0 performs the permission and existence checks only.
	unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
	false
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<bool> {
	let pid = libc::pid_t::try_from(pid).context("pid out of range")?;
	let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
	Ok(rc == 0)
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<bool> {
	anyhow::bail!("stopping workers is only supported on unix")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_pid_file_path() {
		assert_eq!(
			pid_file_path(Path::new("/run/q"), 42),
			PathBuf::from("/run/q/worker-42.pid")
		);
	}

	#[test]
	fn test_list_missing_dir_is_empty() {
		let dir = tempdir().unwrap();
		let files = list_pid_files(&dir.path().join("absent")).unwrap();
		assert!(files.is_empty());
	}

	#[test]
	fn test_list_skips_unrelated_and_malformed_files() {
		let dir = tempdir().unwrap();
		fs::write(pid_file_path(dir.path(), 20), "20").unwrap();
		fs::write(pid_file_path(dir.path(), 10), "10\n").unwrap();
		fs::write(dir.path().join("worker-x.pid"), "not a pid").unwrap();
		fs::write(dir.path().join(LOG_FILE), "log").unwrap();

		let pids: Vec<u32> = list_pid_files(dir.path())
			.unwrap()
			.into_iter()
			.map(|f| f.pid)
			.collect();
		assert_eq!(pids, vec![10, 20]);
	}

	#[cfg(unix)]
	#[test]
	fn test_stop_removes_stale_pid_files() {
		let dir = tempdir().unwrap();
		// Above the kernel pid_max limit, so no such process exists.
		let stale = 99_999_999;
		fs::write(pid_file_path(dir.path(), stale), stale.to_string()).unwrap();

		let report = stop_workers(dir.path()).unwrap();
		assert_eq!(report.stale, vec![stale]);
		assert!(report.signalled.is_empty());
		assert!(list_pid_files(dir.path()).unwrap().is_empty());
	}

	#[cfg(unix)]
	#[test]
	fn test_stop_signals_running_process() {
		let dir = tempdir().unwrap();
		let mut child = Command::new("sleep").arg("30").spawn().unwrap();
		let pid = child.id();
		fs::write(pid_file_path(dir.path(), pid), pid.to_string()).unwrap();

		assert_eq!(running_workers(dir.path()).unwrap().len(), 1);
		let report = stop_workers(dir.path()).unwrap();
		assert_eq!(report.signalled, vec![pid]);

		let status = child.wait().unwrap();
		assert!(!status.success());
		assert!(list_pid_files(dir.path()).unwrap().is_empty());
	}
}
