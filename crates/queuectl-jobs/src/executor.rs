// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs a claimed job's command as a subprocess under a wall-clock limit.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

use crate::types::{ExecutionOutcome, Job};

/// Largest stdout or stderr a job may produce before it is failed.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[async_trait]
pub trait Executor: Send + Sync {
	/// Run the job's command to completion or timeout. Never fails: spawn
	/// errors and timeouts are reported as `ExecutionOutcome::Failed`.
	async fn execute(&self, job: &Job) -> ExecutionOutcome;
}

/// Executes commands through the platform shell.
///
/// On unix the shell leads its own process group, and the whole group is
/// killed when the timeout fires or the output limit is exceeded, so
/// commands the shell forked stop with it. No sandboxing is applied; the
/// command runs with the worker's privileges.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
	shell: String,
	flag: String,
	max_output_bytes: usize,
}

impl ShellExecutor {
	pub fn new() -> Self {
		if cfg!(windows) {
			Self::with_shell("cmd", "/C")
		} else {
			Self::with_shell("sh", "-c")
		}
	}

	pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
		Self {
			shell: shell.into(),
			flag: flag.into(),
			max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
		}
	}

	pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
		self.max_output_bytes = bytes;
		self
	}

	fn command(&self, command: &str) -> Command {
		let mut cmd = Command::new(&self.shell);
		cmd.arg(&self.flag)
			.arg(command)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		#[cfg(unix)]
		cmd.process_group(0);
		cmd
	}
}

impl Default for ShellExecutor {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Executor for ShellExecutor {
	#[instrument(skip(self, job), fields(job_id = %job.id, timeout_ms = job.timeout_ms))]
	async fn execute(&self, job: &Job) -> ExecutionOutcome {
		let mut child = match self.command(&job.command).spawn() {
			Ok(child) => child,
			Err(e) => {
				return ExecutionOutcome::Failed {
					detail: format!("failed to spawn command: {e}"),
				}
			}
		};
		let pid = child.id();

		let result =
			tokio::time::timeout(job.timeout(), capture(&mut child, self.max_output_bytes)).await;

		let detail = match result {
			Ok(Ok(captured)) => return process_output(captured),
			Ok(Err(CaptureError::Overflow)) => {
				debug!("command exceeded the output limit, killing");
				format!("output exceeded {} bytes", self.max_output_bytes)
			}
			Ok(Err(CaptureError::Io(e))) => format!("failed to wait for command: {e}"),
			Err(_) => {
				debug!("command exceeded its timeout, killing");
				format!("timed out after {} ms", job.timeout_ms)
			}
		};

		// The shell has not been reaped, so its pid still names our group.
		kill_process_group(pid);
		ExecutionOutcome::Failed { detail }
	}
}

struct Captured {
	status: ExitStatus,
	stdout: Vec<u8>,
	stderr: Vec<u8>,
}

enum CaptureError {
	Overflow,
	Io(std::io::Error),
}

impl From<std::io::Error> for CaptureError {
	fn from(e: std::io::Error) -> Self {
		CaptureError::Io(e)
	}
}

async fn capture(child: &mut Child, limit: usize) -> Result<Captured, CaptureError> {
	let (stdout, stderr) = tokio::try_join!(
		read_capped(child.stdout.take(), limit),
		read_capped(child.stderr.take(), limit),
	)?;
	let status = child.wait().await?;
	Ok(Captured {
		status,
		stdout,
		stderr,
	})
}

async fn read_capped<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, CaptureError>
where
	R: AsyncRead + Unpin,
{
	let mut buf = Vec::new();
	let Some(reader) = reader else {
		return Ok(buf);
	};
	let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
	reader.take(cap).read_to_end(&mut buf).await?;
	if buf.len() > limit {
		return Err(CaptureError::Overflow);
	}
	Ok(buf)
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
	let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
		return;
	};
	// A negative pid addresses every process in the group.
	if unsafe { libc::kill(-pid, libc::SIGKILL) } != 0 {
		debug!(pid, error = %std::io::Error::last_os_error(), "failed to kill process group");
	}
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn process_output(output: Captured) -> ExecutionOutcome {
	let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

	if output.status.success() {
		return ExecutionOutcome::Succeeded { stdout };
	}

	let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
	let detail = if !stderr.trim().is_empty() {
		stderr
	} else {
		match output.status.code() {
			Some(code) => format!("exit status: {code}"),
			None => "terminated by signal".to_string(),
		}
	};

	ExecutionOutcome::Failed { detail }
}
