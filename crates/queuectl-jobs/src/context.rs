// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Identity and shutdown signal for one worker loop.
#[derive(Clone)]
pub struct WorkerContext {
	pub worker_id: String,
	pub shutdown: ShutdownToken,
}

impl WorkerContext {
	pub fn new(shutdown: ShutdownToken) -> Self {
		Self {
			worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
			shutdown,
		}
	}

	pub fn with_id(worker_id: impl Into<String>, shutdown: ShutdownToken) -> Self {
		Self {
			worker_id: worker_id.into(),
			shutdown,
		}
	}
}

/// Request for a worker to stop once its in-flight job resolves.
#[derive(Clone)]
pub struct ShutdownToken {
	cancelled: Arc<AtomicBool>,
	notify: Arc<Notify>,
}

impl ShutdownToken {
	pub fn new() -> Self {
		Self {
			cancelled: Arc::new(AtomicBool::new(false)),
			notify: Arc::new(Notify::new()),
		}
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
		self.notify.notify_waiters();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	/// Resolves once `cancel` has been called.
	pub async fn cancelled(&self) {
		loop {
			let notified = self.notify.notified();
			if self.is_cancelled() {
				return;
			}
			notified.await;
		}
	}
}

impl Default for ShutdownToken {
	fn default() -> Self {
		Self::new()
	}
}
