// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use queuectl_jobs::ShutdownToken;
use tracing::{info, warn};

/// Resolves on SIGTERM or ctrl-c, whichever comes first.
pub async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		match signal(SignalKind::terminate()) {
			Ok(mut sigterm) => {
				tokio::select! {
					_ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
					_ = tokio::signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown"),
				}
				return;
			}
			Err(e) => warn!(error = %e, "Failed to install SIGTERM handler, using ctrl-c only"),
		}
	}

	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!(error = %e, "Failed to listen for ctrl-c");
		std::future::pending::<()>().await;
	}
	info!("Received SIGINT, initiating graceful shutdown");
}

/// Cancel `token` when the process is asked to stop.
pub fn install_shutdown_handler(token: ShutdownToken) {
	tokio::spawn(async move {
		shutdown_signal().await;
		token.cancel();
	});
}
