// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for queuectl.

pub mod dashboard;
pub mod database;
pub mod logging;
pub mod worker;

pub use dashboard::{DashboardConfig, DashboardConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer, DEFAULT_DATABASE_URL};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use worker::{WorkerConfig, WorkerConfigLayer};
