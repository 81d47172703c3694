// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-only HTTP dashboard.

use axum::{
	extract::State,
	http::StatusCode,
	response::{Html, IntoResponse, Response},
	routing::get,
	Json, Router,
};
use queuectl_jobs::{JobError, JobQueue, QueueSnapshot};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct DashboardState {
	pub queue: JobQueue,
	pub recent_limit: u32,
}

pub struct ApiError(JobError);

impl From<JobError> for ApiError {
	fn from(e: JobError) -> Self {
		Self(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		error!(error = %self.0, "Dashboard query failed");
		(
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(json!({ "error": self.0.to_string() })),
		)
			.into_response()
	}
}

pub fn create_router(state: DashboardState) -> Router {
	Router::new()
		.route("/", get(index))
		.route("/api/stats", get(stats))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn stats(State(state): State<DashboardState>) -> Result<Json<QueueSnapshot>, ApiError> {
	let snapshot = state.queue.snapshot(state.recent_limit).await?;
	Ok(Json(snapshot))
}

async fn index() -> Html<&'static str> {
	Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>queuectl</title>
<style>
body { font-family: ui-monospace, monospace; margin: 2rem; }
table { border-collapse: collapse; margin-bottom: 1.5rem; }
td, th { border: 1px solid #ccc; padding: 0.25rem 0.75rem; text-align: left; }
#error { color: #b00; }
</style>
</head>
<body>
<h1>queuectl</h1>
<p id="error"></p>
<h2>Jobs by state</h2>
<table id="counts"></table>
<h2>Execution</h2>
<table id="execution"></table>
<h2>Recent jobs</h2>
<table id="recent"></table>
<script>
function rows(table, header, data) {
  const el = document.getElementById(table);
  el.innerHTML = "";
  const head = el.insertRow();
  header.forEach(h => { const th = document.createElement("th"); th.textContent = h; head.appendChild(th); });
  data.forEach(r => { const row = el.insertRow(); r.forEach(v => { row.insertCell().textContent = v ?? ""; }); });
}
async function refresh() {
  try {
    const res = await fetch("/api/stats");
    const body = await res.json();
    if (!res.ok) throw new Error(body.error);
    document.getElementById("error").textContent = "";
    rows("counts", ["state", "count"], body.counts.map(c => [c.state, c.count]));
    const e = body.execution;
    rows("execution", ["completed", "min ms", "avg ms", "max ms"],
      e ? [[e.completed, e.min_ms, e.avg_ms.toFixed(1), e.max_ms]] : []);
    rows("recent", ["id", "state", "attempts", "updated"],
      body.recent.map(j => [j.id, j.state, j.attempts + "/" + j.max_retries, j.updated_at]));
  } catch (err) {
    document.getElementById("error").textContent = String(err);
  }
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use chrono::Utc;
	use queuectl_db::testing::create_test_pool;
	use queuectl_jobs::JobSubmission;
	use tower::ServiceExt;

	async fn setup() -> (Router, JobQueue) {
		let queue = JobQueue::from_pool(create_test_pool().await);
		let router = create_router(DashboardState {
			queue: queue.clone(),
			recent_limit: 2,
		});
		(router, queue)
	}

	#[tokio::test]
	async fn test_stats_returns_snapshot() {
		let (router, queue) = setup().await;
		for id in ["a", "b", "c"] {
			queue
				.submit(JobSubmission::new(id, "true"), Utc::now())
				.await
				.unwrap();
		}

		let response = router
			.oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		let pending = json["counts"]
			.as_array()
			.unwrap()
			.iter()
			.find(|c| c["state"] == "pending")
			.unwrap();
		assert_eq!(pending["count"], 3);
		assert_eq!(json["recent"].as_array().unwrap().len(), 2);
		assert!(json["execution"].is_null());
	}

	#[tokio::test]
	async fn test_index_serves_html() {
		let (router, _queue) = setup().await;
		let response = router
			.oneshot(Request::get("/").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert!(String::from_utf8_lossy(&body).contains("/api/stats"));
	}

	#[tokio::test]
	async fn test_store_failure_is_500_with_error_body() {
		let pool = create_test_pool().await;
		let queue = JobQueue::from_pool(pool.clone());
		pool.close().await;
		let router = create_router(DashboardState {
			queue,
			recent_limit: 10,
		});

		let response = router
			.oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert!(json["error"].is_string());
	}
}
