//! Liveness, readiness and service info endpoints.

use crate::server::AppState;
use axum::{extract::State, response::Json};
use chrono::Utc;
use serde_json::{json, Value};

/// Handles GET /health.
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
	Json(json!({
		"status": "healthy",
		"service": state.pipeline.config().service.id,
		"timestamp": Utc::now().to_rfc3339(),
	}))
}

/// Handles GET /ready.
pub async fn handle_ready(State(state): State<AppState>) -> Json<Value> {
	let service = &state.pipeline.config().service;
	Json(json!({
		"status": "ready",
		"service": service.id,
		"role": service.role.as_str(),
	}))
}

/// Handles GET /.
pub async fn handle_root(State(state): State<AppState>) -> Json<Value> {
	let config = state.pipeline.config();
	Json(json!({
		"service": env!("CARGO_PKG_NAME"),
		"version": env!("CARGO_PKG_VERSION"),
		"role": config.service.role.as_str(),
		"subscriptions": {
			"pubsub": config.broker.pubsub_name,
			"topic": config.broker.topic,
			"route": config.processor.route,
		},
		"statestore": config.state.store_name,
	}))
}

#[cfg(test)]
mod tests {
	use crate::server::tests::{json_body, send, test_app};
	use axum::body::Body;

	#[tokio::test]
	async fn test_root_describes_service() {
		let (app, _, _) = test_app("");

		let body = json_body(send(&app, "GET", "/", None, Body::empty()).await).await;
		assert_eq!(body["service"], "pipeline-service");
		assert_eq!(body["role"], "all");
		assert_eq!(body["subscriptions"]["topic"], "orders");
		assert_eq!(body["statestore"], "statestore");
	}

	#[tokio::test]
	async fn test_health_has_timestamp() {
		let (app, _, _) = test_app("");

		let body = json_body(send(&app, "GET", "/health", None, Body::empty()).await).await;
		assert!(body["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
	}
}
