//! Subscription discovery endpoint.

use crate::server::AppState;
use axum::{extract::State, response::Json};
use pipeline_types::Subscription;

/// Handles GET /dapr/subscribe.
///
/// The sidecar calls this once at startup to learn which topics to deliver
/// and where.
pub async fn handle_subscribe(State(state): State<AppState>) -> Json<Vec<Subscription>> {
	let subscriptions = state.pipeline.subscriptions().to_vec();
	tracing::info!(count = subscriptions.len(), "Subscription endpoint called");
	Json(subscriptions)
}
