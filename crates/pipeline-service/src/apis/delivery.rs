//! Delivery endpoint the sidecar posts topic messages to.
//!
//! The body is read raw so that malformed JSON reaches the processor and is
//! answered with `DROP` instead of an extractor rejection.

use crate::server::AppState;
use axum::{
	body::Bytes,
	extract::State,
	http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
	response::Json,
};
use pipeline_types::{DeliveryResponse, DeliveryStatus};

/// Handles POST on the configured delivery route.
pub async fn handle_delivery(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> (StatusCode, Json<DeliveryResponse>) {
	let content_type = headers
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok());

	let outcome = state.pipeline.processor().handle(content_type, &body).await;
	let response = outcome.to_response();
	(status_code(response.status), Json(response))
}

/// 2xx acks, 5xx asks for redelivery, 4xx drops.
fn status_code(status: DeliveryStatus) -> StatusCode {
	match status {
		DeliveryStatus::Success => StatusCode::OK,
		DeliveryStatus::Retry => StatusCode::INTERNAL_SERVER_ERROR,
		DeliveryStatus::Drop => StatusCode::BAD_REQUEST,
	}
}
