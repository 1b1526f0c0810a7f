//! Order ingestion and lookup endpoints.
//!
//! Bodies are parsed by hand rather than through the `Json` extractor so that
//! every failure, including bad JSON, comes back as an [`ErrorResponse`].
//!
//! [`ErrorResponse`]: pipeline_types::ErrorResponse

use crate::server::AppState;
use axum::{
	body::Bytes,
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use pipeline_core::IngestError;
use pipeline_state::StateStoreError;
use pipeline_types::{
	APIError, BulkOrderRequest, BulkOrderResponse, CreateOrderResponse, OrderValidationError,
};
use serde_json::{json, Value};

/// Seconds a client should wait before retrying after a 503.
const RETRY_AFTER_SECS: u64 = 5;

/// Handles POST /api/orders.
pub async fn handle_create_order(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<(StatusCode, Json<CreateOrderResponse>), APIError> {
	let payload = parse_body(&body)?;

	let order = state
		.pipeline
		.ingestor()
		.create(payload)
		.await
		.map_err(ingest_error)?;

	Ok((
		StatusCode::CREATED,
		Json(CreateOrderResponse {
			message: "Order created successfully".to_string(),
			order_id: order.order_id,
		}),
	))
}

/// Handles POST /api/orders/bulk.
///
/// An empty body runs with the configured defaults.
pub async fn handle_create_bulk(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<(StatusCode, Json<BulkOrderResponse>), APIError> {
	let request = match parse_body(&body)? {
		Value::Null => BulkOrderRequest::default(),
		value => serde_json::from_value(value)
			.map_err(|e| APIError::bad_request("INVALID_BULK_REQUEST", e.to_string()))?,
	};

	let response = state
		.pipeline
		.ingestor()
		.create_bulk(request)
		.await
		.map_err(ingest_error)?;

	Ok((StatusCode::CREATED, Json(response)))
}

/// Handles GET /api/orders/{id}.
///
/// Returns the record as the processor last persisted it.
pub async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Value>, APIError> {
	match state.pipeline.state().get(&id).await {
		Ok(Some(record)) => Ok(Json(record)),
		Ok(None) => Err(APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: format!("Order not found: {}", id),
		}),
		Err(e) => {
			tracing::warn!(order_id = %id, error = %e, "Order lookup failed");
			Err(state_error(e))
		},
	}
}

/// Parses a JSON body; an empty body is `null`.
fn parse_body(body: &[u8]) -> Result<Value, APIError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(Value::Null);
	}
	serde_json::from_slice(body)
		.map_err(|e| APIError::bad_request("INVALID_JSON", format!("Invalid JSON body: {}", e)))
}

fn ingest_error(err: IngestError) -> APIError {
	match err {
		IngestError::Validation(e) => {
			let error_type = match e {
				OrderValidationError::Empty => "NO_DATA",
				OrderValidationError::MissingField(_) => "MISSING_FIELD",
				_ => "VALIDATION_ERROR",
			};
			APIError::bad_request(error_type, e.to_string())
		},
		IngestError::InvalidBulkRequest(message) => {
			APIError::bad_request("INVALID_BULK_REQUEST", message)
		},
		IngestError::Unreachable(_) => APIError::ServiceUnavailable {
			error_type: "BROKER_UNREACHABLE".to_string(),
			message: err.to_string(),
			retry_after: Some(RETRY_AFTER_SECS),
		},
		IngestError::Timeout(_) => APIError::GatewayTimeout {
			error_type: "BROKER_TIMEOUT".to_string(),
			message: err.to_string(),
		},
		IngestError::Rejected { status, ref body } => APIError::InternalServerError {
			error_type: "PUBLISH_FAILED".to_string(),
			message: "Failed to publish order".to_string(),
			details: Some(json!({ "details": body, "status_code": status })),
		},
		IngestError::Internal(_) => APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: err.to_string(),
			details: None,
		},
	}
}

fn state_error(err: StateStoreError) -> APIError {
	match err {
		StateStoreError::Connection(_) => APIError::ServiceUnavailable {
			error_type: "STATE_STORE_UNREACHABLE".to_string(),
			message: err.to_string(),
			retry_after: Some(RETRY_AFTER_SECS),
		},
		StateStoreError::Timeout(_) => APIError::GatewayTimeout {
			error_type: "STATE_STORE_TIMEOUT".to_string(),
			message: err.to_string(),
		},
		_ => APIError::InternalServerError {
			error_type: "STATE_STORE_ERROR".to_string(),
			message: err.to_string(),
			details: None,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::server::tests::{json_body, send, test_app};
	use axum::body::Body;
	use pipeline_broker::implementations::memory::BrokerFailure;
	use pipeline_state::implementations::memory::StoreFailure;

	fn order_json() -> String {
		json!({
			"order_id": "api-1",
			"customer_name": "Ada",
			"items": ["widget"],
			"total": 42.0
		})
		.to_string()
	}

	async fn post(app: &axum::Router, uri: &str, body: impl Into<Body>) -> axum::response::Response {
		send(app, "POST", uri, Some("application/json"), body).await
	}

	#[tokio::test]
	async fn test_create_order() {
		let (app, broker, _) = test_app("");

		let response = post(&app, "/api/orders", order_json()).await;
		assert_eq!(response.status(), StatusCode::CREATED);
		assert_eq!(
			json_body(response).await,
			json!({"message": "Order created successfully", "order_id": "api-1"})
		);

		let published = broker.published().await;
		assert_eq!(published.len(), 1);
		assert_eq!(published[0].message["status"], "pending");
	}

	#[tokio::test]
	async fn test_missing_field_is_bad_request() {
		let (app, broker, _) = test_app("");
		let mut order: Value = serde_json::from_str(&order_json()).unwrap();
		order.as_object_mut().unwrap().remove("customer_name");

		let response = post(&app, "/api/orders", order.to_string()).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let body = json_body(response).await;
		assert_eq!(body["error"], "MISSING_FIELD");
		assert_eq!(body["message"], "Missing required field: customer_name");
		assert_eq!(broker.attempts(), 0);
	}

	#[tokio::test]
	async fn test_empty_and_invalid_bodies() {
		let (app, broker, _) = test_app("");

		let response = post(&app, "/api/orders", Body::empty()).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(json_body(response).await["message"], "No data provided");

		let response = post(&app, "/api/orders", "{oops").await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(json_body(response).await["error"], "INVALID_JSON");

		assert_eq!(broker.attempts(), 0);
	}

	#[tokio::test]
	async fn test_broker_unreachable_is_503() {
		let (app, broker, _) = test_app("");
		broker.set_failure(Some(BrokerFailure::Unreachable)).await;

		let response = post(&app, "/api/orders", order_json()).await;
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
		let body = json_body(response).await;
		assert_eq!(body["error"], "BROKER_UNREACHABLE");
		assert_eq!(body["retryAfter"], 5);
	}

	#[tokio::test(start_paused = true)]
	async fn test_broker_timeout_is_504() {
		let (app, broker, _) = test_app("");
		broker.set_failure(Some(BrokerFailure::Hang)).await;

		let response = post(&app, "/api/orders", order_json()).await;
		assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
	}

	#[tokio::test]
	async fn test_broker_rejection_is_500_with_details() {
		let (app, broker, _) = test_app("");
		broker.set_failure(Some(BrokerFailure::Reject(403))).await;

		let response = post(&app, "/api/orders", order_json()).await;
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		let body = json_body(response).await;
		assert_eq!(body["error"], "PUBLISH_FAILED");
		assert_eq!(body["details"]["status_code"], 403);
	}

	#[tokio::test]
	async fn test_bulk_limits() {
		let (app, broker, _) = test_app("");

		let response = post(&app, "/api/orders/bulk", json!({"count": 10_001}).to_string()).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(broker.attempts(), 0);

		let response = post(
			&app,
			"/api/orders/bulk",
			json!({"count": 3, "prefix": "load-test"}).to_string(),
		)
		.await;
		assert_eq!(response.status(), StatusCode::CREATED);
		assert_eq!(
			json_body(response).await,
			json!({
				"message": "Created 3 orders",
				"created": 3,
				"failed": 0,
				"orders": ["load-test-0001", "load-test-0002", "load-test-0003"]
			})
		);
	}

	#[tokio::test]
	async fn test_bulk_empty_body_uses_defaults() {
		let (app, broker, _) = test_app("");

		let response = post(&app, "/api/orders/bulk", Body::empty()).await;
		assert_eq!(response.status(), StatusCode::CREATED);
		assert_eq!(json_body(response).await["created"], 10);
		assert_eq!(broker.published().await.len(), 10);
	}

	#[tokio::test]
	async fn test_bulk_rejects_non_integer_count() {
		let (app, _, _) = test_app("");

		let response = post(&app, "/api/orders/bulk", json!({"count": "many"}).to_string()).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(json_body(response).await["error"], "INVALID_BULK_REQUEST");
	}

	#[tokio::test]
	async fn test_get_unknown_order_is_404() {
		let (app, _, _) = test_app("");

		let response = send(&app, "GET", "/api/orders/nope", None, Body::empty()).await;
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		assert_eq!(json_body(response).await["error"], "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_get_with_store_down_is_503() {
		let (app, _, store) = test_app("");
		store.set_failure(Some(StoreFailure::Unreachable)).await;

		let response = send(&app, "GET", "/api/orders/api-1", None, Body::empty()).await;
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[test]
	fn test_ingest_error_mapping() {
		let timeout = ingest_error(IngestError::Timeout(std::time::Duration::from_secs(5)));
		assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

		let internal = ingest_error(IngestError::Internal("boom".into()));
		assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

		tokio_test::assert_ok!(parse_body(b"  "));
		tokio_test::assert_err!(parse_body(b"[1,"));
	}
}
