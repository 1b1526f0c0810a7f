//! Order processor for delivered events.
//!
//! Every delivery moves through `Received -> Validated -> Processing ->
//! Persisted` and ends in exactly one [`DeliveryOutcome`]:
//!
//! - `Ack` once the processed record is in the state store,
//! - `Drop` when the message can never be processed (bad JSON, no order id),
//! - `Retry` for everything else, including panics, so the broker redelivers.
//!
//! Persistence is keyed by order id, so a redelivered message overwrites the
//! record written by an earlier attempt.

use crate::decode::{decode_payload, DecodeError, DeliveredOrder};
use chrono::Utc;
use futures::FutureExt;
use pipeline_state::{StateStoreError, StateStoreService};
use pipeline_types::{DeliveryResponse, DeliveryStatus, ErrorClass, OrderStatus, StateEntry};
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Where a delivery currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
	Received,
	Validated,
	Processing,
	Persisted,
}

impl DeliveryStage {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeliveryStage::Received => "received",
			DeliveryStage::Validated => "validated",
			DeliveryStage::Processing => "processing",
			DeliveryStage::Persisted => "persisted",
		}
	}
}

impl fmt::Display for DeliveryStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Terminal result of handling one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
	/// Persisted; the broker may discard the message.
	Ack { order_id: String },
	/// Transient failure; the broker should redeliver.
	Retry {
		order_id: Option<String>,
		stage: DeliveryStage,
		reason: String,
	},
	/// Unprocessable; the broker must not redeliver.
	Drop { reason: String },
}

impl DeliveryOutcome {
	pub fn status(&self) -> DeliveryStatus {
		match self {
			DeliveryOutcome::Ack { .. } => DeliveryStatus::Success,
			DeliveryOutcome::Retry { .. } => DeliveryStatus::Retry,
			DeliveryOutcome::Drop { .. } => DeliveryStatus::Drop,
		}
	}

	/// The body returned to the sidecar.
	pub fn to_response(&self) -> DeliveryResponse {
		let message = match self {
			DeliveryOutcome::Ack { .. } => None,
			DeliveryOutcome::Retry { reason, .. } | DeliveryOutcome::Drop { reason } => {
				Some(reason.clone())
			},
		};
		DeliveryResponse {
			status: self.status(),
			message,
		}
	}
}

impl From<DecodeError> for DeliveryOutcome {
	fn from(err: DecodeError) -> Self {
		DeliveryOutcome::Drop {
			reason: err.to_string(),
		}
	}
}

/// Handles deliveries from the order topic.
pub struct OrderProcessor {
	state: Arc<StateStoreService>,
	/// Written to `processed_by` on every record.
	processed_by: String,
	delay: Duration,
}

impl OrderProcessor {
	pub fn new(state: Arc<StateStoreService>, processed_by: impl Into<String>, delay: Duration) -> Self {
		Self {
			state,
			processed_by: processed_by.into(),
			delay,
		}
	}

	/// Handles one delivery and always returns an outcome.
	///
	/// A panic anywhere below is caught here and reported as `Retry`.
	pub async fn handle(&self, content_type: Option<&str>, body: &[u8]) -> DeliveryOutcome {
		let span = tracing::info_span!(
			"delivery",
			order_id = tracing::field::Empty,
			stage = DeliveryStage::Received.as_str()
		);

		let result = AssertUnwindSafe(self.process(content_type, body).instrument(span.clone()))
			.catch_unwind()
			.await;

		match result {
			Ok(outcome) => {
				span.in_scope(|| log_outcome(&outcome));
				outcome
			},
			Err(panic) => {
				let reason = panic_message(&*panic);
				span.in_scope(|| tracing::error!(reason = %reason, "Unexpected error processing order"));
				DeliveryOutcome::Retry {
					order_id: None,
					stage: DeliveryStage::Processing,
					reason: format!("Unexpected error: {}", reason),
				}
			},
		}
	}

	async fn process(&self, content_type: Option<&str>, body: &[u8]) -> DeliveryOutcome {
		let span = tracing::Span::current();
		tracing::debug!(content_type = content_type.unwrap_or(""), "Received event");

		let order = match decode_payload(content_type, body).and_then(DeliveredOrder::from_payload) {
			Ok(order) => order,
			Err(e) => return e.into(),
		};
		span.record("order_id", order.order_id.as_str());
		span.record("stage", DeliveryStage::Validated.as_str());
		tracing::info!("Processing order");

		span.record("stage", DeliveryStage::Processing.as_str());
		if !self.delay.is_zero() {
			tracing::debug!(delay_ms = self.delay.as_millis() as u64, "Simulating processing time");
			tokio::time::sleep(self.delay).await;
		}
		let order_id = order.order_id.clone();
		let record = self.processed_record(order);

		match self.state.put(vec![StateEntry::new(&order_id, record)]).await {
			Ok(()) => {
				span.record("stage", DeliveryStage::Persisted.as_str());
				DeliveryOutcome::Ack { order_id }
			},
			Err(e) => DeliveryOutcome::Retry {
				order_id: Some(order_id),
				stage: DeliveryStage::Processing,
				reason: persist_failure(&e),
			},
		}
	}

	/// The delivered payload with the processing fields set.
	fn processed_record(&self, order: DeliveredOrder) -> Value {
		let mut record = order.body;
		record.insert("status".into(), json!(OrderStatus::Processed));
		record.insert("processed_at".into(), json!(Utc::now()));
		record.insert("processed_by".into(), json!(self.processed_by));
		Value::Object(record)
	}
}

fn log_outcome(outcome: &DeliveryOutcome) {
	match outcome {
		DeliveryOutcome::Ack { .. } => tracing::info!("Successfully processed and saved order"),
		DeliveryOutcome::Retry { stage, reason, .. } => {
			tracing::warn!(stage = %stage, reason = %reason, "Delivery failed, requesting retry")
		},
		DeliveryOutcome::Drop { reason } => {
			tracing::warn!(reason = %reason, "Dropping unprocessable delivery")
		},
	}
}

fn persist_failure(err: &StateStoreError) -> String {
	match err.class() {
		ErrorClass::Transport => format!("Error communicating with state store: {}", err),
		_ => format!("Failed to save order state: {}", err),
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"panic".to_string()
	}
}
