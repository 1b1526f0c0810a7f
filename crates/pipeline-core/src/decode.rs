//! Decoding of delivered messages into order payloads.
//!
//! The sidecar delivers either a structured CloudEvent (content type
//! `application/cloudevents+json`) whose `data` member holds the order, or the
//! order JSON itself. The envelope is tried first and the raw body is the
//! fallback, so a sidecar configured for raw delivery still works.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Reasons a delivery cannot be turned into an order. All of them are
/// permanent: redelivering the same bytes cannot succeed.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
	#[error("Invalid JSON data: {0}")]
	MalformedBody(String),
	#[error("Invalid event data: {0}")]
	MalformedEnvelope(String),
	#[error("No data provided")]
	EmptyPayload,
	#[error("Missing order_id")]
	MissingOrderId,
	#[error("order_id must be a non-empty string")]
	InvalidOrderId,
}

/// The subset of a CloudEvent the processor cares about.
#[derive(Debug, Deserialize)]
struct CloudEvent {
	#[serde(rename = "type", default)]
	event_type: Option<String>,
	#[serde(default)]
	data: Option<Value>,
}

/// An order payload that passed the processor's own validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredOrder {
	pub order_id: String,
	/// The payload as delivered, including `order_id`.
	pub body: Map<String, Value>,
}

impl DeliveredOrder {
	/// Checks that the payload carries a usable `order_id`.
	pub fn from_payload(body: Map<String, Value>) -> Result<Self, DecodeError> {
		let order_id = match body.get("order_id") {
			None | Some(Value::Null) => return Err(DecodeError::MissingOrderId),
			Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
			Some(_) => return Err(DecodeError::InvalidOrderId),
		};
		Ok(Self { order_id, body })
	}
}

/// Decodes a delivery body into the inner order payload.
pub fn decode_payload(
	content_type: Option<&str>,
	body: &[u8],
) -> Result<Map<String, Value>, DecodeError> {
	let value: Value =
		serde_json::from_slice(body).map_err(|e| DecodeError::MalformedBody(e.to_string()))?;

	if is_cloudevent(content_type) {
		match unwrap_envelope(&value) {
			Ok(payload) => return into_object(payload),
			Err(e) => {
				tracing::debug!(error = %e, "Envelope decode failed, falling back to raw body");
			},
		}
	} else {
		tracing::debug!("Received regular JSON event");
	}

	into_object(value)
}

fn is_cloudevent(content_type: Option<&str>) -> bool {
	content_type
		.map(|ct| ct.to_ascii_lowercase().contains(CLOUDEVENTS_CONTENT_TYPE))
		.unwrap_or(false)
}

/// Extracts `data` from an envelope; a string `data` is decoded a second time.
fn unwrap_envelope(value: &Value) -> Result<Value, DecodeError> {
	let event = CloudEvent::deserialize(value)
		.map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;

	tracing::info!(
		event_type = event.event_type.as_deref().unwrap_or("unknown"),
		"Received CloudEvent"
	);

	match event.data {
		None => Err(DecodeError::MalformedEnvelope("event has no data".into())),
		Some(Value::String(raw)) => serde_json::from_str(&raw)
			.map_err(|e| DecodeError::MalformedEnvelope(e.to_string())),
		Some(data) => Ok(data),
	}
}

fn into_object(value: Value) -> Result<Map<String, Value>, DecodeError> {
	match value {
		Value::Object(map) if !map.is_empty() => Ok(map),
		Value::Null | Value::Object(_) => Err(DecodeError::EmptyPayload),
		other => Err(DecodeError::MalformedBody(format!(
			"expected a JSON object, got {}",
			json_type(&other)
		))),
	}
}

fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
