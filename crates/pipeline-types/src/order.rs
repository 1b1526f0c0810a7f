//! Order types for the pipeline.
//!
//! An order is created by the ingestion endpoint with status `pending`,
//! travels through the broker, and is rewritten with status `processed` by
//! the order processor. Fields are only ever added across that lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Fields a client must supply when creating an order, in the order they are
/// checked.
pub const REQUIRED_FIELDS: [&str; 4] = ["order_id", "customer_name", "items", "total"];

/// Fields owned by the pipeline. Client-supplied values for these are
/// discarded at ingestion.
const SYSTEM_FIELDS: [&str; 4] = ["status", "created_at", "processed_at", "processed_by"];

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Published by ingestion, not yet handled by a processor.
	Pending,
	/// Handled and persisted by a processor.
	Processed,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Processed => "processed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors raised while validating a client-supplied order.
#[derive(Debug, Error, PartialEq)]
pub enum OrderValidationError {
	#[error("No data provided")]
	Empty,
	#[error("Order payload must be a JSON object")]
	NotAnObject,
	#[error("Missing required field: {0}")]
	MissingField(&'static str),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidField { field: String, message: String },
}

/// An order record as published to the broker.
///
/// Unknown fields supplied by the client are carried in `extra` and written
/// back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Caller-supplied identifier, also the state store key.
	pub order_id: String,
	pub customer_name: String,
	pub items: Vec<String>,
	#[serde(with = "rust_decimal::serde::float")]
	pub total: Decimal,
	pub status: OrderStatus,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub processed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub processed_by: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// A validated order creation request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOrder {
	pub order_id: String,
	pub customer_name: String,
	pub items: Vec<String>,
	#[serde(with = "rust_decimal::serde::float")]
	pub total: Decimal,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl NewOrder {
	/// Validates a raw JSON payload into a creation request.
	///
	/// Required fields are checked for presence first so the error names the
	/// first missing one; types and value ranges are checked afterwards.
	pub fn from_value(value: Value) -> Result<Self, OrderValidationError> {
		let object = match value {
			Value::Null => return Err(OrderValidationError::Empty),
			Value::Object(map) if map.is_empty() => return Err(OrderValidationError::Empty),
			Value::Object(map) => map,
			_ => return Err(OrderValidationError::NotAnObject),
		};

		for field in REQUIRED_FIELDS {
			if !object.contains_key(field) {
				return Err(OrderValidationError::MissingField(field));
			}
		}

		let order: NewOrder = serde_json::from_value(Value::Object(object)).map_err(|e| {
			OrderValidationError::InvalidField {
				field: "order".to_string(),
				message: e.to_string(),
			}
		})?;

		if order.order_id.trim().is_empty() {
			return Err(OrderValidationError::InvalidField {
				field: "order_id".to_string(),
				message: "must not be empty".to_string(),
			});
		}
		if order.items.is_empty() {
			return Err(OrderValidationError::InvalidField {
				field: "items".to_string(),
				message: "must contain at least one item".to_string(),
			});
		}
		if order.total.is_sign_negative() && !order.total.is_zero() {
			return Err(OrderValidationError::InvalidField {
				field: "total".to_string(),
				message: "must not be negative".to_string(),
			});
		}

		Ok(order)
	}

	/// Stamps the request as a pending order created at `created_at`.
	pub fn into_pending(mut self, created_at: DateTime<Utc>) -> Order {
		for field in SYSTEM_FIELDS {
			self.extra.remove(field);
		}

		Order {
			order_id: self.order_id,
			customer_name: self.customer_name,
			items: self.items,
			total: self.total,
			status: OrderStatus::Pending,
			created_at,
			processed_at: None,
			processed_by: None,
			extra: self.extra,
		}
	}
}

impl Order {
	/// Builds the `index`-th synthetic order of a bulk load run.
	///
	/// Ids are `{prefix}-{index:04}`, so re-running the same prefix reuses ids.
	pub fn synthetic(prefix: &str, index: u32, created_at: DateTime<Utc>) -> Self {
		let total = (Decimal::new(1000, 2) + Decimal::new(50, 2) * Decimal::from(index)).round_dp(2);

		Self {
			order_id: format!("{}-{:04}", prefix, index),
			customer_name: format!("Customer {}", index),
			items: vec![format!("item-{}", index)],
			total,
			status: OrderStatus::Pending,
			created_at,
			processed_at: None,
			processed_by: None,
			extra: Map::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn valid_payload() -> Value {
		json!({
			"order_id": "order-1",
			"customer_name": "Ada",
			"items": ["widget"],
			"total": 12.5
		})
	}

	#[test]
	fn test_missing_fields_reported_in_order() {
		for field in REQUIRED_FIELDS {
			let mut payload = valid_payload();
			payload.as_object_mut().unwrap().remove(field);
			assert_eq!(
				NewOrder::from_value(payload),
				Err(OrderValidationError::MissingField(field))
			);
		}
	}

	#[test]
	fn test_empty_payload_rejected() {
		assert_eq!(NewOrder::from_value(Value::Null), Err(OrderValidationError::Empty));
		assert_eq!(NewOrder::from_value(json!({})), Err(OrderValidationError::Empty));
		assert_eq!(
			NewOrder::from_value(json!([1, 2])),
			Err(OrderValidationError::NotAnObject)
		);
	}

	#[test]
	fn test_range_checks() {
		let mut payload = valid_payload();
		payload["items"] = json!([]);
		assert!(matches!(
			NewOrder::from_value(payload),
			Err(OrderValidationError::InvalidField { ref field, .. }) if field == "items"
		));

		let mut payload = valid_payload();
		payload["total"] = json!(-1.0);
		assert!(matches!(
			NewOrder::from_value(payload),
			Err(OrderValidationError::InvalidField { ref field, .. }) if field == "total"
		));

		let mut payload = valid_payload();
		payload["total"] = json!("lots");
		assert!(matches!(
			NewOrder::from_value(payload),
			Err(OrderValidationError::InvalidField { .. })
		));
	}

	#[test]
	fn test_pending_order_keeps_extra_fields_and_drops_system_fields() {
		let mut payload = valid_payload();
		payload["note"] = json!("leave at door");
		payload["status"] = json!("processed");

		let created_at = Utc::now();
		let order = NewOrder::from_value(payload).unwrap().into_pending(created_at);
		let encoded = serde_json::to_value(&order).unwrap();

		assert_eq!(encoded["status"], "pending");
		assert_eq!(encoded["note"], "leave at door");
		assert_eq!(encoded["total"], json!(12.5));
		assert!(encoded.get("processed_at").is_none());
		assert_eq!(order.created_at, created_at);
	}

	#[test]
	fn test_synthetic_orders() {
		let now = Utc::now();
		let first = Order::synthetic("load", 1, now);
		assert_eq!(first.order_id, "load-0001");
		assert_eq!(first.customer_name, "Customer 1");
		assert_eq!(first.items, vec!["item-1".to_string()]);
		assert_eq!(first.total, Decimal::new(1050, 2));

		let big = Order::synthetic("load", 12345, now);
		assert_eq!(big.order_id, "load-12345");
	}
}
