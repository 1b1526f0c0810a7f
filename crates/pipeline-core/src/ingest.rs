//! Order ingestion: validation and publishing of new orders.
//!
//! Single orders are validated, stamped `pending` with a creation time and
//! published once; any broker failure goes straight back to the caller. Bulk
//! runs publish synthetic orders one by one and only count failures.

use chrono::Utc;
use pipeline_broker::{BrokerError, BrokerService};
use pipeline_config::IngestionConfig;
use pipeline_types::{
	BulkOrderRequest, BulkOrderResponse, NewOrder, Order, OrderValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to ingestion callers.
#[derive(Debug, Error)]
pub enum IngestError {
	#[error(transparent)]
	Validation(#[from] OrderValidationError),
	#[error("Invalid bulk request: {0}")]
	InvalidBulkRequest(String),
	#[error("Cannot connect to broker: {0}")]
	Unreachable(String),
	#[error("Timeout publishing to broker after {0:?}")]
	Timeout(Duration),
	#[error("Failed to publish order (status {status})")]
	Rejected { status: u16, body: String },
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<BrokerError> for IngestError {
	fn from(err: BrokerError) -> Self {
		match err {
			BrokerError::Connection(msg) => IngestError::Unreachable(msg),
			BrokerError::Timeout(after) => IngestError::Timeout(after),
			BrokerError::Rejected { status, body } => IngestError::Rejected { status, body },
			BrokerError::Serialization(msg) | BrokerError::Configuration(msg) => {
				IngestError::Internal(msg)
			},
		}
	}
}

/// Accepts new orders and hands them to the broker.
pub struct OrderIngestor {
	broker: Arc<BrokerService>,
	config: IngestionConfig,
}

impl OrderIngestor {
	pub fn new(broker: Arc<BrokerService>, config: IngestionConfig) -> Self {
		Self { broker, config }
	}

	/// Validates and publishes one order.
	///
	/// Returns the published record; the broker is not called when
	/// validation fails.
	pub async fn create(&self, payload: serde_json::Value) -> Result<Order, IngestError> {
		let order = NewOrder::from_value(payload)?.into_pending(Utc::now());

		tracing::info!(
			order_id = %order.order_id,
			topic = %self.broker.channel().topic,
			"Publishing order"
		);

		if let Err(e) = self.broker.publish(&order, self.config.publish_timeout()).await {
			tracing::warn!(
				order_id = %order.order_id,
				class = ?e.class(),
				error = %e,
				"Broker publish failed"
			);
			return Err(e.into());
		}

		Ok(order)
	}

	/// Publishes `count` synthetic orders.
	///
	/// Individual publish failures are counted, never retried, and do not
	/// stop the run.
	pub async fn create_bulk(
		&self,
		request: BulkOrderRequest,
	) -> Result<BulkOrderResponse, IngestError> {
		let count = self.bulk_count(request.count)?;
		let prefix = match request.prefix {
			None => self.config.default_bulk_prefix.clone(),
			Some(prefix) if prefix.trim().is_empty() => {
				return Err(IngestError::InvalidBulkRequest(
					"prefix must not be blank".into(),
				))
			},
			Some(prefix) => prefix,
		};

		tracing::info!(count, prefix = %prefix, "Starting bulk order run");

		let timeout = self.config.bulk_publish_timeout();
		let mut created = 0usize;
		let mut failed = 0usize;
		let mut sample = Vec::with_capacity(self.config.bulk_sample_size.min(count as usize));

		for index in 1..=count {
			let order = Order::synthetic(&prefix, index, Utc::now());
			match self.broker.publish(&order, timeout).await {
				Ok(()) => {
					created += 1;
					if sample.len() < self.config.bulk_sample_size {
						sample.push(order.order_id);
					}
				},
				Err(e) => {
					failed += 1;
					tracing::error!(order_id = %order.order_id, error = %e, "Failed to publish order");
				},
			}
		}

		tracing::info!(created, failed, "Bulk order run finished");

		Ok(BulkOrderResponse {
			message: format!("Created {} orders", created),
			created,
			failed,
			orders: sample,
		})
	}

	fn bulk_count(&self, requested: Option<i64>) -> Result<u32, IngestError> {
		let max = self.config.max_bulk_count;
		match requested {
			None => Ok(self.config.default_bulk_count),
			Some(count) if count < 0 => Err(IngestError::InvalidBulkRequest(
				"count must not be negative".into(),
			)),
			Some(count) if count > i64::from(max) => Err(IngestError::InvalidBulkRequest(
				format!("Maximum {} orders per request", max),
			)),
			// Bounded by max above, which is a u32.
			Some(count) => Ok(count as u32),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pipeline_broker::implementations::memory::{BrokerFailure, MemoryBroker};
	use pipeline_types::{Channel, OrderStatus};
	use serde_json::json;

	fn ingestor(broker: &MemoryBroker) -> OrderIngestor {
		let service = BrokerService::new(Box::new(broker.clone()), Channel::new("pubsub", "orders"));
		OrderIngestor::new(Arc::new(service), IngestionConfig::default())
	}

	fn payload() -> serde_json::Value {
		json!({
			"order_id": "order-7",
			"customer_name": "Grace",
			"items": ["a", "b"],
			"total": 99.99
		})
	}

	#[tokio::test]
	async fn test_single_order_published_once_as_pending() {
		let broker = MemoryBroker::new();
		let before = Utc::now();

		let order = ingestor(&broker).create(payload()).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert!(order.created_at >= before);

		let published = broker.published().await;
		assert_eq!(published.len(), 1);
		assert_eq!(published[0].channel.topic, "orders");
		assert_eq!(published[0].message["status"], "pending");
		assert!(published[0].message["created_at"].is_string());
		assert_eq!(published[0].message["order_id"], "order-7");
	}

	#[tokio::test]
	async fn test_missing_field_never_reaches_broker() {
		let broker = MemoryBroker::new();
		let mut body = payload();
		body.as_object_mut().unwrap().remove("total");

		let err = ingestor(&broker).create(body).await.unwrap_err();
		assert!(matches!(
			err,
			IngestError::Validation(OrderValidationError::MissingField("total"))
		));
		assert_eq!(broker.attempts(), 0);
	}

	#[tokio::test]
	async fn test_broker_failures_are_distinguished() {
		let broker = MemoryBroker::new();
		let ingestor = ingestor(&broker);

		broker.set_failure(Some(BrokerFailure::Unreachable)).await;
		assert!(matches!(
			ingestor.create(payload()).await,
			Err(IngestError::Unreachable(_))
		));

		broker.set_failure(Some(BrokerFailure::Reject(500))).await;
		assert!(matches!(
			ingestor.create(payload()).await,
			Err(IngestError::Rejected { status: 500, .. })
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_single_publish_timeout() {
		let broker = MemoryBroker::new();
		broker.set_failure(Some(BrokerFailure::Hang)).await;

		let err = ingestor(&broker).create(payload()).await.unwrap_err();
		assert!(matches!(err, IngestError::Timeout(d) if d == Duration::from_secs(5)));
	}

	#[tokio::test]
	async fn test_bulk_at_limit_succeeds() {
		let broker = MemoryBroker::new();
		let response = ingestor(&broker)
			.create_bulk(BulkOrderRequest {
				count: Some(10_000),
				prefix: Some("load".into()),
			})
			.await
			.unwrap();

		assert_eq!(response.created, 10_000);
		assert_eq!(response.failed, 0);
		assert_eq!(response.message, "Created 10000 orders");
		assert_eq!(response.orders.len(), 10);
		assert_eq!(response.orders[0], "load-0001");
		assert_eq!(response.orders[9], "load-0010");
		assert_eq!(broker.attempts(), 10_000);
	}

	#[tokio::test]
	async fn test_bulk_over_limit_rejected_without_publishing() {
		let broker = MemoryBroker::new();
		let err = ingestor(&broker)
			.create_bulk(BulkOrderRequest {
				count: Some(10_001),
				prefix: None,
			})
			.await
			.unwrap_err();

		assert!(matches!(err, IngestError::InvalidBulkRequest(_)));
		assert_eq!(broker.attempts(), 0);
	}

	#[tokio::test]
	async fn test_bulk_negative_count_rejected() {
		let broker = MemoryBroker::new();
		assert!(ingestor(&broker)
			.create_bulk(BulkOrderRequest {
				count: Some(-1),
				prefix: None,
			})
			.await
			.is_err());
	}

	#[tokio::test]
	async fn test_bulk_blank_prefix_rejected() {
		let broker = MemoryBroker::new();
		let ingestor = ingestor(&broker);

		for prefix in ["", "   "] {
			let err = ingestor
				.create_bulk(BulkOrderRequest {
					count: Some(2),
					prefix: Some(prefix.into()),
				})
				.await
				.unwrap_err();
			assert!(matches!(err, IngestError::InvalidBulkRequest(_)));
		}
		assert_eq!(broker.attempts(), 0);
	}

	#[tokio::test]
	async fn test_bulk_defaults() {
		let broker = MemoryBroker::new();
		let response = ingestor(&broker)
			.create_bulk(BulkOrderRequest::default())
			.await
			.unwrap();

		assert_eq!(response.created, 10);
		assert_eq!(response.orders[0], "bulk-0001");
		let published = broker.published().await;
		assert_eq!(published[2].message["customer_name"], "Customer 3");
		assert_eq!(published[2].message["total"], json!(11.5));
	}

	#[tokio::test]
	async fn test_bulk_counts_failures_and_continues() {
		let broker = MemoryBroker::new();
		broker
			.set_failure_rule(|message| {
				let id = message["order_id"].as_str().unwrap_or_default();
				(id == "mix-0002" || id == "mix-0004").then_some(BrokerFailure::Unreachable)
			})
			.await;

		let response = ingestor(&broker)
			.create_bulk(BulkOrderRequest {
				count: Some(5),
				prefix: Some("mix".into()),
			})
			.await
			.unwrap();

		assert_eq!(response.created, 3);
		assert_eq!(response.failed, 2);
		assert_eq!(response.orders, vec!["mix-0001", "mix-0003", "mix-0005"]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_bulk_timeouts_count_as_failures() {
		let broker = MemoryBroker::new();
		broker
			.set_failure_rule(|message| {
				(message["order_id"] == "slow-0001").then_some(BrokerFailure::Hang)
			})
			.await;

		let response = ingestor(&broker)
			.create_bulk(BulkOrderRequest {
				count: Some(2),
				prefix: Some("slow".into()),
			})
			.await
			.unwrap();

		assert_eq!(response.created, 1);
		assert_eq!(response.failed, 1);
	}
}
