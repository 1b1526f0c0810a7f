//! Pub/sub types shared by the broker client and the order processor.
//!
//! These describe the sidecar-facing contracts: which channel a message is
//! published to, which local route receives it back, and how a delivery is
//! acknowledged.

use serde::{Deserialize, Serialize};

/// A named topic on a named pub/sub component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
	/// Name of the pub/sub component as registered with the sidecar.
	pub pubsub_name: String,
	/// Topic within the component.
	pub topic: String,
}

impl Channel {
	pub fn new(pubsub_name: impl Into<String>, topic: impl Into<String>) -> Self {
		Self {
			pubsub_name: pubsub_name.into(),
			topic: topic.into(),
		}
	}
}

/// One entry of the subscription descriptor served to the sidecar.
///
/// Serializes to `{"pubsubname": ..., "topic": ..., "route": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
	#[serde(rename = "pubsubname")]
	pub pubsub_name: String,
	pub topic: String,
	/// Local path the sidecar posts deliveries to.
	pub route: String,
}

impl Subscription {
	pub fn new(channel: &Channel, route: impl Into<String>) -> Self {
		Self {
			pubsub_name: channel.pubsub_name.clone(),
			topic: channel.topic.clone(),
			route: route.into(),
		}
	}
}

/// Delivery outcome as understood by the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
	/// Processed; remove the message.
	Success,
	/// Transient failure; redeliver later.
	Retry,
	/// Unprocessable; discard without redelivery.
	Drop,
}

/// Response body returned from the delivery route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
	pub status: DeliveryStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}
