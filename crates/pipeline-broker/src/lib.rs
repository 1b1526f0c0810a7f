//! Broker client module for the order pipeline.
//!
//! This module abstracts publishing to an at-least-once pub/sub channel. The
//! pipeline only ever talks to the broker through a local façade (the sidecar),
//! so implementations differ in how they reach that façade, not in delivery
//! semantics.

use async_trait::async_trait;
use pipeline_types::{Channel, ConfigSchema, ErrorClass, ImplementationRegistry};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod sidecar;
}

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum BrokerError {
	/// The broker façade could not be reached.
	#[error("Connection error: {0}")]
	Connection(String),
	/// The publish did not complete within its deadline.
	#[error("Publish timed out after {0:?}")]
	Timeout(Duration),
	/// The broker answered with a non-success status.
	#[error("Publish rejected with status {status}: {body}")]
	Rejected { status: u16, body: String },
	/// The message could not be encoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The implementation configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl BrokerError {
	/// Classifies the error for upstream reporting.
	pub fn class(&self) -> ErrorClass {
		match self {
			BrokerError::Connection(_) | BrokerError::Timeout(_) => ErrorClass::Transport,
			BrokerError::Rejected { .. } => ErrorClass::UpstreamRejection,
			BrokerError::Serialization(_) | BrokerError::Configuration(_) => ErrorClass::Validation,
		}
	}
}

/// Trait defining the interface for broker backends.
#[async_trait]
pub trait BrokerInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Publishes one JSON message to `channel`.
	///
	/// Returns `Ok(())` only once the broker has acknowledged the message.
	async fn publish(&self, channel: &Channel, message: &serde_json::Value) -> Result<(), BrokerError>;
}

/// Type alias for broker factory functions.
pub type BrokerFactory = fn(&toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError>;

/// Registry trait for broker implementations.
pub trait BrokerRegistry: ImplementationRegistry<Factory = BrokerFactory> {}

/// Get all registered broker implementations.
pub fn get_all_implementations() -> Vec<(&'static str, BrokerFactory)> {
	use implementations::{memory, sidecar};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(sidecar::Registry::NAME, sidecar::Registry::factory()),
	]
}

/// High-level publisher bound to a single channel.
///
/// Wraps a backend, encodes typed messages to JSON and bounds every publish
/// with a caller-supplied timeout. No retries are attempted here; callers
/// decide what a failure means.
pub struct BrokerService {
	backend: Box<dyn BrokerInterface>,
	channel: Channel,
}

impl BrokerService {
	pub fn new(backend: Box<dyn BrokerInterface>, channel: Channel) -> Self {
		Self { backend, channel }
	}

	/// The channel every message is published to.
	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	/// Publishes `message`, failing with [`BrokerError::Timeout`] if the
	/// broker has not acknowledged it within `timeout`.
	pub async fn publish<T: Serialize>(
		&self,
		message: &T,
		timeout: Duration,
	) -> Result<(), BrokerError> {
		let value =
			serde_json::to_value(message).map_err(|e| BrokerError::Serialization(e.to_string()))?;

		match tokio::time::timeout(timeout, self.backend.publish(&self.channel, &value)).await {
			Ok(result) => result,
			Err(_) => Err(BrokerError::Timeout(timeout)),
		}
	}
}
