//! In-memory broker implementation.
//!
//! Keeps the most recent acknowledged messages instead of forwarding them
//! anywhere; older ones are evicted once `capacity` is reached. Nothing is
//! delivered to the worker routes. Useful for exercising ingestion without a
//! sidecar and as a test double: failures can be injected globally or per
//! message.

use crate::{BrokerError, BrokerFactory, BrokerInterface, BrokerRegistry};
use async_trait::async_trait;
use pipeline_types::{
	Channel, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A failure the memory broker can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerFailure {
	/// Behave as if nothing is listening.
	Unreachable,
	/// Never answer; the caller's timeout decides the outcome.
	Hang,
	/// Answer with the given HTTP status.
	Reject(u16),
}

type FailureRule = Box<dyn Fn(&serde_json::Value) -> Option<BrokerFailure> + Send + Sync>;

/// A message the broker acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
	pub channel: Channel,
	pub message: serde_json::Value,
}

/// Messages kept when no `capacity` is configured.
pub const DEFAULT_CAPACITY: usize = 1_000;

struct Inner {
	published: RwLock<VecDeque<PublishedMessage>>,
	capacity: usize,
	failure: RwLock<Option<BrokerFailure>>,
	rule: RwLock<Option<FailureRule>>,
	attempts: AtomicUsize,
}

/// In-memory broker. Clones share the same log.
#[derive(Clone)]
pub struct MemoryBroker {
	inner: Arc<Inner>,
}

impl Default for MemoryBroker {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryBroker {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}

	/// Keeps at most `capacity` acknowledged messages (at least one).
	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			inner: Arc::new(Inner {
				published: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
				capacity,
				failure: RwLock::new(None),
				rule: RwLock::new(None),
				attempts: AtomicUsize::new(0),
			}),
		}
	}

	/// The most recent acknowledged messages, oldest first.
	pub async fn published(&self) -> Vec<PublishedMessage> {
		self.inner.published.read().await.iter().cloned().collect()
	}

	/// Number of publish calls received, including failed ones.
	pub fn attempts(&self) -> usize {
		self.inner.attempts.load(Ordering::SeqCst)
	}

	/// Makes every subsequent publish fail with `failure`; `None` restores
	/// normal operation.
	pub async fn set_failure(&self, failure: Option<BrokerFailure>) {
		*self.inner.failure.write().await = failure;
	}

	/// Installs a per-message failure rule, consulted after the global one.
	pub async fn set_failure_rule<F>(&self, rule: F)
	where
		F: Fn(&serde_json::Value) -> Option<BrokerFailure> + Send + Sync + 'static,
	{
		*self.inner.rule.write().await = Some(Box::new(rule));
	}

	async fn failure_for(&self, message: &serde_json::Value) -> Option<BrokerFailure> {
		if let Some(failure) = *self.inner.failure.read().await {
			return Some(failure);
		}
		self.inner
			.rule
			.read()
			.await
			.as_ref()
			.and_then(|rule| rule(message))
	}
}

#[async_trait]
impl BrokerInterface for MemoryBroker {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryBrokerSchema)
	}

	async fn publish(&self, channel: &Channel, message: &serde_json::Value) -> Result<(), BrokerError> {
		self.inner.attempts.fetch_add(1, Ordering::SeqCst);

		match self.failure_for(message).await {
			Some(BrokerFailure::Unreachable) => Err(BrokerError::Connection(
				"memory broker marked unreachable".into(),
			)),
			Some(BrokerFailure::Hang) => std::future::pending().await,
			Some(BrokerFailure::Reject(status)) => Err(BrokerError::Rejected {
				status,
				body: "rejected by memory broker".into(),
			}),
			None => {
				let mut published = self.inner.published.write().await;
				if published.len() == self.inner.capacity {
					published.pop_front();
				}
				published.push_back(PublishedMessage {
					channel: channel.clone(),
					message: message.clone(),
				});
				Ok(())
			},
		}
	}
}

/// Configuration schema for MemoryBroker.
///
/// Optional fields:
/// - `capacity` - acknowledged messages kept (default 1000)
pub struct MemoryBrokerSchema;

impl ConfigSchema for MemoryBrokerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new(
				"capacity",
				FieldType::Integer {
					min: Some(1),
					max: Some(100_000),
				},
			)],
		)
		.validate(config)
	}
}

/// Factory function to create a memory broker from configuration.
pub fn create_broker(config: &toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError> {
	MemoryBrokerSchema
		.validate(config)
		.map_err(|e| BrokerError::Configuration(e.to_string()))?;

	let capacity = config
		.get("capacity")
		.and_then(|v| v.as_integer())
		.map_or(DEFAULT_CAPACITY, |n| n as usize);

	Ok(Box::new(MemoryBroker::with_capacity(capacity)))
}

/// Registry for the memory broker implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = BrokerFactory;

	fn factory() -> Self::Factory {
		create_broker
	}
}

impl BrokerRegistry for Registry {}
