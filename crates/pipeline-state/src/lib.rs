//! State store module for the order pipeline.
//!
//! Key/value persistence for processed orders. Writes are upserts keyed by
//! order id, so replaying a write after a redelivery overwrites the previous
//! record instead of creating a second one.

use async_trait::async_trait;
use pipeline_types::{ConfigSchema, ErrorClass, ImplementationRegistry, StateEntry};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod sidecar;
}

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
	/// The state store façade could not be reached.
	#[error("Connection error: {0}")]
	Connection(String),
	/// The call did not complete within its deadline.
	#[error("State store call timed out after {0:?}")]
	Timeout(Duration),
	/// The store answered with a non-success status.
	#[error("State store rejected request with status {status}: {body}")]
	Rejected { status: u16, body: String },
	/// A value could not be encoded or decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The implementation configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl StateStoreError {
	/// Classifies the error for upstream reporting.
	pub fn class(&self) -> ErrorClass {
		match self {
			StateStoreError::Connection(_) | StateStoreError::Timeout(_) => ErrorClass::Transport,
			StateStoreError::Rejected { .. } => ErrorClass::UpstreamRejection,
			StateStoreError::Serialization(_) | StateStoreError::Configuration(_) => {
				ErrorClass::Validation
			},
		}
	}
}

/// Trait defining the interface for state store backends.
#[async_trait]
pub trait StateStoreInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Upserts all `entries` into the store named `store_name`.
	async fn save(&self, store_name: &str, entries: &[StateEntry]) -> Result<(), StateStoreError>;

	/// Reads the value stored under `key`, if any.
	async fn get(
		&self,
		store_name: &str,
		key: &str,
	) -> Result<Option<serde_json::Value>, StateStoreError>;
}

/// Type alias for state store factory functions.
pub type StateStoreFactory =
	fn(&toml::Value) -> Result<Box<dyn StateStoreInterface>, StateStoreError>;

/// Registry trait for state store implementations.
pub trait StateStoreRegistry: ImplementationRegistry<Factory = StateStoreFactory> {}

/// Get all registered state store implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StateStoreFactory)> {
	use implementations::{memory, sidecar};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(sidecar::Registry::NAME, sidecar::Registry::factory()),
	]
}

/// High-level state store client bound to one store.
///
/// Every call is bounded by the configured timeout.
pub struct StateStoreService {
	backend: Box<dyn StateStoreInterface>,
	store_name: String,
	timeout: Duration,
}

impl StateStoreService {
	pub fn new(
		backend: Box<dyn StateStoreInterface>,
		store_name: impl Into<String>,
		timeout: Duration,
	) -> Self {
		Self {
			backend,
			store_name: store_name.into(),
			timeout,
		}
	}

	pub fn store_name(&self) -> &str {
		&self.store_name
	}

	/// Upserts a batch of entries.
	pub async fn put(&self, entries: Vec<StateEntry>) -> Result<(), StateStoreError> {
		match tokio::time::timeout(self.timeout, self.backend.save(&self.store_name, &entries)).await {
			Ok(result) => result,
			Err(_) => Err(StateStoreError::Timeout(self.timeout)),
		}
	}

	/// Reads the value stored under `key`.
	pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StateStoreError> {
		match tokio::time::timeout(self.timeout, self.backend.get(&self.store_name, key)).await {
			Ok(result) => result,
			Err(_) => Err(StateStoreError::Timeout(self.timeout)),
		}
	}
}
