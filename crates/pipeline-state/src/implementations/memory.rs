//! In-memory state store implementation.
//!
//! Values live in a map per store name and vanish with the process. Failures
//! can be injected to exercise the retry path of callers.

use crate::{StateStoreError, StateStoreFactory, StateStoreInterface, StateStoreRegistry};
use async_trait::async_trait;
use pipeline_types::{ConfigSchema, ImplementationRegistry, Schema, StateEntry, ValidationError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A failure the memory store can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
	Unreachable,
	/// Never answer.
	Hang,
	Reject(u16),
}

#[derive(Default)]
struct Inner {
	stores: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
	failure: RwLock<Option<StoreFailure>>,
	writes: AtomicUsize,
}

/// In-memory state store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
	inner: Arc<Inner>,
}

impl MemoryStateStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of save calls received, including failed ones.
	pub fn writes(&self) -> usize {
		self.inner.writes.load(Ordering::SeqCst)
	}

	/// Number of keys held in `store_name`.
	pub async fn len(&self, store_name: &str) -> usize {
		self.inner
			.stores
			.read()
			.await
			.get(store_name)
			.map_or(0, HashMap::len)
	}

	/// Makes every subsequent call fail with `failure`; `None` restores
	/// normal operation.
	pub async fn set_failure(&self, failure: Option<StoreFailure>) {
		*self.inner.failure.write().await = failure;
	}

	async fn check_failure(&self) -> Result<(), StateStoreError> {
		let failure = *self.inner.failure.read().await;
		match failure {
			None => Ok(()),
			Some(StoreFailure::Unreachable) => Err(StateStoreError::Connection(
				"memory state store marked unreachable".into(),
			)),
			Some(StoreFailure::Hang) => std::future::pending().await,
			Some(StoreFailure::Reject(status)) => Err(StateStoreError::Rejected {
				status,
				body: "rejected by memory state store".into(),
			}),
		}
	}
}

#[async_trait]
impl StateStoreInterface for MemoryStateStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStateStoreSchema)
	}

	async fn save(&self, store_name: &str, entries: &[StateEntry]) -> Result<(), StateStoreError> {
		self.inner.writes.fetch_add(1, Ordering::SeqCst);
		self.check_failure().await?;

		let mut stores = self.inner.stores.write().await;
		let store = stores.entry(store_name.to_string()).or_default();
		for entry in entries {
			store.insert(entry.key.clone(), entry.value.clone());
		}
		Ok(())
	}

	async fn get(
		&self,
		store_name: &str,
		key: &str,
	) -> Result<Option<serde_json::Value>, StateStoreError> {
		self.check_failure().await?;

		Ok(self
			.inner
			.stores
			.read()
			.await
			.get(store_name)
			.and_then(|store| store.get(key))
			.cloned())
	}
}

/// Configuration schema for MemoryStateStore. No fields.
pub struct MemoryStateStoreSchema;

impl ConfigSchema for MemoryStateStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory state store from configuration.
pub fn create_state_store(
	config: &toml::Value,
) -> Result<Box<dyn StateStoreInterface>, StateStoreError> {
	MemoryStateStoreSchema
		.validate(config)
		.map_err(|e| StateStoreError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStateStore::new()))
}

/// Registry for the memory state store implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StateStoreFactory;

	fn factory() -> Self::Factory {
		create_state_store
	}
}

impl StateStoreRegistry for Registry {}
