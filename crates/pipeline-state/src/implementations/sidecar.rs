//! Sidecar state store implementation.
//!
//! Saves go to `POST {base_url}/v1.0/state/{store}` with a JSON array of
//! `{key, value}` entries; reads go to `GET {base_url}/v1.0/state/{store}/{key}`.

use crate::{StateStoreError, StateStoreFactory, StateStoreInterface, StateStoreRegistry};
use async_trait::async_trait;
use pipeline_types::{
	http_url, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StateEntry,
	ValidationError,
};
use reqwest::{StatusCode, Url};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:3500";

/// State store client talking to a sidecar over HTTP.
pub struct SidecarStateStore {
	client: reqwest::Client,
	base_url: String,
	request_timeout: Option<Duration>,
}

impl SidecarStateStore {
	pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
		Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			request_timeout: None,
		}
	}

	fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Builds `{base_url}/v1.0/state/{segments...}`, percent-encoding each
	/// segment so keys containing `/`, `?` or `#` address exactly one record.
	fn state_url(&self, segments: &[&str]) -> Result<Url, StateStoreError> {
		let mut url = Url::parse(&self.base_url).map_err(|e| {
			StateStoreError::Configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
		})?;
		url.path_segments_mut()
			.map_err(|_| {
				StateStoreError::Configuration(format!("Base URL cannot have a path: {}", self.base_url))
			})?
			.pop_if_empty()
			.extend(["v1.0", "state"])
			.extend(segments);
		Ok(url)
	}

	fn transport_error(&self, err: reqwest::Error) -> StateStoreError {
		match self.request_timeout {
			Some(timeout) if err.is_timeout() => StateStoreError::Timeout(timeout),
			_ => StateStoreError::Connection(err.to_string()),
		}
	}

	async fn rejection(response: reqwest::Response) -> StateStoreError {
		let status = response.status().as_u16();
		let body = response.text().await.unwrap_or_default();
		tracing::debug!(status, body = %body, "Sidecar rejected state request");
		StateStoreError::Rejected { status, body }
	}
}

#[async_trait]
impl StateStoreInterface for SidecarStateStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SidecarStateStoreSchema)
	}

	async fn save(&self, store_name: &str, entries: &[StateEntry]) -> Result<(), StateStoreError> {
		let url = self.state_url(&[store_name])?;
		tracing::debug!(url = %url, entries = entries.len(), "Saving state via sidecar");

		let response = self
			.client
			.post(url)
			.json(entries)
			.send()
			.await
			.map_err(|e| self.transport_error(e))?;

		match response.status() {
			StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
			_ => Err(Self::rejection(response).await),
		}
	}

	async fn get(
		&self,
		store_name: &str,
		key: &str,
	) -> Result<Option<serde_json::Value>, StateStoreError> {
		let url = self.state_url(&[store_name, key])?;

		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| self.transport_error(e))?;

		match response.status() {
			StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
			StatusCode::OK => {
				let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
				if bytes.is_empty() {
					return Ok(None);
				}
				serde_json::from_slice(&bytes)
					.map(Some)
					.map_err(|e| StateStoreError::Serialization(e.to_string()))
			},
			_ => Err(Self::rejection(response).await),
		}
	}
}

/// Configuration schema for SidecarStateStore.
///
/// Optional fields:
/// - `base_url` - sidecar HTTP address (default `http://localhost:3500`)
/// - `timeout_ms` - client-level request cap
pub struct SidecarStateStoreSchema;

impl ConfigSchema for SidecarStateStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String).with_validator(http_url),
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(300_000),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Factory function to create a sidecar state store from configuration.
pub fn create_state_store(
	config: &toml::Value,
) -> Result<Box<dyn StateStoreInterface>, StateStoreError> {
	SidecarStateStoreSchema
		.validate(config)
		.map_err(|e| StateStoreError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);

	let request_timeout = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| Duration::from_millis(ms as u64));

	let mut builder = reqwest::Client::builder().pool_max_idle_per_host(10);
	if let Some(timeout) = request_timeout {
		builder = builder.timeout(timeout);
	}
	let client = builder.build().map_err(|e| {
		StateStoreError::Configuration(format!("Failed to build HTTP client: {}", e))
	})?;

	Ok(Box::new(
		SidecarStateStore::new(client, base_url).with_request_timeout(request_timeout),
	))
}

/// Registry for the sidecar state store implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "sidecar";
	type Factory = StateStoreFactory;

	fn factory() -> Self::Factory {
		create_state_store
	}
}

impl StateStoreRegistry for Registry {}
