//! Sidecar broker implementation.
//!
//! Publishes through the local sidecar's HTTP publish endpoint:
//! `POST {base_url}/v1.0/publish/{pubsub_name}/{topic}` with the message as
//! the JSON body. The sidecar answers 204 (or 200) once the broker has taken
//! the message; anything else is a rejection.

use crate::{BrokerError, BrokerFactory, BrokerInterface, BrokerRegistry};
use async_trait::async_trait;
use pipeline_types::{
	http_url, Channel, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};
use reqwest::{StatusCode, Url};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:3500";

/// Broker client talking to a sidecar over HTTP.
pub struct SidecarBroker {
	client: reqwest::Client,
	base_url: String,
	/// Client-level request cap, if one was configured.
	request_timeout: Option<Duration>,
}

impl SidecarBroker {
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

	/// Channel names become single, percent-encoded path segments.
	fn publish_url(&self, channel: &Channel) -> Result<Url, BrokerError> {
		let mut url = Url::parse(&self.base_url).map_err(|e| {
			BrokerError::Configuration(format!("Invalid base URL '{}': {}", self.base_url, e))
		})?;
		url.path_segments_mut()
			.map_err(|_| {
				BrokerError::Configuration(format!("Base URL cannot have a path: {}", self.base_url))
			})?
			.pop_if_empty()
			.extend(["v1.0", "publish", channel.pubsub_name.as_str(), channel.topic.as_str()]);
		Ok(url)
	}

	/// Maps a transport-level reqwest failure onto the broker taxonomy.
	fn transport_error(&self, err: reqwest::Error) -> BrokerError {
		match self.request_timeout {
			Some(timeout) if err.is_timeout() => BrokerError::Timeout(timeout),
			_ => BrokerError::Connection(err.to_string()),
		}
	}
}

#[async_trait]
impl BrokerInterface for SidecarBroker {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SidecarBrokerSchema)
	}

	async fn publish(&self, channel: &Channel, message: &serde_json::Value) -> Result<(), BrokerError> {
		let url = self.publish_url(channel)?;
		tracing::debug!(url = %url, "Publishing to sidecar");

		let response = self
			.client
			.post(url)
			.json(message)
			.send()
			.await
			.map_err(|e| self.transport_error(e))?;

		let status = response.status();
		if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
			return Ok(());
		}

		let body = response.text().await.unwrap_or_default();
		tracing::debug!(status = status.as_u16(), body = %body, "Sidecar rejected publish");
		Err(BrokerError::Rejected {
			status: status.as_u16(),
			body,
		})
	}
}

/// Configuration schema for SidecarBroker.
///
/// Optional fields:
/// - `base_url` - sidecar HTTP address (default `http://localhost:3500`)
/// - `timeout_ms` - client-level request cap
pub struct SidecarBrokerSchema;

impl ConfigSchema for SidecarBrokerSchema {
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

/// Factory function to create a sidecar broker from configuration.
///
/// ```toml
/// base_url = "http://localhost:${DAPR_HTTP_PORT:-3500}"
/// timeout_ms = 10000
/// ```
pub fn create_broker(config: &toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError> {
	SidecarBrokerSchema
		.validate(config)
		.map_err(|e| BrokerError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);

	let request_timeout = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|ms| Duration::from_millis(ms as u64));

	let mut builder = reqwest::Client::builder()
		.pool_idle_timeout(Duration::from_secs(90))
		.pool_max_idle_per_host(10);
	if let Some(timeout) = request_timeout {
		builder = builder.timeout(timeout);
	}
	let client = builder
		.build()
		.map_err(|e| BrokerError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

	Ok(Box::new(
		SidecarBroker::new(client, base_url).with_request_timeout(request_timeout),
	))
}

/// Registry for the sidecar broker implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "sidecar";
	type Factory = BrokerFactory;

	fn factory() -> Self::Factory {
		create_broker
	}
}

impl BrokerRegistry for Registry {}
