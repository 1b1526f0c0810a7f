//! Configuration module for the order pipeline.
//!
//! The whole service is driven by a single immutable [`Config`] loaded from a
//! TOML file at startup and handed to every component. `${VAR}` and
//! `${VAR:-default}` references are resolved from the environment before
//! parsing, which is how the sidecar port is usually injected.
//!
//! ## Modular Configuration Support
//!
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files

mod loader;

use pipeline_types::Channel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default Display dumps the whole input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and role of this process.
	#[serde(default)]
	pub service: ServiceConfig,
	/// Pub/sub channel and broker client implementations.
	pub broker: BrokerConfig,
	/// State store name and client implementations.
	pub state: StateConfig,
	/// Order processor settings.
	#[serde(default)]
	pub processor: ProcessorConfig,
	/// Order ingestion settings.
	#[serde(default)]
	pub ingestion: IngestionConfig,
	/// HTTP server settings.
	#[serde(default)]
	pub api: ApiConfig,
}

/// Which group of routes this process serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
	/// Ingestion and worker routes.
	#[default]
	All,
	/// Order creation endpoints only.
	Ingestion,
	/// Subscription descriptor and delivery route only.
	Worker,
}

impl ServiceRole {
	pub fn serves_ingestion(&self) -> bool {
		matches!(self, ServiceRole::All | ServiceRole::Ingestion)
	}

	pub fn serves_worker(&self) -> bool {
		matches!(self, ServiceRole::All | ServiceRole::Worker)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ServiceRole::All => "all",
			ServiceRole::Ingestion => "ingestion",
			ServiceRole::Worker => "worker",
		}
	}
}

/// Configuration specific to this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identity written to `processed_by` on every processed order.
	#[serde(default = "default_service_id")]
	pub id: String,
	#[serde(default)]
	pub role: ServiceRole,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			id: default_service_id(),
			role: ServiceRole::default(),
		}
	}
}

fn default_service_id() -> String {
	"worker-service".to_string()
}

/// Configuration for the broker client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
	/// Pub/sub component name registered with the sidecar.
	#[serde(default = "default_pubsub_name")]
	pub pubsub_name: String,
	/// Topic orders are published to and consumed from.
	#[serde(default = "default_topic")]
	pub topic: String,
	/// Which implementation to use.
	pub primary: String,
	/// Map of broker implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

impl BrokerConfig {
	pub fn channel(&self) -> Channel {
		Channel::new(&self.pubsub_name, &self.topic)
	}
}

fn default_pubsub_name() -> String {
	"pubsub".to_string()
}

fn default_topic() -> String {
	"orders".to_string()
}

/// Configuration for the state store client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
	/// State store component name registered with the sidecar.
	#[serde(default = "default_store_name")]
	pub store_name: String,
	/// Which implementation to use.
	pub primary: String,
	/// Upper bound for any single state store call.
	#[serde(default = "default_state_timeout_ms")]
	pub timeout_ms: u64,
	/// Map of state store implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

impl StateConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

fn default_store_name() -> String {
	"statestore".to_string()
}

fn default_state_timeout_ms() -> u64 {
	5_000
}

/// Configuration for the order processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
	/// Local route the sidecar delivers events to.
	#[serde(default = "default_route")]
	pub route: String,
	/// Simulated business-logic latency per delivery. `0` disables it.
	#[serde(default = "default_processing_delay_ms")]
	pub processing_delay_ms: u64,
}

impl ProcessorConfig {
	pub fn processing_delay(&self) -> Duration {
		Duration::from_millis(self.processing_delay_ms)
	}
}

impl Default for ProcessorConfig {
	fn default() -> Self {
		Self {
			route: default_route(),
			processing_delay_ms: default_processing_delay_ms(),
		}
	}
}

fn default_route() -> String {
	"/orders".to_string()
}

fn default_processing_delay_ms() -> u64 {
	1_000
}

/// Configuration for order ingestion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
	/// Timeout for a single-order publish.
	#[serde(default = "default_publish_timeout_ms")]
	pub publish_timeout_ms: u64,
	/// Timeout for each publish within a bulk run.
	#[serde(default = "default_bulk_publish_timeout_ms")]
	pub bulk_publish_timeout_ms: u64,
	/// Largest accepted bulk `count`.
	#[serde(default = "default_max_bulk_count")]
	pub max_bulk_count: u32,
	/// Number of created ids echoed back from a bulk run.
	#[serde(default = "default_bulk_sample_size")]
	pub bulk_sample_size: usize,
	/// `count` used when a bulk request omits it.
	#[serde(default = "default_bulk_count")]
	pub default_bulk_count: u32,
	/// `prefix` used when a bulk request omits it.
	#[serde(default = "default_bulk_prefix")]
	pub default_bulk_prefix: String,
}

impl IngestionConfig {
	pub fn publish_timeout(&self) -> Duration {
		Duration::from_millis(self.publish_timeout_ms)
	}

	pub fn bulk_publish_timeout(&self) -> Duration {
		Duration::from_millis(self.bulk_publish_timeout_ms)
	}
}

impl Default for IngestionConfig {
	fn default() -> Self {
		Self {
			publish_timeout_ms: default_publish_timeout_ms(),
			bulk_publish_timeout_ms: default_bulk_publish_timeout_ms(),
			max_bulk_count: default_max_bulk_count(),
			bulk_sample_size: default_bulk_sample_size(),
			default_bulk_count: default_bulk_count(),
			default_bulk_prefix: default_bulk_prefix(),
		}
	}
}

fn default_publish_timeout_ms() -> u64 {
	5_000
}

fn default_bulk_publish_timeout_ms() -> u64 {
	2_000
}

fn default_max_bulk_count() -> u32 {
	10_000
}

fn default_bulk_sample_size() -> usize {
	10
}

fn default_bulk_count() -> u32 {
	10
}

fn default_bulk_prefix() -> String {
	"bulk".to_string()
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_api_host(),
			port: default_api_port(),
			max_request_size: default_max_request_size(),
			cors: None,
		}
	}
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
	8081
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Routes the server always mounts. Ingestion routes live under `/api`.
const RESERVED_ROUTES: &[&str] = &["/", "/health", "/ready", "/dapr/subscribe"];

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};

		let value = match std::env::var(name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..whole.start()]);
		result.push_str(&value);
		last_end = whole.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Parses and validates TOML whose `${...}` references were already
	/// resolved. Values are taken literally.
	pub(crate) fn from_resolved(resolved: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks cross-field constraints that serde defaults cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.broker.pubsub_name.is_empty() || self.broker.topic.is_empty() {
			return Err(ConfigError::Validation(
				"Broker pubsub_name and topic cannot be empty".into(),
			));
		}
		if !self.broker.implementations.contains_key(&self.broker.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary broker '{}' not found in implementations",
				self.broker.primary
			)));
		}

		if self.state.store_name.is_empty() {
			return Err(ConfigError::Validation(
				"State store_name cannot be empty".into(),
			));
		}
		if !self.state.implementations.contains_key(&self.state.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary state store '{}' not found in implementations",
				self.state.primary
			)));
		}
		if self.state.timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"State timeout_ms must be greater than 0".into(),
			));
		}

		let route = self.processor.route.as_str();
		if !route.starts_with('/') {
			return Err(ConfigError::Validation(format!(
				"Processor route '{}' must start with '/'",
				route
			)));
		}
		if route.contains(['{', '}', '*']) {
			return Err(ConfigError::Validation(format!(
				"Processor route '{}' must be a literal path",
				route
			)));
		}
		if RESERVED_ROUTES.contains(&route) || route == "/api" || route.starts_with("/api/") {
			return Err(ConfigError::Validation(format!(
				"Processor route '{}' collides with a built-in route",
				route
			)));
		}

		let ingestion = &self.ingestion;
		if ingestion.publish_timeout_ms == 0 || ingestion.bulk_publish_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"Ingestion publish timeouts must be greater than 0".into(),
			));
		}
		if ingestion.max_bulk_count == 0 || ingestion.max_bulk_count > 100_000 {
			return Err(ConfigError::Validation(
				"Ingestion max_bulk_count must be between 1 and 100000".into(),
			));
		}
		if ingestion.default_bulk_count > ingestion.max_bulk_count {
			return Err(ConfigError::Validation(
				"Ingestion default_bulk_count cannot exceed max_bulk_count".into(),
			));
		}

		Ok(())
	}
}

/// Parses TOML after resolving environment variables, then validates.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		Config::from_resolved(&resolved)
	}
}
