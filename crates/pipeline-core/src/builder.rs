//! Builder for assembling a [`Pipeline`] from configuration.
//!
//! Each configured implementation table is handed to the factory registered
//! under the same name; the one named `primary` becomes the backend.

use crate::Pipeline;
use pipeline_broker::{BrokerError, BrokerInterface};
use pipeline_config::Config;
use pipeline_state::{StateStoreError, StateStoreInterface};
use pipeline_types::ConfigSchema;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

/// Errors that can occur while building the pipeline.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions keyed by implementation name.
pub struct PipelineFactories<BF, SF> {
	pub broker_factories: HashMap<String, BF>,
	pub state_factories: HashMap<String, SF>,
}

/// Builder for a pipeline with pluggable collaborators.
pub struct PipelineBuilder {
	config: Config,
}

impl PipelineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<BF, SF>(self, factories: PipelineFactories<BF, SF>) -> Result<Pipeline, BuilderError>
	where
		BF: Fn(&toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError>,
		SF: Fn(&toml::Value) -> Result<Box<dyn StateStoreInterface>, StateStoreError>,
	{
		let broker = load_primary(
			"broker",
			&self.config.broker.primary,
			&self.config.broker.implementations,
			&factories.broker_factories,
		)?;

		let state = load_primary(
			"state",
			&self.config.state.primary,
			&self.config.state.implementations,
			&factories.state_factories,
		)?;

		Ok(Pipeline::new(self.config, broker, state))
	}
}

/// A loaded backend that can describe its own implementation table.
trait SchemaBacked {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

impl SchemaBacked for dyn BrokerInterface {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		BrokerInterface::config_schema(self)
	}
}

impl SchemaBacked for dyn StateStoreInterface {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		StateStoreInterface::config_schema(self)
	}
}

/// Instantiates every configured implementation that has a factory, checks
/// its table against the implementation's schema and returns the primary one.
fn load_primary<T: ?Sized + SchemaBacked, E: Display, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};

		match factory(config) {
			Ok(implementation) => {
				if let Err(e) = implementation.config_schema().validate(config) {
					tracing::error!(
						component,
						implementation = %name,
						error = %e,
						"Invalid configuration for implementation"
					);
					return Err(BuilderError::Config(format!(
						"Invalid {} implementation '{}' configuration: {}",
						component, name, e
					)));
				}
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pipeline_broker::implementations::memory::MemoryBroker;
	use std::str::FromStr;

	fn factories() -> PipelineFactories<pipeline_broker::BrokerFactory, pipeline_state::StateStoreFactory>
	{
		PipelineFactories {
			broker_factories: pipeline_broker::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			state_factories: pipeline_state::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[test]
	fn test_build_with_memory_backends() {
		let config = Config::from_str(
			r#"
[service]
id = "worker-7"

[broker]
primary = "memory"
[broker.implementations.memory]

[state]
primary = "memory"
[state.implementations.memory]
[state.implementations.sidecar]
base_url = "http://127.0.0.1:3500"
"#,
		)
		.unwrap();

		let pipeline = PipelineBuilder::new(config).build(factories()).unwrap();
		assert_eq!(pipeline.config().service.id, "worker-7");
		assert_eq!(pipeline.state().store_name(), "statestore");
	}

	#[test]
	fn test_invalid_implementation_config_fails_build() {
		let config = Config::from_str(
			r#"
[broker]
primary = "sidecar"
[broker.implementations.sidecar]
base_url = "not-a-url"

[state]
primary = "memory"
[state.implementations.memory]
"#,
		)
		.unwrap();

		let err = PipelineBuilder::new(config).build(factories()).unwrap_err();
		assert!(err.to_string().contains("broker implementation 'sidecar'"));
	}

	/// Builds a memory broker without looking at its table.
	fn unchecked_memory_broker(
		_: &toml::Value,
	) -> Result<Box<dyn BrokerInterface>, BrokerError> {
		Ok(Box::new(MemoryBroker::new()))
	}

	#[test]
	fn test_loaded_implementation_checked_against_its_schema() {
		let config = Config::from_str(
			r#"
[broker]
primary = "memory"
[broker.implementations.memory]
capacity = "lots"

[state]
primary = "memory"
[state.implementations.memory]
"#,
		)
		.unwrap();

		let mut factories = factories();
		factories
			.broker_factories
			.insert("memory".to_string(), unchecked_memory_broker);

		let err = PipelineBuilder::new(config).build(factories).unwrap_err();
		assert!(matches!(err, BuilderError::Config(_)));
		assert!(err.to_string().contains("Invalid broker implementation 'memory'"));
	}

	#[test]
	fn test_unknown_primary_fails_build() {
		let config = Config::from_str(
			r#"
[broker]
primary = "kafka"
[broker.implementations.kafka]

[state]
primary = "memory"
[state.implementations.memory]
"#,
		)
		.unwrap();

		assert!(matches!(
			PipelineBuilder::new(config).build(factories()),
			Err(BuilderError::MissingComponent(_))
		));
	}
}
