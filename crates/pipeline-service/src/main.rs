//! Main entry point for the order pipeline service.
//!
//! One binary serves both halves of the pipeline: the ingestion API that
//! publishes new orders, and the worker routes the sidecar delivers them to.
//! `service.role` in the configuration selects which halves are mounted.

use clap::Parser;
use pipeline_config::Config;
use pipeline_core::{Pipeline, PipelineBuilder, PipelineFactories};
use std::collections::HashMap;
use std::path::PathBuf;

mod apis;
mod server;

/// Command-line arguments for the pipeline service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(
		service = %config.service.id,
		role = config.service.role.as_str(),
		"Loaded configuration"
	);

	let pipeline = build_pipeline(config)?;
	server::start_server(pipeline).await?;

	tracing::info!("Stopped order pipeline");
	Ok(())
}

/// Keys registered factories by implementation name.
fn factory_map<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

/// Wires every registered broker and state store implementation into the
/// pipeline builder.
fn build_pipeline(config: Config) -> Result<Pipeline, Box<dyn std::error::Error>> {
	let factories = PipelineFactories {
		broker_factories: factory_map(pipeline_broker::get_all_implementations()),
		state_factories: factory_map(pipeline_state::get_all_implementations()),
	};

	Ok(PipelineBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pipeline_config::ServiceRole;
	use tempfile::tempdir;

	#[test]
	fn test_args_parse() {
		let args = Args::parse_from(["order-pipeline", "-c", "pipeline.toml", "--log-level", "debug"]);
		assert_eq!(args.config, PathBuf::from("pipeline.toml"));
		assert_eq!(args.log_level, "debug");

		let args = Args::parse_from(["order-pipeline"]);
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_factory_map_keys_by_name() {
		let factories = factory_map(pipeline_state::get_all_implementations());

		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("sidecar"));
	}

	#[tokio::test]
	async fn test_build_pipeline_from_file() {
		let temp_dir = tempdir().unwrap();
		let config_path = temp_dir.path().join("pipeline.toml");
		std::fs::write(
			&config_path,
			r#"
[service]
id = "worker-from-file"
role = "worker"

[broker]
primary = "sidecar"
[broker.implementations.sidecar]
base_url = "http://localhost:${PIPELINE_TEST_UNSET_PORT:-3500}"

[state]
primary = "sidecar"
[state.implementations.sidecar]
base_url = "http://localhost:3500"
timeout_ms = 2000
"#,
		)
		.unwrap();

		let config = Config::from_file(config_path.to_str().unwrap()).await.unwrap();
		let pipeline = build_pipeline(config).unwrap();

		assert_eq!(pipeline.config().service.id, "worker-from-file");
		assert_eq!(pipeline.config().service.role, ServiceRole::Worker);
		assert_eq!(pipeline.subscriptions()[0].route, "/orders");
	}
}
